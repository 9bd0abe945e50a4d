//! Contact handlers.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use super::AppState;
use crate::activity::{ActivityEvent, RequestContext};
use crate::error::ApiError;
use crate::export::ExportFormat;
use crate::model::{
    ActivityAction, BulkAction, BulkActionRequest, Contact, ContactChanges,
    ContactDetailResponse, ContactListResponse, ContactPayload, Envelope, Group, GroupSummary,
    Pagination, PopulatedContact,
};
use crate::query::{ContactListQuery, ExportQuery, FacetKind};
use crate::storage::{MembershipOutcome, UpdateCounts, current_timestamp};
use crate::validation::{validate_contact_changes, validate_new_contact, validate_status};

/// Activity entries returned alongside a single contact.
const CONTACT_ACTIVITY_LIMIT: u32 = 10;

/// GET /contacts - List contacts.
///
/// # Query Parameters
///
/// - `search`: substring of name, email, phone or message (case-insensitive)
/// - `category`, `status`, `group`, `tag`, `starred`: exact filters
/// - `sortBy` (default `createdAt`), `sortOrder` (`asc` | `desc`, default `desc`)
/// - `page` (default 1), `limit` (default 10, at most 100)
///
/// The `filters` facets in the response cover the whole collection, not
/// just the filtered page.
#[instrument(skip(state))]
pub async fn list_contacts(
    State(state): State<AppState>,
    query: Result<Query<ContactListQuery>, QueryRejection>,
) -> Result<Json<ContactListResponse>, ApiError> {
    let Query(query) = query?;
    let params = query.parse()?;

    let (contacts, total, filters) = tokio::try_join!(
        state.storage.list_contacts(&params),
        state.storage.count_contacts(&params.filter),
        state.storage.contact_facets(),
    )?;

    info!(
        returned = contacts.len(),
        total,
        page = params.page.page,
        "Contacts listed"
    );

    let groups = load_groups(&state, &contacts, GroupSummary::brief).await?;
    let data = contacts
        .into_iter()
        .map(|contact| PopulatedContact::resolve(contact, &groups))
        .collect();

    Ok(Json(ContactListResponse {
        success: true,
        data,
        pagination: Pagination::new(total, params.page.page, params.page.limit),
        filters,
    }))
}

/// GET /contacts/filters/:facet - Distinct values for one filter control.
#[instrument(skip(state))]
pub async fn get_facet(
    State(state): State<AppState>,
    Path(facet): Path<String>,
) -> Result<Json<Envelope<Vec<String>>>, ApiError> {
    let kind = FacetKind::parse(&facet).ok_or(ApiError::NotFound("Filter"))?;
    let values = state.storage.distinct_values(kind).await?;

    Ok(Json(Envelope::data(values)))
}

/// GET /contacts/:id - One contact with its most recent activity.
#[instrument(skip(state))]
pub async fn get_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContactDetailResponse>, ApiError> {
    let contact = state
        .storage
        .find_contact(&id)
        .await?
        .ok_or(ApiError::NotFound("Contact"))?;
    let activities = state
        .storage
        .activities_for_entity(&id, CONTACT_ACTIVITY_LIMIT)
        .await?;

    let groups = load_groups(&state, std::slice::from_ref(&contact), GroupSummary::with_icon).await?;

    Ok(Json(ContactDetailResponse {
        success: true,
        data: PopulatedContact::resolve(contact, &groups),
        activities,
    }))
}

/// Summaries of every group the contacts reference, fetched in one query.
async fn load_groups(
    state: &AppState,
    contacts: &[Contact],
    summarize: fn(&Group) -> GroupSummary,
) -> Result<HashMap<String, GroupSummary>, ApiError> {
    let mut ids: Vec<String> = contacts.iter().flat_map(|c| c.groups.iter().cloned()).collect();
    ids.sort();
    ids.dedup();

    let groups = state.storage.find_groups(&ids).await?;
    Ok(groups
        .iter()
        .map(|group| (group.id.clone(), summarize(group)))
        .collect())
}

/// POST /contacts - Create a contact.
///
/// Tags may be an array or a comma-separated string. Every group listed in
/// `groups` has its contact count incremented in the same transaction.
#[instrument(skip(state, context, payload))]
pub async fn create_contact(
    State(state): State<AppState>,
    context: RequestContext,
    payload: Result<Json<ContactPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Contact>>), ApiError> {
    let Json(payload) = payload?;
    let new_contact = validate_new_contact(payload)?;

    let contact = Contact::from_new(new_contact, current_timestamp());
    state.storage.insert_contact(&contact).await?;

    info!(
        contact_id = %contact.id,
        groups = contact.groups.len(),
        "Contact created"
    );
    state.activity.record(ActivityEvent::new(
        ActivityAction::CreateContact,
        Some(contact.id.as_str()),
        &contact.name,
        &context,
    ));

    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(contact).with_message("Contact created successfully")),
    ))
}

/// PUT /contacts/:id - Partially update a contact.
///
/// Only the fields present in the body are validated and written. The
/// recorded diff holds `{ old, new }` for every submitted key.
#[instrument(skip(state, context, body))]
pub async fn update_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    context: RequestContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<Contact>>, ApiError> {
    let Json(body) = body?;
    let Value::Object(submitted) = body else {
        return Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let existing = state
        .storage
        .find_contact(&id)
        .await?
        .ok_or(ApiError::NotFound("Contact"))?;

    let payload: ContactPayload = serde_json::from_value(Value::Object(submitted.clone()))
        .map_err(|e| ApiError::BadRequest(format!("Invalid contact data: {e}")))?;
    let changes = validate_contact_changes(payload)?;

    let updated = state
        .storage
        .update_contact(&id, &changes, current_timestamp())
        .await?
        .ok_or(ApiError::NotFound("Contact"))?;

    let diff = submitted_diff(&existing, submitted)?;
    info!(contact_id = %id, fields = diff.len(), "Contact updated");
    state.activity.record(
        ActivityEvent::new(
            ActivityAction::UpdateContact,
            Some(updated.id.as_str()),
            &updated.name,
            &context,
        )
        .with_changes(diff),
    );

    Ok(Json(
        Envelope::data(updated).with_message("Contact updated successfully"),
    ))
}

/// Pair every submitted value with the stored value it replaces.
fn submitted_diff(
    before: &Contact,
    submitted: Map<String, Value>,
) -> Result<Map<String, Value>, ApiError> {
    let Value::Object(stored) = serde_json::to_value(before).map_err(anyhow::Error::from)? else {
        return Ok(Map::new());
    };

    Ok(submitted
        .into_iter()
        .map(|(key, new)| {
            let old = stored.get(&key).cloned().unwrap_or(Value::Null);
            (key, json!({ "old": old, "new": new }))
        })
        .collect())
}

/// DELETE /contacts/:id - Delete a contact and release its group memberships.
#[instrument(skip(state, context))]
pub async fn delete_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    context: RequestContext,
) -> Result<Json<Envelope<()>>, ApiError> {
    let contact = state
        .storage
        .delete_contact(&id)
        .await?
        .ok_or(ApiError::NotFound("Contact"))?;

    info!(contact_id = %id, groups = contact.groups.len(), "Contact deleted");
    state.activity.record(ActivityEvent::new(
        ActivityAction::DeleteContact,
        Some(contact.id.as_str()),
        &contact.name,
        &context,
    ));

    Ok(Json(Envelope::<()>::message("Contact deleted successfully")))
}

#[derive(Debug, Serialize)]
pub struct StarState {
    pub starred: bool,
}

/// POST /contacts/:id/star - Toggle the starred flag.
#[instrument(skip(state, context))]
pub async fn toggle_star(
    State(state): State<AppState>,
    Path(id): Path<String>,
    context: RequestContext,
) -> Result<Json<Envelope<StarState>>, ApiError> {
    let (starred, name) = state
        .storage
        .toggle_star(&id, current_timestamp())
        .await?
        .ok_or(ApiError::NotFound("Contact"))?;

    let (action, verb) = if starred {
        (ActivityAction::Starred, "starred")
    } else {
        (ActivityAction::Unstarred, "unstarred")
    };

    info!(contact_id = %id, starred, "Star toggled");
    state.activity.record(
        ActivityEvent::new(action, Some(id.as_str()), name, &context).with_change("starred", starred),
    );

    Ok(Json(
        Envelope::data(StarState { starred })
            .with_message(format!("Contact {verb} successfully")),
    ))
}

/// Counts reported by a bulk action.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BulkOutcome {
    #[serde(rename_all = "camelCase")]
    Deleted { deleted_count: u64 },
    #[serde(rename_all = "camelCase")]
    Modified {
        matched_count: u64,
        modified_count: u64,
    },
}

/// POST /contacts/bulk/actions - Apply one action to a set of contacts.
///
/// # Request Body
///
/// ```json
/// {
///     "action": "change-status",
///     "contactIds": ["…", "…"],
///     "data": { "status": "Archived" }
/// }
/// ```
///
/// Actions: `delete`, `update`, `star`, `unstar`, `change-status`. One
/// activity entry is recorded for the whole set.
#[instrument(skip(state, context, body))]
pub async fn bulk_action(
    State(state): State<AppState>,
    context: RequestContext,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<BulkOutcome>>, ApiError> {
    let Json(body) = body?;
    let request: BulkActionRequest = serde_json::from_value(body)
        .map_err(|_| ApiError::BadRequest("Invalid request".to_string()))?;

    let (Some(raw_action), Some(ids)) = (request.action.filter(|a| !a.is_empty()), request.contact_ids)
    else {
        return Err(ApiError::BadRequest("Invalid request".to_string()));
    };
    let action = BulkAction::parse(&raw_action)
        .ok_or_else(|| ApiError::BadRequest("Invalid action".to_string()))?;

    let mut changes = Map::new();
    changes.insert("action".to_string(), json!(action.as_str()));
    changes.insert("affectedContacts".to_string(), json!(ids.len()));

    let now = current_timestamp();
    let outcome = match action {
        BulkAction::Delete => {
            let deleted = state.storage.delete_contacts(&ids).await?;
            changes.insert("deletedCount".to_string(), json!(deleted));
            BulkOutcome::Deleted {
                deleted_count: deleted,
            }
        }
        BulkAction::Update => {
            let data = request.data.unwrap_or_else(|| Value::Object(Map::new()));
            let payload: ContactPayload = serde_json::from_value(data.clone())
                .map_err(|e| ApiError::BadRequest(format!("Invalid update data: {e}")))?;
            let updates = validate_contact_changes(payload)?;
            let counts = state.storage.update_contacts(&ids, &updates, now).await?;
            changes.insert("modifiedCount".to_string(), json!(counts.modified));
            changes.insert("updates".to_string(), data);
            modified_outcome(counts)
        }
        BulkAction::Star | BulkAction::Unstar => {
            let updates = ContactChanges {
                starred: Some(action == BulkAction::Star),
                ..Default::default()
            };
            let counts = state.storage.update_contacts(&ids, &updates, now).await?;
            changes.insert("modifiedCount".to_string(), json!(counts.modified));
            modified_outcome(counts)
        }
        BulkAction::ChangeStatus => {
            let raw_status = request
                .data
                .as_ref()
                .and_then(|d| d.get("status"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| ApiError::BadRequest("Status is required".to_string()))?;
            let status = validate_status(raw_status)?;
            let updates = ContactChanges {
                status: Some(status),
                ..Default::default()
            };
            let counts = state.storage.update_contacts(&ids, &updates, now).await?;
            changes.insert("modifiedCount".to_string(), json!(counts.modified));
            changes.insert("newStatus".to_string(), json!(status.as_str()));
            modified_outcome(counts)
        }
    };

    info!(
        action = action.as_str(),
        requested = ids.len(),
        "Bulk action applied"
    );
    state.activity.record(
        ActivityEvent::new(
            action.activity_action(),
            None,
            "Multiple Contacts",
            &context,
        )
        .with_changes(changes),
    );

    Ok(Json(Envelope::data(outcome).with_message(format!(
        "Bulk action '{}' completed successfully",
        action.as_str()
    ))))
}

fn modified_outcome(counts: UpdateCounts) -> BulkOutcome {
    BulkOutcome::Modified {
        matched_count: counts.matched,
        modified_count: counts.modified,
    }
}

/// GET /contacts/export/:format - Download contacts as `csv` or `json`.
///
/// Accepts the `search`, `category` and `status` filters of the listing.
#[instrument(skip(state, context))]
pub async fn export_contacts(
    State(state): State<AppState>,
    Path(format): Path<String>,
    context: RequestContext,
    query: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let format =
        ExportFormat::parse(&format).ok_or_else(|| ApiError::BadRequest("Invalid format".to_string()))?;
    let Query(query) = query?;

    let contacts = state.storage.export_contacts(&query.into_filter()).await?;
    let body = format.render(&contacts)?;

    info!(format = format.as_str(), count = contacts.len(), "Contacts exported");
    state.activity.record(
        ActivityEvent::new(ActivityAction::Export, None, "All Contacts", &context)
            .with_change("format", format.as_str())
            .with_change("count", contacts.len()),
    );

    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CONTENT_DISPOSITION, format.disposition()),
        ],
        body,
    ))
}

/// POST /contacts/:id/groups/:group_id - Add a contact to a group.
#[instrument(skip(state, context))]
pub async fn attach_group(
    State(state): State<AppState>,
    Path((id, group_id)): Path<(String, String)>,
    context: RequestContext,
) -> Result<Json<Envelope<Contact>>, ApiError> {
    let outcome = state
        .storage
        .attach_group(&id, &group_id, current_timestamp())
        .await?;

    membership_response(
        &state,
        &context,
        outcome,
        ActivityAction::AddToGroup,
        "Contact added to group",
        "Contact is already in this group",
    )
}

/// DELETE /contacts/:id/groups/:group_id - Remove a contact from a group.
#[instrument(skip(state, context))]
pub async fn detach_group(
    State(state): State<AppState>,
    Path((id, group_id)): Path<(String, String)>,
    context: RequestContext,
) -> Result<Json<Envelope<Contact>>, ApiError> {
    let outcome = state
        .storage
        .detach_group(&id, &group_id, current_timestamp())
        .await?;

    membership_response(
        &state,
        &context,
        outcome,
        ActivityAction::RemoveFromGroup,
        "Contact removed from group",
        "Contact is not in this group",
    )
}

fn membership_response(
    state: &AppState,
    context: &RequestContext,
    outcome: MembershipOutcome,
    action: ActivityAction,
    changed_message: &str,
    unchanged_message: &str,
) -> Result<Json<Envelope<Contact>>, ApiError> {
    let (contact, group, changed) = match outcome {
        MembershipOutcome::ContactNotFound => return Err(ApiError::NotFound("Contact")),
        MembershipOutcome::GroupNotFound => return Err(ApiError::NotFound("Group")),
        MembershipOutcome::Applied {
            contact,
            group,
            changed,
        } => (contact, group, changed),
    };

    if !changed {
        warn!(
            contact_id = %contact.id,
            group_id = %group.id,
            action = action.as_str(),
            "Membership already in requested state"
        );
        return Ok(Json(Envelope::data(contact).with_message(unchanged_message)));
    }

    info!(
        contact_id = %contact.id,
        group_id = %group.id,
        contact_count = group.contact_count,
        action = action.as_str(),
        "Group membership changed"
    );
    state.activity.record(
        ActivityEvent::new(action, Some(contact.id.as_str()), &contact.name, context)
            .with_change("groupId", group.id.as_str())
            .with_change("groupName", group.name.as_str()),
    );

    Ok(Json(Envelope::data(contact).with_message(changed_message)))
}
