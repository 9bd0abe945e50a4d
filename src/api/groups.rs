//! Group handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{info, instrument, warn};

use super::AppState;
use crate::error::ApiError;
use crate::model::{Envelope, Group, GroupPayload};
use crate::storage::{current_timestamp, is_unique_violation};
use crate::validation::{validate_group_changes, validate_new_group};

fn duplicate_name(name: &str) -> ApiError {
    ApiError::Conflict(format!("Group \"{name}\" already exists"))
}

/// GET /groups - All groups sorted by name.
#[instrument(skip(state))]
pub async fn list_groups(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Group>>>, ApiError> {
    let groups = state.storage.list_groups().await?;
    info!(count = groups.len(), "Groups listed");

    Ok(Json(Envelope::data(groups)))
}

/// POST /groups - Create a group.
///
/// Description, color and icon fall back to defaults. Names are unique.
#[instrument(skip(state, payload))]
pub async fn create_group(
    State(state): State<AppState>,
    payload: Result<Json<GroupPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Group>>), ApiError> {
    let Json(payload) = payload?;
    let fields = validate_new_group(payload)?;
    let name = fields.name.unwrap_or_default();

    if state.storage.find_group_by_name(&name).await?.is_some() {
        warn!(name = %name, "Group name already taken");
        return Err(duplicate_name(&name));
    }

    let now = current_timestamp();
    let group = Group {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        description: fields.description.unwrap_or_default(),
        color: fields.color.unwrap_or_default(),
        icon: fields.icon.unwrap_or_default(),
        contact_count: 0,
        is_private: fields.is_private.unwrap_or(false),
        created_at: now,
        updated_at: now,
    };

    // A concurrent create can still win the race for the name.
    if let Err(e) = state.storage.insert_group(&group).await {
        if is_unique_violation(&e) {
            return Err(duplicate_name(&group.name));
        }
        return Err(e.into());
    }

    info!(group_id = %group.id, name = %group.name, "Group created");

    Ok((StatusCode::CREATED, Json(Envelope::data(group))))
}

/// PUT /groups/:id - Partially update a group.
#[instrument(skip(state, payload))]
pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<GroupPayload>, JsonRejection>,
) -> Result<Json<Envelope<Group>>, ApiError> {
    let Json(payload) = payload?;
    let changes = validate_group_changes(payload)?;

    if state.storage.find_group(&id).await?.is_none() {
        return Err(ApiError::NotFound("Group"));
    }

    if let Some(name) = &changes.name {
        if let Some(other) = state.storage.find_group_by_name(name).await? {
            if other.id != id {
                warn!(group_id = %id, name = %name, "Rename collides with an existing group");
                return Err(duplicate_name(name));
            }
        }
    }

    let group = match state
        .storage
        .update_group(&id, &changes, current_timestamp())
        .await
    {
        Ok(Some(group)) => group,
        Ok(None) => return Err(ApiError::NotFound("Group")),
        Err(e) if is_unique_violation(&e) => {
            return Err(duplicate_name(changes.name.as_deref().unwrap_or_default()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(group_id = %group.id, "Group updated");

    Ok(Json(Envelope::data(group)))
}

/// DELETE /groups/:id - Detach the group from every contact, then delete it.
#[instrument(skip(state))]
pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let (group, detached) = state
        .storage
        .delete_group(&id)
        .await?
        .ok_or(ApiError::NotFound("Group"))?;

    info!(group_id = %group.id, name = %group.name, detached, "Group deleted");

    Ok(Json(Envelope::<()>::message("Group deleted successfully")))
}
