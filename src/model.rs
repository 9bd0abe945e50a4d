//! Data models for the contact manager.
//!
//! Every persisted entity serializes with camelCase field names and exposes
//! its identifier as `_id`, which is the shape API clients consume.
//!
//! # Entities
//!
//! - [`Contact`]: a person record
//! - [`Group`]: a named collection contacts can reference
//! - [`ActivityEntry`]: an append-only audit record

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default colour assigned to new groups.
pub const DEFAULT_GROUP_COLOR: &str = "#667eea";

/// Default icon assigned to new groups.
pub const DEFAULT_GROUP_ICON: &str = "👥";

/// Contact category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Personal,
    Business,
    Family,
    Friends,
    Work,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Personal,
        Category::Business,
        Category::Family,
        Category::Friends,
        Category::Work,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "Personal",
            Category::Business => "Business",
            Category::Family => "Family",
            Category::Friends => "Friends",
            Category::Work => "Work",
            Category::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

/// Lifecycle status of a contact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 3] = [
        ContactStatus::Active,
        ContactStatus::Inactive,
        ContactStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Active => "Active",
            ContactStatus::Inactive => "Inactive",
            ContactStatus::Archived => "Archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

/// Where a contact record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactSource {
    #[default]
    Manual,
    Import,
    Website,
    Referral,
}

impl ContactSource {
    pub const ALL: [ContactSource; 4] = [
        ContactSource::Manual,
        ContactSource::Import,
        ContactSource::Website,
        ContactSource::Referral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactSource::Manual => "Manual",
            ContactSource::Import => "Import",
            ContactSource::Website => "Website",
            ContactSource::Referral => "Referral",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

/// A person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Always trimmed and lowercased.
    pub email: String,
    pub phone: String,
    pub message: String,
    pub category: Category,
    /// Trimmed, non-empty entries in submission order.
    pub tags: Vec<String>,
    /// Group identifiers in submission order.
    pub groups: Vec<String>,
    pub status: ContactStatus,
    pub source: ContactSource,
    pub starred: bool,
    pub last_contacted: Option<DateTime<Utc>>,
    pub notes: String,
    pub custom_fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Build a fresh record from validated input with server-assigned id and timestamps.
    pub fn from_new(new: NewContact, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            message: new.message,
            category: new.category,
            tags: new.tags,
            groups: new.groups,
            status: new.status,
            source: new.source,
            starred: new.starred,
            last_contacted: new.last_contacted,
            notes: new.notes,
            custom_fields: new.custom_fields,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Group fields embedded in a contact response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl GroupSummary {
    /// Identifier, name and colour, as shown in listings.
    pub fn brief(group: &Group) -> Self {
        Self {
            id: group.id.clone(),
            name: group.name.clone(),
            color: group.color.clone(),
            icon: None,
        }
    }

    /// [`GroupSummary::brief`] plus the icon, as shown on the detail view.
    pub fn with_icon(group: &Group) -> Self {
        Self {
            icon: Some(group.icon.clone()),
            ..Self::brief(group)
        }
    }
}

/// A contact whose group references are resolved to group summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedContact {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub category: Category,
    pub tags: Vec<String>,
    /// Referenced groups that still exist, in reference order.
    pub groups: Vec<GroupSummary>,
    pub status: ContactStatus,
    pub source: ContactSource,
    pub starred: bool,
    pub last_contacted: Option<DateTime<Utc>>,
    pub notes: String,
    pub custom_fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PopulatedContact {
    /// Replace group ids with their summaries. Ids missing from `groups` are dropped.
    pub fn resolve(contact: Contact, groups: &HashMap<String, GroupSummary>) -> Self {
        Self {
            groups: contact
                .groups
                .iter()
                .filter_map(|id| groups.get(id).cloned())
                .collect(),
            id: contact.id,
            name: contact.name,
            email: contact.email,
            phone: contact.phone,
            message: contact.message,
            category: contact.category,
            tags: contact.tags,
            status: contact.status,
            source: contact.source,
            starred: contact.starred,
            last_contacted: contact.last_contacted,
            notes: contact.notes,
            custom_fields: contact.custom_fields,
            created_at: contact.created_at,
            updated_at: contact.updated_at,
        }
    }
}

/// A fully validated contact ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub groups: Vec<String>,
    pub status: ContactStatus,
    pub source: ContactSource,
    pub starred: bool,
    pub last_contacted: Option<DateTime<Utc>>,
    pub notes: String,
    pub custom_fields: BTreeMap<String, String>,
}

/// Validated partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<String>>,
    pub groups: Option<Vec<String>>,
    pub status: Option<ContactStatus>,
    pub source: Option<ContactSource>,
    pub starred: Option<bool>,
    pub last_contacted: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub custom_fields: Option<BTreeMap<String, String>>,
}

/// Tags may be submitted as a list or as a single comma-separated string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Joined(String),
}

/// Request body for creating or updating a contact, before validation.
///
/// Enumerated fields are kept as strings so validation can report them
/// per field instead of failing deserialization as a whole.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub category: Option<String>,
    pub tags: Option<TagsInput>,
    pub groups: Option<Vec<String>>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub starred: Option<bool>,
    pub last_contacted: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub custom_fields: Option<BTreeMap<String, String>>,
}

/// A named collection of contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: String,
    /// Unique across groups.
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
    /// Number of contacts referencing this group, never negative.
    pub contact_count: i64,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or updating a group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_private: Option<bool>,
}

/// Validated partial group update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_private: Option<bool>,
}

/// The closed vocabulary of audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    CreateContact,
    UpdateContact,
    DeleteContact,
    AddToGroup,
    RemoveFromGroup,
    Starred,
    Unstarred,
    Export,
    BulkDelete,
    BulkUpdate,
    BulkStar,
    BulkUnstar,
    BulkChangeStatus,
}

impl ActivityAction {
    pub const ALL: [ActivityAction; 13] = [
        ActivityAction::CreateContact,
        ActivityAction::UpdateContact,
        ActivityAction::DeleteContact,
        ActivityAction::AddToGroup,
        ActivityAction::RemoveFromGroup,
        ActivityAction::Starred,
        ActivityAction::Unstarred,
        ActivityAction::Export,
        ActivityAction::BulkDelete,
        ActivityAction::BulkUpdate,
        ActivityAction::BulkStar,
        ActivityAction::BulkUnstar,
        ActivityAction::BulkChangeStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::CreateContact => "CREATE_CONTACT",
            ActivityAction::UpdateContact => "UPDATE_CONTACT",
            ActivityAction::DeleteContact => "DELETE_CONTACT",
            ActivityAction::AddToGroup => "ADD_TO_GROUP",
            ActivityAction::RemoveFromGroup => "REMOVE_FROM_GROUP",
            ActivityAction::Starred => "STARRED",
            ActivityAction::Unstarred => "UNSTARRED",
            ActivityAction::Export => "EXPORT",
            ActivityAction::BulkDelete => "BULK_DELETE",
            ActivityAction::BulkUpdate => "BULK_UPDATE",
            ActivityAction::BulkStar => "BULK_STAR",
            ActivityAction::BulkUnstar => "BULK_UNSTAR",
            ActivityAction::BulkChangeStatus => "BULK_CHANGE_STATUS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == value)
    }
}

/// Set-wide operations accepted by the bulk endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
    Update,
    Star,
    Unstar,
    ChangeStatus,
}

impl BulkAction {
    /// Parse the wire name (`delete`, `update`, `star`, `unstar`, `change-status`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delete" => Some(BulkAction::Delete),
            "update" => Some(BulkAction::Update),
            "star" => Some(BulkAction::Star),
            "unstar" => Some(BulkAction::Unstar),
            "change-status" => Some(BulkAction::ChangeStatus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Delete => "delete",
            BulkAction::Update => "update",
            BulkAction::Star => "star",
            BulkAction::Unstar => "unstar",
            BulkAction::ChangeStatus => "change-status",
        }
    }

    /// The audit action recorded for this bulk operation.
    pub fn activity_action(&self) -> ActivityAction {
        match self {
            BulkAction::Delete => ActivityAction::BulkDelete,
            BulkAction::Update => ActivityAction::BulkUpdate,
            BulkAction::Star => ActivityAction::BulkStar,
            BulkAction::Unstar => ActivityAction::BulkUnstar,
            BulkAction::ChangeStatus => ActivityAction::BulkChangeStatus,
        }
    }
}

/// Request body for `POST /contacts/bulk/actions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionRequest {
    pub action: Option<String>,
    pub contact_ids: Option<Vec<String>>,
    pub data: Option<Value>,
}

/// An immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub action: ActivityAction,
    pub entity_type: String,
    /// `None` for operations that touch several entities or none.
    pub entity_id: Option<String>,
    pub entity_name: String,
    pub changes: Map<String, Value>,
    pub performed_by: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Offset pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: u32, limit: u32) -> Self {
        let limit_i64 = i64::from(limit.max(1));
        Self {
            total,
            page,
            limit,
            pages: (total + limit_i64 - 1) / limit_i64,
        }
    }
}

/// Distinct values currently in use, for populating filter controls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Facets {
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub statuses: Vec<String>,
}

/// Number of contacts in one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStat {
    pub category: String,
    pub count: i64,
}

/// Number of contacts created on one UTC calendar day (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

/// The subset of a contact shown in the dashboard's "latest" list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPreview {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

/// Headline counts for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_contacts: i64,
    pub active_contacts: i64,
    pub starred_contacts: i64,
    pub total_groups: i64,
}

/// Response data for `GET /analytics/dashboard`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub summary: DashboardSummary,
    pub category_stats: Vec<CategoryStat>,
    pub weekly_stats: Vec<DailyCount>,
    pub latest_contacts: Vec<ContactPreview>,
    pub recent_activities: Vec<ActivityEntry>,
}

/// The response envelope shared by every route.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    /// A successful response that carries only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// A page of records plus pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Response for `GET /contacts`.
#[derive(Debug, Clone, Serialize)]
pub struct ContactListResponse {
    pub success: bool,
    pub data: Vec<PopulatedContact>,
    pub pagination: Pagination,
    pub filters: Facets,
}

/// Response for `GET /contacts/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct ContactDetailResponse {
    pub success: bool,
    pub data: PopulatedContact,
    pub activities: Vec<ActivityEntry>,
}

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database: &'static str,
    /// Seconds since the process started.
    pub uptime: f64,
}
