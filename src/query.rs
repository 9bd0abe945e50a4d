//! Query-string parsing for contact listing, export and the activity feed.
//!
//! Raw parameters arrive as strings so that a malformed value can be reported
//! by name instead of failing the whole extraction. Parsing either yields
//! fully validated parameters or a [`ApiError::Validation`] listing every
//! offending parameter; no query runs on partial input.

use serde::Deserialize;

use crate::error::{ApiError, FieldError};

/// Default page size for contact listings.
pub const DEFAULT_CONTACT_LIMIT: u32 = 10;

/// Default page size for the activity feed.
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 20;

/// Largest page size any listing accepts.
pub const MAX_LIMIT: u32 = 100;

/// Raw query parameters for `GET /contacts`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub group: Option<String>,
    pub tag: Option<String>,
    pub starred: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Raw query parameters for `GET /contacts/export/:format`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

/// Raw query parameters for `GET /analytics/activities`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Predicate over contacts. All present conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
    /// Case-insensitive substring of name, email, phone or message.
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    /// Group id the contact must reference.
    pub group: Option<String>,
    /// Tag the contact must carry.
    pub tag: Option<String>,
    pub starred: Option<bool>,
}

impl ContactFilter {
    pub fn with_status(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    pub fn with_starred(starred: bool) -> Self {
        Self {
            starred: Some(starred),
            ..Default::default()
        }
    }
}

/// A distinct-value list offered to filter controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetKind {
    Categories,
    Tags,
    Statuses,
}

impl FacetKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "categories" => Some(FacetKind::Categories),
            "tags" => Some(FacetKind::Tags),
            "statuses" => Some(FacetKind::Statuses),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// The requested sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// A field with a backing column.
    Column(&'static str),
    /// A key no record carries; results keep insertion order.
    Unrecognized(String),
}

impl SortKey {
    pub fn parse(key: &str) -> Self {
        let column = match key {
            "name" => "name",
            "email" => "email",
            "phone" => "phone",
            "message" => "message",
            "category" => "category",
            "status" => "status",
            "source" => "source",
            "starred" => "starred",
            "lastContacted" => "last_contacted",
            "createdAt" => "created_at",
            "updatedAt" => "updated_at",
            other => return SortKey::Unrecognized(other.to_string()),
        };
        SortKey::Column(column)
    }
}

/// Page selection for offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// Validated parameters for a contact listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactListParams {
    pub filter: ContactFilter,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub page: PageRequest,
}

impl ContactListQuery {
    pub fn parse(self) -> Result<ContactListParams, ApiError> {
        let mut errors = Vec::new();

        let starred = match non_empty(self.starred).as_deref() {
            None => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(_) => {
                errors.push(FieldError::new("starred", "starred must be true or false"));
                None
            }
        };

        let sort_order = match non_empty(self.sort_order).as_deref() {
            None | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(_) => {
                errors.push(FieldError::new("sortOrder", "sortOrder must be asc or desc"));
                SortOrder::Desc
            }
        };

        let sort_key = SortKey::parse(
            non_empty(self.sort_by)
                .as_deref()
                .unwrap_or("createdAt"),
        );

        let page = parse_page(self.page, self.limit, DEFAULT_CONTACT_LIMIT, &mut errors);

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        Ok(ContactListParams {
            filter: ContactFilter {
                search: non_empty(self.search),
                category: non_empty(self.category),
                status: non_empty(self.status),
                group: non_empty(self.group),
                tag: non_empty(self.tag),
                starred,
            },
            sort_key,
            sort_order,
            page,
        })
    }
}

impl ExportQuery {
    pub fn into_filter(self) -> ContactFilter {
        ContactFilter {
            search: non_empty(self.search),
            category: non_empty(self.category),
            status: non_empty(self.status),
            ..Default::default()
        }
    }
}

impl ActivityListQuery {
    pub fn parse(self) -> Result<PageRequest, ApiError> {
        let mut errors = Vec::new();
        let page = parse_page(self.page, self.limit, DEFAULT_ACTIVITY_LIMIT, &mut errors);
        if errors.is_empty() {
            Ok(page)
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_page(
    page: Option<String>,
    limit: Option<String>,
    default_limit: u32,
    errors: &mut Vec<FieldError>,
) -> PageRequest {
    PageRequest {
        page: parse_bounded("page", page, 1, 1, u32::MAX, errors),
        limit: parse_bounded("limit", limit, default_limit, 1, MAX_LIMIT, errors),
    }
}

fn parse_bounded(
    name: &str,
    raw: Option<String>,
    default: u32,
    min: u32,
    max: u32,
    errors: &mut Vec<FieldError>,
) -> u32 {
    let Some(raw) = non_empty(raw) else {
        return default;
    };

    match raw.parse::<u32>() {
        Ok(value) if (min..=max).contains(&value) => value,
        _ => {
            let message = if max == u32::MAX {
                format!("{name} must be an integer of at least {min}")
            } else {
                format!("{name} must be an integer between {min} and {max}")
            };
            errors.push(FieldError::new(name, message));
            default
        }
    }
}
