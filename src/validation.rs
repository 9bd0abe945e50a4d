//! Input normalisation and validation for contacts and groups.
//!
//! Validation always completes before any write begins. All problems found
//! in a payload are reported together, one [`FieldError`] per field.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::FieldError;
use crate::model::{
    Category, ContactChanges, ContactPayload, ContactSource, ContactStatus, DEFAULT_GROUP_COLOR,
    DEFAULT_GROUP_ICON, GroupChanges, GroupPayload, NewContact, TagsInput,
};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// Whether `email` looks like `local@domain.tld`.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Split, trim and de-duplicate tags, keeping first occurrences in order.
pub fn normalize_tags(input: TagsInput) -> Vec<String> {
    let raw: Vec<String> = match input {
        TagsInput::List(tags) => tags,
        TagsInput::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    dedup_trimmed(raw)
}

/// Trim and de-duplicate group references, keeping first occurrences in order.
pub fn normalize_group_ids(ids: Vec<String>) -> Vec<String> {
    dedup_trimmed(ids)
}

fn dedup_trimmed(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim();
        if !trimmed.is_empty() && !out.iter().any(|v| v == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

fn required_text(field: &str, value: Option<String>, errors: &mut Vec<FieldError>) -> String {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => v,
        _ => {
            errors.push(FieldError::new(field, format!("{} is required", capitalize(field))));
            String::new()
        }
    }
}

fn checked_email(value: String, errors: &mut Vec<FieldError>) -> String {
    let email = normalize_email(&value);
    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Please enter a valid email"));
    }
    email
}

fn checked_enum<T>(
    field: &str,
    value: Option<String>,
    parse: fn(&str) -> Option<T>,
    allowed: &[&str],
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let raw = value?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        errors.push(FieldError::new(
            field,
            format!("{} must be one of: {}", capitalize(field), allowed.join(", ")),
        ));
    }
    parsed
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn category_names() -> Vec<&'static str> {
    Category::ALL.iter().map(Category::as_str).collect()
}

fn status_names() -> Vec<&'static str> {
    ContactStatus::ALL.iter().map(ContactStatus::as_str).collect()
}

fn source_names() -> Vec<&'static str> {
    ContactSource::ALL.iter().map(ContactSource::as_str).collect()
}

/// Validate a create payload. Name, email and phone are required.
pub fn validate_new_contact(payload: ContactPayload) -> Result<NewContact, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = required_text("name", payload.name, &mut errors);
    let email = match payload.email {
        Some(email) => checked_email(email, &mut errors),
        None => {
            errors.push(FieldError::new("email", "Please enter a valid email"));
            String::new()
        }
    };
    let phone = required_text("phone", payload.phone, &mut errors);
    let category = checked_enum(
        "category",
        payload.category,
        Category::parse,
        &category_names(),
        &mut errors,
    );
    let status = checked_enum(
        "status",
        payload.status,
        ContactStatus::parse,
        &status_names(),
        &mut errors,
    );
    let source = checked_enum(
        "source",
        payload.source,
        ContactSource::parse,
        &source_names(),
        &mut errors,
    );

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewContact {
        name,
        email,
        phone,
        message: payload.message.map(|m| m.trim().to_string()).unwrap_or_default(),
        category: category.unwrap_or_default(),
        tags: payload.tags.map(normalize_tags).unwrap_or_default(),
        groups: payload.groups.map(normalize_group_ids).unwrap_or_default(),
        status: status.unwrap_or_default(),
        source: source.unwrap_or_default(),
        starred: payload.starred.unwrap_or(false),
        last_contacted: payload.last_contacted,
        notes: payload.notes.map(|n| n.trim().to_string()).unwrap_or_default(),
        custom_fields: payload.custom_fields.unwrap_or_default(),
    })
}

/// Validate a partial update. Only supplied fields are checked, with the
/// same rules as creation.
pub fn validate_contact_changes(payload: ContactPayload) -> Result<ContactChanges, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = payload
        .name
        .map(|name| required_text("name", Some(name), &mut errors));
    let email = payload.email.map(|email| checked_email(email, &mut errors));
    let phone = payload
        .phone
        .map(|phone| required_text("phone", Some(phone), &mut errors));
    let category = checked_enum(
        "category",
        payload.category,
        Category::parse,
        &category_names(),
        &mut errors,
    );
    let status = checked_enum(
        "status",
        payload.status,
        ContactStatus::parse,
        &status_names(),
        &mut errors,
    );
    let source = checked_enum(
        "source",
        payload.source,
        ContactSource::parse,
        &source_names(),
        &mut errors,
    );

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ContactChanges {
        name,
        email,
        phone,
        message: payload.message.map(|m| m.trim().to_string()),
        category,
        tags: payload.tags.map(normalize_tags),
        groups: payload.groups.map(normalize_group_ids),
        status,
        source,
        starred: payload.starred,
        last_contacted: payload.last_contacted,
        notes: payload.notes.map(|n| n.trim().to_string()),
        custom_fields: payload.custom_fields,
    })
}

/// Parse the status a `change-status` bulk action targets.
pub fn validate_status(raw: &str) -> Result<ContactStatus, Vec<FieldError>> {
    ContactStatus::parse(raw.trim()).ok_or_else(|| {
        vec![FieldError::new(
            "status",
            format!("Status must be one of: {}", status_names().join(", ")),
        )]
    })
}

/// Validate a group create payload, filling documented defaults.
pub fn validate_new_group(payload: GroupPayload) -> Result<GroupChanges, Vec<FieldError>> {
    let name = payload.name.map(|n| n.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        return Err(vec![FieldError::new("name", "Group name is required")]);
    }

    Ok(GroupChanges {
        name: Some(name),
        description: Some(
            payload
                .description
                .map(|d| d.trim().to_string())
                .unwrap_or_default(),
        ),
        color: Some(non_blank_or(payload.color, DEFAULT_GROUP_COLOR)),
        icon: Some(non_blank_or(payload.icon, DEFAULT_GROUP_ICON)),
        is_private: Some(payload.is_private.unwrap_or(false)),
    })
}

/// Validate a partial group update.
pub fn validate_group_changes(payload: GroupPayload) -> Result<GroupChanges, Vec<FieldError>> {
    let name = payload.name.map(|n| n.trim().to_string());
    if name.as_deref() == Some("") {
        return Err(vec![FieldError::new("name", "Group name is required")]);
    }

    Ok(GroupChanges {
        name,
        description: payload.description.map(|d| d.trim().to_string()),
        color: payload.color.map(|c| non_blank_or(Some(c), DEFAULT_GROUP_COLOR)),
        icon: payload.icon.map(|i| non_blank_or(Some(i), DEFAULT_GROUP_ICON)),
        is_private: payload.is_private,
    })
}

fn non_blank_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(name: &str, email: &str, phone: &str) -> ContactPayload {
        ContactPayload {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            phone: Some(phone.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("ann@x.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("ann@x"));
        assert!(!is_valid_email("ann x@y.com"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_new_contact_is_normalised() {
        let mut input = payload("  Ann  ", "  Ann@X.COM ", " 555-0100 ");
        input.tags = Some(TagsInput::Joined(" vip, ,friend ,vip".to_string()));

        let contact = validate_new_contact(input).unwrap();

        assert_eq!(contact.name, "Ann");
        assert_eq!(contact.email, "ann@x.com");
        assert_eq!(contact.phone, "555-0100");
        assert_eq!(contact.tags, vec!["vip", "friend"]);
        assert_eq!(contact.category, Category::Personal);
        assert_eq!(contact.status, ContactStatus::Active);
        assert_eq!(contact.source, ContactSource::Manual);
        assert!(!contact.starred);
    }

    #[test]
    fn test_new_contact_reports_every_bad_field() {
        let mut input = payload("", "not-an-email", "  ");
        input.category = Some("Enemies".to_string());

        let errors = validate_new_contact(input).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        assert_eq!(fields, vec!["name", "email", "phone", "category"]);
    }

    #[test]
    fn test_missing_email_is_rejected() {
        let input = ContactPayload {
            name: Some("Ann".into()),
            phone: Some("1".into()),
            ..Default::default()
        };
        let errors = validate_new_contact(input).unwrap_err();
        assert_eq!(errors[0].field, "email");
    }

    #[test]
    fn test_changes_only_check_supplied_fields() {
        let changes = validate_contact_changes(ContactPayload {
            status: Some("Archived".into()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(changes.status, Some(ContactStatus::Archived));
        assert_eq!(changes.name, None);
        assert_eq!(changes.email, None);

        let errors = validate_contact_changes(ContactPayload {
            email: Some("broken".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(errors[0].field, "email");
    }

    #[test]
    fn test_group_ids_are_deduplicated() {
        let ids = normalize_group_ids(vec!["a".into(), " b ".into(), "a".into(), "".into()]);
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_new_group_defaults() {
        let group = validate_new_group(GroupPayload {
            name: Some("  Work ".into()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(group.name.as_deref(), Some("Work"));
        assert_eq!(group.description.as_deref(), Some(""));
        assert_eq!(group.color.as_deref(), Some(DEFAULT_GROUP_COLOR));
        assert_eq!(group.icon.as_deref(), Some(DEFAULT_GROUP_ICON));
        assert_eq!(group.is_private, Some(false));

        assert!(validate_new_group(GroupPayload::default()).is_err());
        assert!(
            validate_group_changes(GroupPayload {
                name: Some("   ".into()),
                ..Default::default()
            })
            .is_err()
        );
    }
}
