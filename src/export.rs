//! Contact export as CSV or JSON.

use serde::Serialize;

use crate::model::Contact;

/// Timestamp layout of the CSV `Created` column.
const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    /// `Content-Disposition` value offering the export as a download.
    pub fn disposition(&self) -> String {
        format!("attachment; filename=contacts.{}", self.as_str())
    }

    pub fn render(&self, contacts: &[Contact]) -> anyhow::Result<Vec<u8>> {
        match self {
            ExportFormat::Csv => render_csv(contacts),
            ExportFormat::Json => Ok(serde_json::to_vec(contacts)?),
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Email")]
    email: &'a str,
    #[serde(rename = "Phone")]
    phone: &'a str,
    #[serde(rename = "Category")]
    category: &'static str,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Tags")]
    tags: String,
    #[serde(rename = "Created")]
    created: String,
}

impl<'a> From<&'a Contact> for CsvRow<'a> {
    fn from(contact: &'a Contact) -> Self {
        Self {
            name: &contact.name,
            email: &contact.email,
            phone: &contact.phone,
            category: contact.category.as_str(),
            status: contact.status.as_str(),
            tags: contact.tags.join(", "),
            created: contact.created_at.format(CREATED_FORMAT).to_string(),
        }
    }
}

/// Render contacts as CSV with a header row.
pub fn render_csv(contacts: &[Contact]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    if contacts.is_empty() {
        writer.write_record(["Name", "Email", "Phone", "Category", "Status", "Tags", "Created"])?;
    }
    for contact in contacts {
        writer.serialize(CsvRow::from(contact))?;
    }

    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}
