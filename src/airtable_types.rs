use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};

/// One page of the Airtable "list records" endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsPage {
    pub records: Vec<SourceRow>,
    pub offset: Option<String>, // continuation token, absent on the last page
}

/// A raw Airtable row. Airtable leaves empty cells out of `fields` entirely,
/// so every lookup goes through the typed accessors below.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRow {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl SourceRow {
    pub fn new(id: &str, fields: Map<String, Value>) -> Self {
        SourceRow {
            id: id.to_string(),
            fields,
        }
    }

    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            // multiple select / linked records
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
            // collaborator fields
            Value::Object(obj) => obj
                .get("name")
                .or_else(|| obj.get("email"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            Value::Null => None,
        }
    }

    pub fn text_or(&self, field: &str, default: &str) -> String {
        self.text(field).unwrap_or_else(|| default.to_string())
    }

    pub fn count_or(&self, field: &str, default: u32) -> u32 {
        match self.fields.get(field) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Accepts `YYYY-MM-DD`, RFC 3339 timestamps (reduced to their UTC date)
    /// and naive `YYYY-MM-DDTHH:MM:SS` datetimes.
    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        let raw = self.fields.get(field)?.as_str()?.trim();

        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc().date());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| dt.date())
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => obj.get("name").and_then(|v| v.as_str()).map(|s| s.to_string()),
        _ => None,
    }
}
