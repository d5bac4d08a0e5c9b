//! Document model: the unit of persistence and wire transfer.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Record, RecordFields};

/// Current id-based schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Photo assigned to members created without one.
pub const DEFAULT_PHOTO: &str = "assets/default-avatar.png";

/// The whole family tree plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub schema_version: i32,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_at: Option<String>,
    pub updated_at: String,
    pub records: Vec<Record>,
}

impl Document {
    /// An empty document stamped with the current time.
    pub fn empty() -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: now.clone(),
            migrated_at: None,
            updated_at: now,
            records: Vec::new(),
        }
    }

    /// The built-in seed: a single root record.
    pub fn seed(name: &str) -> Self {
        let mut document = Self::empty();
        document.records.push(Record::new(
            uuid::Uuid::new_v4().to_string(),
            RecordFields {
                name: name.to_string(),
                photo: Some(DEFAULT_PHOTO.to_string()),
                ..RecordFields::default()
            },
        ));
        document
    }

    /// Whether a raw JSON value carries the id-based marker.
    pub fn is_id_based(value: &serde_json::Value) -> bool {
        value.get("schemaVersion").is_some_and(|v| v.is_number())
            && value.get("records").is_some_and(|v| v.is_array())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }

    /// Human-readable export form.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seed_has_single_root() {
        let document = Document::seed("Root");
        assert_eq!(document.records.len(), 1);
        assert_eq!(document.records[0].name, "Root");
        assert_eq!(document.records[0].photo.as_deref(), Some(DEFAULT_PHOTO));
        assert_eq!(document.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_id_based_marker() {
        let value = serde_json::to_value(Document::seed("Root")).unwrap();
        assert!(Document::is_id_based(&value));

        let legacy = json!({ "Root": { "birth": "", "children": {} } });
        assert!(!Document::is_id_based(&legacy));
    }
}
