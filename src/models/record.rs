//! Record model: one person in the family tree.

use serde::{Deserialize, Serialize};

/// Spousal pairing of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpouseRef {
    #[default]
    None,
    /// Partner is another record in the same document
    Internal(String),
    /// Partner known only by a free-text name
    External(String),
}

impl SpouseRef {
    pub fn internal_id(&self) -> Option<&str> {
        match self {
            SpouseRef::Internal(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SpouseRef::None)
    }
}

/// A person in the family tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordWire", into = "RecordWire")]
pub struct Record {
    pub id: String,
    pub name: String,
    pub birth: Option<String>,
    pub death: Option<String>,
    pub photo: Option<String>,
    pub spouse: SpouseRef,
    /// Ordered child ids, no duplicates
    pub children: Vec<String>,
}

impl Record {
    pub fn new(id: String, fields: RecordFields) -> Self {
        Self {
            id,
            name: fields.name,
            birth: fields.birth,
            death: fields.death,
            photo: fields.photo,
            spouse: SpouseRef::None,
            children: Vec::new(),
        }
    }

    pub fn has_child(&self, id: &str) -> bool {
        self.children.iter().any(|c| c == id)
    }
}

/// Descriptive fields supplied when a record is created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFields {
    pub name: String,
    pub birth: Option<String>,
    pub death: Option<String>,
    pub photo: Option<String>,
}

impl RecordFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Serialized form of a record with the spouse split into two optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    death: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spouse_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spouse_external_name: Option<String>,
    #[serde(default)]
    children: Vec<String>,
}

impl TryFrom<RecordWire> for Record {
    type Error = String;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        let spouse_id = wire.spouse_id.filter(|s| !s.is_empty());
        let external = wire.spouse_external_name.filter(|s| !s.trim().is_empty());
        let spouse = match (spouse_id, external) {
            (Some(_), Some(_)) => {
                return Err(format!(
                    "record {} has both spouseId and spouseExternalName",
                    wire.id
                ))
            }
            (Some(id), None) => SpouseRef::Internal(id),
            (None, Some(name)) => SpouseRef::External(name),
            (None, None) => SpouseRef::None,
        };

        Ok(Record {
            id: wire.id,
            name: wire.name,
            birth: wire.birth,
            death: wire.death,
            photo: wire.photo,
            spouse,
            children: wire.children,
        })
    }
}

impl From<Record> for RecordWire {
    fn from(record: Record) -> Self {
        let (spouse_id, spouse_external_name) = match record.spouse {
            SpouseRef::None => (None, None),
            SpouseRef::Internal(id) => (Some(id), None),
            SpouseRef::External(name) => (None, Some(name)),
        };

        RecordWire {
            id: record.id,
            name: record.name,
            birth: record.birth,
            death: record.death,
            photo: record.photo,
            spouse_id,
            spouse_external_name,
            children: record.children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spouse_serializes_as_split_fields() {
        let mut record = Record::new("a".to_string(), RecordFields::named("Ann"));
        record.spouse = SpouseRef::External("Jane".to_string());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["spouseExternalName"], "Jane");
        assert!(value.get("spouseId").is_none());
        assert_eq!(value["children"], json!([]));
    }

    #[test]
    fn test_both_spouse_fields_rejected() {
        let raw = json!({
            "id": "a",
            "name": "Ann",
            "spouseId": "b",
            "spouseExternalName": "Jane"
        });

        let err = serde_json::from_value::<Record>(raw).unwrap_err();
        assert!(err.to_string().contains("both spouseId and spouseExternalName"));
    }

    #[test]
    fn test_empty_spouse_fields_mean_unpaired() {
        let raw = json!({ "id": "a", "name": "Ann", "spouseId": "", "spouseExternalName": " " });
        let record: Record = serde_json::from_value(raw).unwrap();
        assert!(record.spouse.is_none());
    }
}
