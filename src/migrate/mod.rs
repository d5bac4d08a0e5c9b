//! Legacy document migration.
//!
//! The legacy format is a nested mapping of name to node, where each node holds
//! its descriptive fields and a nested `children` mapping of the same shape.
//! Spousal pairings in that format are not carried over.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::models::{Document, Record, RecordFields};

/// Whether `value` has the nested name-keyed shape of the legacy format.
pub fn is_legacy(value: &Value) -> bool {
    if Document::is_id_based(value) {
        return false;
    }
    match value.as_object() {
        Some(map) => !map.is_empty() && map.values().all(Value::is_object),
        None => false,
    }
}

/// Turn any supported document into a validated, normalized [`Document`].
///
/// Id-based documents pass through without migration.
pub fn load_document(value: Value) -> Result<Document, AppError> {
    let mut document = if Document::is_id_based(&value) {
        serde_json::from_value::<Document>(value)?
    } else if is_legacy(&value) {
        migrate_legacy(&value)?
    } else {
        return Err(AppError::CorruptData(
            "document is neither id-based nor legacy".to_string(),
        ));
    };

    document.validate()?;
    let repairs = document.normalize();
    if repairs > 0 {
        tracing::warn!("Repaired {} references in loaded document", repairs);
    }
    Ok(document)
}

/// Convert a legacy nested document into the id-based shape.
pub fn migrate_legacy(value: &Value) -> Result<Document, AppError> {
    if !is_legacy(value) {
        return Err(AppError::CorruptData(
            "document is not in the legacy format".to_string(),
        ));
    }
    let Some(top) = value.as_object() else {
        return Err(AppError::CorruptData("legacy document must be an object".into()));
    };

    // Pass 1: allocate an id per node, keyed by its name path.
    let mut ids: HashMap<Vec<String>, String> = HashMap::new();
    let mut records = Vec::new();
    let mut dropped_spouses = 0;
    let mut path = Vec::new();
    allocate(top, &mut path, &mut ids, &mut records, &mut dropped_spouses)?;

    // Pass 2: translate nested child names into id references.
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        index.insert(record.id.clone(), i);
    }
    link(top, &mut path, &ids, &index, &mut records);

    if dropped_spouses > 0 {
        tracing::warn!(
            "Legacy migration dropped {} spouse pairings",
            dropped_spouses
        );
    }
    tracing::info!("Migrated legacy document with {} records", records.len());

    let mut document = Document::empty();
    document.migrated_at = Some(Utc::now().to_rfc3339());
    document.records = records;
    Ok(document)
}

fn allocate(
    level: &Map<String, Value>,
    path: &mut Vec<String>,
    ids: &mut HashMap<Vec<String>, String>,
    records: &mut Vec<Record>,
    dropped_spouses: &mut usize,
) -> Result<(), AppError> {
    for (name, node) in level {
        let Some(node) = node.as_object() else {
            return Err(AppError::CorruptData(format!(
                "legacy node {:?} is not an object",
                name
            )));
        };
        if name.trim().is_empty() {
            return Err(AppError::CorruptData("legacy node with empty name".into()));
        }

        path.push(name.clone());
        let id = uuid::Uuid::new_v4().to_string();
        ids.insert(path.clone(), id.clone());
        records.push(Record::new(
            id,
            RecordFields {
                name: name.clone(),
                birth: text_field(node, "birth"),
                death: text_field(node, "death"),
                photo: text_field(node, "photo"),
            },
        ));
        if text_field(node, "spouse").is_some() {
            *dropped_spouses += 1;
        }

        if let Some(children) = children_of(node) {
            allocate(children, path, ids, records, dropped_spouses)?;
        }
        path.pop();
    }
    Ok(())
}

fn link(
    level: &Map<String, Value>,
    path: &mut Vec<String>,
    ids: &HashMap<Vec<String>, String>,
    index: &HashMap<String, usize>,
    records: &mut [Record],
) {
    for (name, node) in level {
        path.push(name.clone());
        if let Some(children) = node.as_object().and_then(children_of) {
            let child_ids: Vec<String> = children
                .keys()
                .filter_map(|child| {
                    path.push(child.clone());
                    let id = ids.get(path.as_slice()).cloned();
                    path.pop();
                    id
                })
                .collect();
            if let Some(&slot) = ids.get(path.as_slice()).and_then(|id| index.get(id)) {
                records[slot].children = child_ids;
            }
            link(children, path, ids, index, records);
        }
        path.pop();
    }
}

fn children_of(node: &Map<String, Value>) -> Option<&Map<String, Value>> {
    node.get("children").and_then(Value::as_object)
}

fn text_field(node: &Map<String, Value>, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_sample() -> Value {
        json!({
            "Puang Guru Nasing": {
                "birth": "1900",
                "death": "",
                "photo": "assets/default-avatar.png",
                "children": {
                    "Andi": {
                        "birth": "1930",
                        "spouse": "Becce",
                        "children": {
                            "Baso": { "children": {} }
                        }
                    },
                    "Becce": {
                        "spouse": "Andi",
                        "children": {
                            "Baso": {}
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_migrates_nested_children() {
        let document = migrate_legacy(&legacy_sample()).unwrap();

        assert_eq!(document.records.len(), 5);
        assert!(document.migrated_at.is_some());

        let root = document.find_by_name("Puang Guru Nasing").unwrap();
        assert_eq!(root.birth.as_deref(), Some("1900"));
        assert!(root.death.is_none());
        assert_eq!(root.children.len(), 2);

        let andi = document.find_by_name("Andi").unwrap();
        assert_eq!(andi.children.len(), 1);
        assert_eq!(document.get(&andi.children[0]).unwrap().name, "Baso");
    }

    #[test]
    fn test_same_name_under_different_parents_stays_distinct() {
        let document = migrate_legacy(&legacy_sample()).unwrap();

        let andi = document.find_by_name("Andi").unwrap();
        let becce = document.find_by_name("Becce").unwrap();
        assert_ne!(andi.children[0], becce.children[0]);
        assert_eq!(
            document.records.iter().filter(|r| r.name == "Baso").count(),
            2
        );
    }

    #[test]
    fn test_sibling_and_record_order_is_preserved() {
        let legacy: Value = serde_json::from_str(
            r#"{"Root":{"children":{"Zaid":{},"Andi":{},"Maya":{}}},"Elder":{}}"#,
        )
        .unwrap();

        let document = migrate_legacy(&legacy).unwrap();

        let root = document.find_by_name("Root").unwrap();
        let children: Vec<&str> = root
            .children
            .iter()
            .map(|id| document.get(id).unwrap().name.as_str())
            .collect();
        assert_eq!(children, vec!["Zaid", "Andi", "Maya"]);

        let names: Vec<&str> = document.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Zaid", "Andi", "Maya", "Elder"]);
    }

    #[test]
    fn test_spouses_are_not_reconstructed() {
        let document = migrate_legacy(&legacy_sample()).unwrap();
        assert!(document.records.iter().all(|r| r.spouse.is_none()));
    }

    #[test]
    fn test_id_based_document_loads_unchanged() {
        let original = Document::seed("Root");
        let value = serde_json::to_value(&original).unwrap();

        let loaded = load_document(value).unwrap();

        assert_eq!(loaded, original);
        assert!(loaded.migrated_at.is_none());
    }

    #[test]
    fn test_remigrating_output_is_rejected() {
        let migrated = migrate_legacy(&legacy_sample()).unwrap();
        let value = serde_json::to_value(&migrated).unwrap();

        assert!(matches!(
            migrate_legacy(&value),
            Err(AppError::CorruptData(_))
        ));
    }

    #[test]
    fn test_unrecognized_shapes_are_corrupt() {
        assert!(load_document(json!([1, 2, 3])).is_err());
        assert!(load_document(json!({})).is_err());
        assert!(load_document(json!({ "Root": "not a node" })).is_err());
    }
}
