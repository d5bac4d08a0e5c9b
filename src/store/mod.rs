//! Entity store: referential-integrity operations on a [`Document`].
//!
//! Every operation either completes fully or returns an error before touching
//! any record, so callers never observe a half-applied change.

use std::collections::HashSet;

use serde::Serialize;

use crate::errors::{AppError, ValidationError};
use crate::models::{Document, Record, RecordFields, SpouseRef};

/// Minimum query length before name suggestions are offered.
pub const SUGGEST_MIN_CHARS: usize = 2;

/// Maximum number of name suggestions returned.
pub const SUGGEST_LIMIT: usize = 8;

/// A search match together with its descendant closure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub descendants: Vec<String>,
}

impl Document {
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn require(&self, id: &str) -> Result<&Record, AppError> {
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))
    }

    /// Create a detached record and return its fresh id.
    pub fn create_record(&mut self, fields: RecordFields) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.records.push(Record::new(id.clone(), fields));
        id
    }

    /// Append `child` to `parent`'s children. Returns false when already present.
    pub fn add_child(&mut self, parent_id: &str, child_id: &str) -> Result<bool, AppError> {
        if parent_id == child_id {
            return Err(ValidationError::SelfParenting.into());
        }
        self.require(child_id)?;
        self.require(parent_id)?;

        let Some(parent) = self.get_mut(parent_id) else {
            return Ok(false);
        };
        if parent.has_child(child_id) {
            return Ok(false);
        }
        parent.children.push(child_id.to_string());
        Ok(true)
    }

    /// Pair two records, severing their previous pairings and sharing children.
    pub fn link_spouse(&mut self, a: &str, b: &str) -> Result<(), AppError> {
        if a == b {
            return Err(ValidationError::SelfPairing.into());
        }
        self.require(a)?;
        self.require(b)?;

        self.sever(a);
        self.sever(b);

        let mut union = self.get(a).map(|r| r.children.clone()).unwrap_or_default();
        if let Some(rb) = self.get(b) {
            for child in &rb.children {
                if !union.contains(child) {
                    union.push(child.clone());
                }
            }
        }

        if let Some(ra) = self.get_mut(a) {
            ra.spouse = SpouseRef::Internal(b.to_string());
            ra.children = union.iter().filter(|c| c.as_str() != a).cloned().collect();
        }
        if let Some(rb) = self.get_mut(b) {
            rb.spouse = SpouseRef::Internal(a.to_string());
            rb.children = union.iter().filter(|c| c.as_str() != b).cloned().collect();
        }
        Ok(())
    }

    /// Clear `id`'s pairing and the partner's back-link.
    pub fn unlink_spouse(&mut self, id: &str) -> Result<(), AppError> {
        self.require(id)?;
        self.sever(id);
        Ok(())
    }

    /// Record a free-text partner. Any internal partner is unlinked on both ends.
    pub fn set_spouse_external(&mut self, id: &str, name: &str) -> Result<(), AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::NameRequired.into());
        }
        self.require(id)?;
        self.sever(id);
        if let Some(record) = self.get_mut(id) {
            record.spouse = SpouseRef::External(name.to_string());
        }
        Ok(())
    }

    fn sever(&mut self, id: &str) {
        let partner = match self.get_mut(id) {
            Some(record) => match std::mem::take(&mut record.spouse) {
                SpouseRef::Internal(partner) => partner,
                _ => return,
            },
            None => return,
        };
        if let Some(other) = self.get_mut(&partner) {
            if other.spouse.internal_id() == Some(id) {
                other.spouse = SpouseRef::None;
            }
        }
    }

    /// Ids reachable from `root` through `children`, root first. Cycle-safe.
    pub fn descendants(&self, root: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![root.to_string()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(record) = self.get(&id) else {
                continue;
            };
            for child in record.children.iter().rev() {
                if !visited.contains(child) {
                    stack.push(child.clone());
                }
            }
            order.push(id);
        }
        order
    }

    /// Remove `root` and its descendant closure, repairing every survivor.
    ///
    /// Returns the removed ids; empty when `root` is unknown.
    pub fn delete_subtree(&mut self, root: &str) -> Vec<String> {
        if !self.contains(root) {
            return Vec::new();
        }

        let removed = self.descendants(root);
        let doomed: HashSet<&str> = removed.iter().map(String::as_str).collect();

        self.records.retain(|r| !doomed.contains(r.id.as_str()));
        for record in &mut self.records {
            record.children.retain(|c| !doomed.contains(c.as_str()));
            if record
                .spouse
                .internal_id()
                .is_some_and(|s| doomed.contains(s))
            {
                record.spouse = SpouseRef::None;
            }
        }
        removed
    }

    /// First record whose name matches exactly, in document order.
    pub fn find_by_name(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn find_by_name_excluding(&self, name: &str, exclude_id: &str) -> Option<&Record> {
        self.records
            .iter()
            .find(|r| r.name == name && r.id != exclude_id)
    }

    pub fn spouse_of(&self, id: &str) -> Option<&Record> {
        self.get(id)
            .and_then(|r| r.spouse.internal_id())
            .and_then(|s| self.get(s))
    }

    /// Records that are nobody's child; every record when that set is empty.
    pub fn roots(&self) -> Vec<&Record> {
        let referenced: HashSet<&str> = self
            .records
            .iter()
            .flat_map(|r| r.children.iter().map(String::as_str))
            .collect();

        let roots: Vec<&Record> = self
            .records
            .iter()
            .filter(|r| !referenced.contains(r.id.as_str()))
            .collect();

        if roots.is_empty() {
            self.records.iter().collect()
        } else {
            roots
        }
    }

    /// Case-insensitive substring search over names.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.records
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&query))
            .map(|r| SearchHit {
                id: r.id.clone(),
                name: r.name.clone(),
                descendants: self.descendants(&r.id).into_iter().skip(1).collect(),
            })
            .collect()
    }

    /// Autocomplete: prefix matches first, then substring matches.
    pub fn suggest_names(&self, query: &str) -> Vec<String> {
        let query = query.trim().to_lowercase();
        if query.chars().count() < SUGGEST_MIN_CHARS {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut starts = Vec::new();
        let mut contains = Vec::new();
        for record in &self.records {
            if !seen.insert(record.name.as_str()) {
                continue;
            }
            let lower = record.name.to_lowercase();
            if lower.starts_with(&query) {
                starts.push(record.name.clone());
            } else if lower.contains(&query) {
                contains.push(record.name.clone());
            }
        }
        starts.extend(contains);
        starts.truncate(SUGGEST_LIMIT);
        starts
    }

    /// Reject documents whose structure cannot be repaired.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut ids = HashSet::new();
        for record in &self.records {
            if record.id.trim().is_empty() {
                return Err(AppError::CorruptData(format!(
                    "record {:?} has an empty id",
                    record.name
                )));
            }
            if !ids.insert(record.id.as_str()) {
                return Err(AppError::CorruptData(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
            if record.spouse.internal_id() == Some(record.id.as_str()) {
                return Err(AppError::CorruptData(format!(
                    "record {} is paired with itself",
                    record.id
                )));
            }
            if record.has_child(&record.id) {
                return Err(AppError::CorruptData(format!(
                    "record {} lists itself as a child",
                    record.id
                )));
            }
        }
        Ok(())
    }

    /// Repair dangling references, duplicate children and one-sided pairings.
    ///
    /// Returns the number of repairs made.
    pub fn normalize(&mut self) -> usize {
        let ids: HashSet<String> = self.records.iter().map(|r| r.id.clone()).collect();
        let mut repairs = 0;

        for record in &mut self.records {
            let before = record.children.len();
            let mut seen = HashSet::new();
            record
                .children
                .retain(|c| ids.contains(c) && seen.insert(c.clone()));
            if record.children.len() != before {
                tracing::warn!(
                    "Dropped {} dangling or duplicate children from {}",
                    before - record.children.len(),
                    record.id
                );
                repairs += before - record.children.len();
            }

            if record.spouse.internal_id().is_some_and(|s| !ids.contains(s)) {
                tracing::warn!("Cleared dangling spouse link on {}", record.id);
                record.spouse = SpouseRef::None;
                repairs += 1;
            }
        }

        let one_sided: Vec<String> = self
            .records
            .iter()
            .filter(|r| {
                r.spouse
                    .internal_id()
                    .and_then(|s| self.get(s))
                    .is_some_and(|p| p.spouse.internal_id() != Some(r.id.as_str()))
            })
            .map(|r| r.id.clone())
            .collect();
        for id in one_sided {
            if let Some(record) = self.get_mut(&id) {
                tracing::warn!("Cleared one-sided spouse link on {}", id);
                record.spouse = SpouseRef::None;
                repairs += 1;
            }
        }

        repairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(names: &[&str]) -> (Document, Vec<String>) {
        let mut document = Document::empty();
        let ids = names
            .iter()
            .map(|n| document.create_record(RecordFields::named(*n)))
            .collect();
        (document, ids)
    }

    fn assert_spouses_mutual(document: &Document) {
        for record in &document.records {
            if let Some(partner) = record.spouse.internal_id() {
                let other = document.get(partner).expect("partner exists");
                assert_eq!(other.spouse.internal_id(), Some(record.id.as_str()));
            }
        }
    }

    #[test]
    fn test_add_child_is_idempotent() {
        let (mut document, ids) = doc_with(&["Root", "Child"]);

        assert!(document.add_child(&ids[0], &ids[1]).unwrap());
        assert!(!document.add_child(&ids[0], &ids[1]).unwrap());
        assert_eq!(document.get(&ids[0]).unwrap().children, vec![ids[1].clone()]);
    }

    #[test]
    fn test_add_child_rejects_self_and_unknown() {
        let (mut document, ids) = doc_with(&["Root"]);

        assert_eq!(
            document.add_child(&ids[0], &ids[0]),
            Err(AppError::Validation(ValidationError::SelfParenting))
        );
        assert!(matches!(
            document.add_child(&ids[0], "missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_link_spouse_rejects_self() {
        let (mut document, ids) = doc_with(&["Root"]);
        let before = document.clone();

        assert_eq!(
            document.link_spouse(&ids[0], &ids[0]),
            Err(AppError::Validation(ValidationError::SelfPairing))
        );
        assert_eq!(document, before);
    }

    #[test]
    fn test_link_spouse_unions_children() {
        let (mut document, ids) = doc_with(&["Root", "Ann", "C1", "C2"]);
        document.add_child(&ids[0], &ids[2]).unwrap();
        document.add_child(&ids[1], &ids[3]).unwrap();

        document.link_spouse(&ids[0], &ids[1]).unwrap();

        let expected = vec![ids[2].clone(), ids[3].clone()];
        assert_eq!(document.get(&ids[0]).unwrap().children, expected);
        assert_eq!(document.get(&ids[1]).unwrap().children, expected);
        assert_spouses_mutual(&document);
    }

    #[test]
    fn test_link_spouse_severs_previous_partners() {
        let (mut document, ids) = doc_with(&["A", "B", "C", "D"]);
        document.link_spouse(&ids[0], &ids[1]).unwrap();
        document.link_spouse(&ids[2], &ids[3]).unwrap();

        document.link_spouse(&ids[0], &ids[2]).unwrap();

        assert!(document.get(&ids[1]).unwrap().spouse.is_none());
        assert!(document.get(&ids[3]).unwrap().spouse.is_none());
        assert_eq!(document.spouse_of(&ids[0]).unwrap().id, ids[2]);
        assert_spouses_mutual(&document);
    }

    #[test]
    fn test_link_spouse_replaces_external_name() {
        let (mut document, ids) = doc_with(&["A", "B"]);
        document.set_spouse_external(&ids[0], "Jane").unwrap();

        document.link_spouse(&ids[0], &ids[1]).unwrap();

        assert_eq!(
            document.get(&ids[0]).unwrap().spouse,
            SpouseRef::Internal(ids[1].clone())
        );
    }

    #[test]
    fn test_link_spouse_never_makes_record_its_own_child() {
        let (mut document, ids) = doc_with(&["Parent", "Kid"]);
        document.add_child(&ids[0], &ids[1]).unwrap();

        document.link_spouse(&ids[0], &ids[1]).unwrap();

        assert!(!document.get(&ids[1]).unwrap().has_child(&ids[1]));
        assert!(document.validate().is_ok());
    }

    #[test]
    fn test_set_spouse_external_unlinks_old_partner() {
        let (mut document, ids) = doc_with(&["A", "B"]);
        document.link_spouse(&ids[0], &ids[1]).unwrap();

        document.set_spouse_external(&ids[0], "Jane").unwrap();

        assert_eq!(
            document.get(&ids[0]).unwrap().spouse,
            SpouseRef::External("Jane".to_string())
        );
        assert!(document.get(&ids[1]).unwrap().spouse.is_none());
    }

    #[test]
    fn test_delete_subtree_removes_closure_and_repairs() {
        let (mut document, ids) = doc_with(&["Root", "Ann", "Kid", "Grandkid", "Other"]);
        document.add_child(&ids[0], &ids[1]).unwrap();
        document.add_child(&ids[1], &ids[2]).unwrap();
        document.add_child(&ids[2], &ids[3]).unwrap();
        document.link_spouse(&ids[1], &ids[4]).unwrap();

        let removed = document.delete_subtree(&ids[1]);

        assert_eq!(removed.len(), 3);
        assert!(document.get(&ids[1]).is_none());
        assert!(document.get(&ids[3]).is_none());
        let other = document.get(&ids[4]).unwrap();
        assert!(other.spouse.is_none());
        assert!(other.children.is_empty());
        assert!(document.get(&ids[0]).unwrap().children.is_empty());
    }

    #[test]
    fn test_delete_subtree_is_cycle_safe() {
        let (mut document, ids) = doc_with(&["A", "B"]);
        document.add_child(&ids[0], &ids[1]).unwrap();
        document.add_child(&ids[1], &ids[0]).unwrap();

        let removed = document.delete_subtree(&ids[0]);

        assert_eq!(removed.len(), 2);
        assert!(document.records.is_empty());
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let (mut document, _) = doc_with(&["Root"]);
        let before = document.clone();

        assert!(document.delete_subtree("missing").is_empty());
        assert_eq!(document, before);
    }

    #[test]
    fn test_roots_fall_back_to_all_records_when_cyclic() {
        let (mut document, ids) = doc_with(&["A", "B", "C"]);
        document.add_child(&ids[0], &ids[1]).unwrap();
        assert_eq!(document.roots().len(), 2);

        document.add_child(&ids[1], &ids[0]).unwrap();
        document.add_child(&ids[1], &ids[2]).unwrap();
        assert_eq!(document.roots().len(), 3);
    }

    #[test]
    fn test_find_by_name_returns_first_match() {
        let (document, ids) = doc_with(&["Ann", "Ann"]);
        assert_eq!(document.find_by_name("Ann").unwrap().id, ids[0]);
        assert_eq!(
            document.find_by_name_excluding("Ann", &ids[0]).unwrap().id,
            ids[1]
        );
        assert!(document.find_by_name("ann").is_none());
    }

    #[test]
    fn test_search_includes_descendants() {
        let (mut document, ids) = doc_with(&["Grandpa", "Father", "Son"]);
        document.add_child(&ids[0], &ids[1]).unwrap();
        document.add_child(&ids[1], &ids[2]).unwrap();

        let hits = document.search("fath");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].descendants, vec![ids[2].clone()]);
    }

    #[test]
    fn test_suggest_names_prefers_prefix_matches() {
        let (document, _) = doc_with(&["Mariam", "Ammar", "Maria", "Mariam"]);

        assert!(document.suggest_names("m").is_empty());
        assert_eq!(
            document.suggest_names("ma"),
            vec!["Mariam".to_string(), "Maria".to_string(), "Ammar".to_string()]
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let (mut document, _) = doc_with(&["A"]);
        let copy = document.records[0].clone();
        document.records.push(copy);

        assert!(matches!(document.validate(), Err(AppError::CorruptData(_))));
    }

    #[test]
    fn test_normalize_repairs_references() {
        let (mut document, ids) = doc_with(&["A", "B", "C"]);
        document.records[0].children = vec![ids[1].clone(), "ghost".into(), ids[1].clone()];
        document.records[1].spouse = SpouseRef::Internal("ghost".into());
        document.records[2].spouse = SpouseRef::Internal(ids[0].clone());

        let repairs = document.normalize();

        assert_eq!(repairs, 4);
        assert_eq!(document.records[0].children, vec![ids[1].clone()]);
        assert!(document.records[1].spouse.is_none());
        assert!(document.records[2].spouse.is_none());
    }
}
