//! Mutation API over the shared replica.
//!
//! Each mutating call validates first, applies the change under the replica
//! lock, writes the document through to the local cache and marks the sync
//! engine dirty before returning.

use serde_json::Value;

use crate::db::LocalCache;
use crate::errors::{AppError, ValidationError};
use crate::migrate::load_document;
use crate::models::{
    AddMemberRequest, Document, EditMemberRequest, Record, RecordFields, SpouseRef,
    DEFAULT_PHOTO,
};
use crate::store::SearchHit;
use crate::sync::{Replica, SharedReplica, SyncHandle};

/// Resolved spouse change for an edit.
enum SpouseChange {
    Keep,
    Clear,
    Link(String),
    External(String),
}

/// The family-tree operations exposed to the presentation layer.
#[derive(Clone)]
pub struct FamilyService {
    replica: SharedReplica,
    cache: LocalCache,
    sync: SyncHandle,
}

impl FamilyService {
    pub fn new(replica: SharedReplica, cache: LocalCache, sync: SyncHandle) -> Self {
        Self {
            replica,
            cache,
            sync,
        }
    }

    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    pub fn revision(&self) -> u64 {
        self.sync.snapshot().revision
    }

    // ==================== QUERIES ====================

    pub async fn document(&self) -> Document {
        self.replica.lock().await.document.clone()
    }

    pub async fn record(&self, id: &str) -> Result<Record, AppError> {
        self.replica
            .lock()
            .await
            .document
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))
    }

    pub async fn roots(&self) -> Vec<Record> {
        let replica = self.replica.lock().await;
        replica.document.roots().into_iter().cloned().collect()
    }

    pub async fn search(&self, query: &str) -> Vec<SearchHit> {
        self.replica.lock().await.document.search(query)
    }

    pub async fn suggest_names(&self, prefix: &str) -> Vec<String> {
        self.replica.lock().await.document.suggest_names(prefix)
    }

    /// Pretty-printed document for download.
    pub async fn export(&self) -> Result<String, AppError> {
        Ok(self.replica.lock().await.document.to_pretty_json()?)
    }

    // ==================== MUTATIONS ====================

    /// Add a member, optionally under an existing parent (and the parent's spouse).
    pub async fn add_member(&self, request: &AddMemberRequest) -> Result<Record, AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ValidationError::NameRequired.into());
        }
        let parent_name = request
            .parent_name
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let mut replica = self.replica.lock().await;

        let parents = match parent_name {
            Some(parent_name) => {
                let parent = replica
                    .document
                    .find_by_name(parent_name)
                    .ok_or_else(|| AppError::ParentNotFound(parent_name.to_string()))?;
                let mut parents = vec![parent.id.clone()];
                if let Some(spouse) = parent.spouse.internal_id() {
                    parents.push(spouse.to_string());
                }
                parents
            }
            None => Vec::new(),
        };

        let id = replica.document.create_record(RecordFields {
            name: name.to_string(),
            birth: non_empty(request.birth.as_deref()),
            death: non_empty(request.death.as_deref()),
            photo: non_empty(request.photo.as_deref()).or_else(|| Some(DEFAULT_PHOTO.to_string())),
        });
        for parent in &parents {
            replica.document.add_child(parent, &id)?;
        }

        self.commit(&mut replica, "Local changes not yet uploaded").await;
        tracing::info!("Added member {} ({})", name, id);

        replica
            .document
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::Internal("added member vanished".to_string()))
    }

    /// Update fields and the spousal pairing of an existing member.
    pub async fn edit_member(
        &self,
        id: &str,
        request: &EditMemberRequest,
    ) -> Result<Record, AppError> {
        let mut replica = self.replica.lock().await;

        let current = replica
            .document
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))?;
        let new_name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let effective_name = new_name.clone().unwrap_or_else(|| current.name.clone());

        let spouse_change = match request.spouse.as_deref().map(str::trim) {
            None => SpouseChange::Keep,
            Some("") => SpouseChange::Clear,
            Some(text) => match replica.document.find_by_name_excluding(text, id) {
                Some(partner) => SpouseChange::Link(partner.id.clone()),
                None if text == effective_name => {
                    return Err(ValidationError::SelfPairing.into());
                }
                None => SpouseChange::External(text.to_string()),
            },
        };

        let unchanged = new_name.as_deref().map_or(true, |n| n == current.name)
            && request.birth.as_deref().map_or(true, |b| non_empty(Some(b)) == current.birth)
            && request.death.as_deref().map_or(true, |d| non_empty(Some(d)) == current.death)
            && request.photo.as_deref().map_or(true, |p| non_empty(Some(p)) == current.photo)
            && match &spouse_change {
                SpouseChange::Keep => true,
                SpouseChange::Clear => current.spouse.is_none(),
                SpouseChange::Link(partner) => {
                    current.spouse == SpouseRef::Internal(partner.clone())
                }
                SpouseChange::External(name) => {
                    current.spouse == SpouseRef::External(name.clone())
                }
            };
        if unchanged {
            return Ok(current.clone());
        }

        match spouse_change {
            SpouseChange::Keep => {}
            SpouseChange::Clear => replica.document.unlink_spouse(id)?,
            SpouseChange::Link(partner) => replica.document.link_spouse(id, &partner)?,
            SpouseChange::External(name) => replica.document.set_spouse_external(id, &name)?,
        }

        if let Some(record) = replica.document.records.iter_mut().find(|r| r.id == id) {
            if let Some(name) = new_name {
                record.name = name;
            }
            if let Some(birth) = request.birth.as_deref() {
                record.birth = non_empty(Some(birth));
            }
            if let Some(death) = request.death.as_deref() {
                record.death = non_empty(Some(death));
            }
            if let Some(photo) = request.photo.as_deref() {
                record.photo = non_empty(Some(photo));
            }
        }

        self.commit(&mut replica, "Member changes not yet uploaded").await;
        tracing::info!("Edited member {}", id);

        replica
            .document
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::Internal("edited member vanished".to_string()))
    }

    /// Dissolve a member's pairing on both ends.
    pub async fn unlink_spouse(&self, id: &str) -> Result<Record, AppError> {
        let mut replica = self.replica.lock().await;
        let record = replica
            .document
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", id)))?;
        if record.spouse.is_none() {
            return Ok(record.clone());
        }

        replica.document.unlink_spouse(id)?;
        self.commit(&mut replica, "Spouse changes not yet uploaded").await;

        replica
            .document
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::Internal("member vanished".to_string()))
    }

    /// Delete a member and all descendants. Unknown ids are a no-op.
    pub async fn delete_member(&self, id: &str) -> Result<Vec<String>, AppError> {
        let mut replica = self.replica.lock().await;
        let removed = replica.document.delete_subtree(id);
        if removed.is_empty() {
            tracing::debug!("Delete of unknown member {} ignored", id);
            return Ok(removed);
        }

        self.commit(&mut replica, "Local changes not yet uploaded").await;
        tracing::info!("Deleted member {} and {} descendants", id, removed.len() - 1);
        Ok(removed)
    }

    /// Replace the whole document with an imported one.
    ///
    /// Legacy documents are migrated. A malformed import leaves the current
    /// document untouched.
    pub async fn import(&self, text: &str) -> Result<Document, AppError> {
        let value: Value = serde_json::from_str(text)?;
        let document = load_document(value)?;

        let mut replica = self.replica.lock().await;
        replica.document = document;
        self.commit(&mut replica, "Imported file not yet uploaded").await;
        tracing::info!("Imported document with {} records", replica.document.records.len());
        Ok(replica.document.clone())
    }

    /// Write-through and dirty-marking shared by every mutation.
    ///
    /// A cache failure is logged, not returned: the edit is already applied and
    /// will still reach the remote.
    async fn commit(&self, replica: &mut Replica, message: &str) {
        replica.document.touch();
        if let Err(e) = self.cache.write(&replica.document).await {
            tracing::warn!("Failed to write local cache: {}", e);
        }
        replica.dirty = true;
        replica.generation += 1;
        self.sync.mark_dirty(message);
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
