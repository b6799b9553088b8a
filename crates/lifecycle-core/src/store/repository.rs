//! Typed views over the two containers the coordinator uses.

use std::sync::Arc;

use crate::error::{LifecycleError, Result};
use crate::operation::{Operation, OperationKey};
use crate::repo::{Repo, RepoMap};

use super::{Metadata, ObjectEntry, ObjectStore};

/// Object name of the directory snapshot inside its container.
pub const REPO_MAP_OBJECT: &str = "repo_map.json";
/// Metadata key holding the backend validation tag for the snapshot.
pub const VALIDATION_TAG_METADATA: &str = "gh_api_etag";

// ---------------------------------------------------------------------------
// OperationRepository
// ---------------------------------------------------------------------------

/// Result of listing pending operation keys.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PendingListing {
    pub keys: Vec<OperationKey>,
    /// Raw keys that did not parse as `repoName/operationId`.
    pub malformed: Vec<String>,
}

#[derive(Clone)]
pub struct OperationRepository {
    store: Arc<dyn ObjectStore>,
}

impl OperationRepository {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn exists(&self, key: &OperationKey) -> Result<bool> {
        Ok(self.store.get(&key.to_string())?.is_some())
    }

    pub fn put(&self, op: &Operation) -> Result<()> {
        let bytes = serde_json::to_vec(op)?;
        self.store.put(&op.key().to_string(), &bytes)
    }

    /// Read a record back, with `created_at` filled in from the store.
    ///
    /// A record that no longer decodes is a `PoisonItem` for its key only.
    pub fn get(&self, key: &OperationKey) -> Result<Option<Operation>> {
        let raw_key = key.to_string();
        let Some(obj) = self.store.get(&raw_key)? else {
            return Ok(None);
        };
        let mut op: Operation =
            serde_json::from_slice(&obj.data).map_err(|e| LifecycleError::PoisonItem {
                key: raw_key.clone(),
                reason: e.to_string(),
            })?;
        op.created_at = Some(obj.created_at);
        Ok(Some(op))
    }

    /// Delete the record. `true` means this caller removed it and owns the
    /// terminal transition; `false` means someone else already did.
    pub fn claim(&self, key: &OperationKey) -> Result<bool> {
        self.store.delete(&key.to_string())
    }

    pub fn list_keys(&self) -> Result<PendingListing> {
        let mut listing = PendingListing::default();
        for entry in self.store.list_by_prefix("")? {
            match OperationKey::parse(&entry.key) {
                Some(key) => listing.keys.push(key),
                None => listing.malformed.push(entry.key),
            }
        }
        Ok(listing)
    }

    pub fn list_entries(&self) -> Result<Vec<ObjectEntry>> {
        self.store.list_by_prefix("")
    }
}

// ---------------------------------------------------------------------------
// RepoMapRepository
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RepoMapRepository {
    store: Arc<dyn ObjectStore>,
}

impl RepoMapRepository {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// The current snapshot, or `None` if no refresh has completed yet.
    pub fn load(&self) -> Result<Option<RepoMap>> {
        let Some(obj) = self.store.get(REPO_MAP_OBJECT)? else {
            return Ok(None);
        };
        let repos: Vec<Repo> = serde_json::from_slice(&obj.data)?;
        let validation_tag = obj.metadata.get(VALIDATION_TAG_METADATA).cloned();
        Ok(Some(RepoMap::new(repos, validation_tag)))
    }

    pub fn load_tag(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get_metadata(REPO_MAP_OBJECT)?
            .and_then(|m| m.get(VALIDATION_TAG_METADATA).cloned()))
    }

    /// Overwrite snapshot and tag together.
    pub fn replace(&self, map: &RepoMap) -> Result<()> {
        let bytes = serde_json::to_vec(&map.repos)?;
        let mut metadata = Metadata::new();
        if let Some(tag) = &map.validation_tag {
            metadata.insert(VALIDATION_TAG_METADATA.to_string(), tag.clone());
        }
        self.store
            .put_with_metadata(REPO_MAP_OBJECT, &bytes, &metadata)
    }
}
