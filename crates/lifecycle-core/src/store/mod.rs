//! Object storage for pending operations and the repo directory snapshot.
//!
//! The coordinator treats storage as a set of flat key/value containers with
//! per-object properties, modelled on a blob container:
//!
//! - each object has opaque bytes, a store-assigned `created_at`, and a
//!   string metadata map;
//! - keys are ordered, so a prefix listing is a range scan;
//! - `delete` is idempotent and reports whether *this* call removed the
//!   object, which the sweeps use as their claim on a record.
//!
//! [`RedbStore`] is the durable implementation; [`MemoryStore`] backs tests
//! and ephemeral runs.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::{LifecycleError, Result};

pub mod memory;
pub mod redb;
pub mod repository;

pub use self::memory::MemoryStore;
pub use self::redb::{RedbContainer, RedbStore};
pub use self::repository::{OperationRepository, PendingListing, RepoMapRepository};

pub type Metadata = BTreeMap<String, String>;

/// An object as read back from a container.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

/// A listing entry: key plus creation time, without the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
}

/// One storage container.
///
/// Implementations are synchronous. Async callers go through [`blocking`].
pub trait ObjectStore: Send + Sync {
    /// Write `data` and `metadata` under `key` in one atomic step.
    ///
    /// `created_at` is assigned on the first write of a key and kept on
    /// overwrite. Existing metadata is replaced.
    fn put_with_metadata(&self, key: &str, data: &[u8], metadata: &Metadata) -> Result<()>;

    /// Write `data` under `key` with empty metadata.
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.put_with_metadata(key, data, &Metadata::new())
    }

    fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    /// Remove `key`. Returns `true` only if this call removed an object;
    /// deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All entries whose key starts with `prefix`, in key order.
    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;

    fn get_metadata(&self, key: &str) -> Result<Option<Metadata>>;

    /// Replace the metadata of an existing object.
    fn set_metadata(&self, key: &str, metadata: &Metadata) -> Result<()>;
}

/// Run synchronous container work on tokio's blocking pool.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LifecycleError::Store(format!("store task failed: {e}")))?
}
