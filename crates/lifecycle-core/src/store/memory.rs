use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{LifecycleError, Result};

use super::{Metadata, ObjectEntry, ObjectStore, StoredObject};

/// In-process container; state does not survive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredObject>>> {
        self.objects
            .lock()
            .map_err(|_| LifecycleError::Store("memory store lock poisoned".to_string()))
    }

    /// Overwrite the store-assigned creation time of `key`.
    ///
    /// Lets tests place records at a known age relative to a sweep's `now`.
    pub fn set_created_at(&self, key: &str, created_at: DateTime<Utc>) -> Result<()> {
        let mut objects = self.objects()?;
        match objects.get_mut(key) {
            Some(obj) => {
                obj.created_at = created_at;
                Ok(())
            }
            None => Err(LifecycleError::Store(format!("object '{key}' not found"))),
        }
    }

    pub fn len(&self) -> usize {
        self.objects().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn put_with_metadata(&self, key: &str, data: &[u8], metadata: &Metadata) -> Result<()> {
        let mut objects = self.objects()?;
        let created_at = objects
            .get(key)
            .map(|o| o.created_at)
            .unwrap_or_else(Utc::now);
        objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                created_at,
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.objects()?.remove(key).is_some())
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let objects = self.objects()?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ObjectEntry {
                key: k.clone(),
                created_at: o.created_at,
            })
            .collect())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<Metadata>> {
        Ok(self.objects()?.get(key).map(|o| o.metadata.clone()))
    }

    fn set_metadata(&self, key: &str, metadata: &Metadata) -> Result<()> {
        let mut objects = self.objects()?;
        match objects.get_mut(key) {
            Some(obj) => {
                obj.metadata = metadata.clone();
                Ok(())
            }
            None => Err(LifecycleError::Store(format!("object '{key}' not found"))),
        }
    }
}
