//! Durable containers on a single redb database.
//!
//! # Table design
//!
//! Each container owns two tables keyed by the object key:
//! ```text
//! <container>        key -> object bytes
//! <container>.props  key -> JSON { created_at, metadata }
//! ```
//!
//! Both tables are written in the same write transaction, so an object's
//! bytes and its metadata (the repo map and its validation tag, for
//! instance) are never observed out of step. Removing an object inside a
//! write transaction is serialised by redb, which makes `delete` a reliable
//! claim: of two concurrent deleters only one sees the object go.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};

use super::{Metadata, ObjectEntry, ObjectStore, StoredObject};

#[derive(Debug, Serialize, Deserialize)]
struct ObjectProps {
    created_at: DateTime<Utc>,
    #[serde(default)]
    metadata: Metadata,
}

fn db_err(e: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

/// Handle to the database file; hands out containers that share it.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create the redb database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(db_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open (creating if needed) the container called `name`.
    pub fn container(&self, name: &str) -> Result<RedbContainer> {
        if name.is_empty() || name.ends_with(".props") {
            return Err(LifecycleError::Config(format!(
                "invalid container name '{name}'"
            )));
        }
        let container = RedbContainer {
            db: Arc::clone(&self.db),
            data_name: name.to_string(),
            props_name: format!("{name}.props"),
        };
        // Ensure both tables exist before any reads
        let wt = self.db.begin_write().map_err(db_err)?;
        wt.open_table(container.data_table()).map_err(db_err)?;
        wt.open_table(container.props_table()).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(container)
    }
}

// ---------------------------------------------------------------------------
// RedbContainer
// ---------------------------------------------------------------------------

pub struct RedbContainer {
    db: Arc<Database>,
    data_name: String,
    props_name: String,
}

impl RedbContainer {
    fn data_table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.data_name)
    }

    fn props_table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.props_name)
    }

    pub fn name(&self) -> &str {
        &self.data_name
    }
}

impl ObjectStore for RedbContainer {
    fn put_with_metadata(&self, key: &str, data: &[u8], metadata: &Metadata) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut props = wt.open_table(self.props_table()).map_err(db_err)?;
            let created_at = match props.get(key).map_err(db_err)? {
                Some(existing) => serde_json::from_slice::<ObjectProps>(existing.value())?.created_at,
                None => Utc::now(),
            };
            let encoded = serde_json::to_vec(&ObjectProps {
                created_at,
                metadata: metadata.clone(),
            })?;
            props.insert(key, encoded.as_slice()).map_err(db_err)?;

            let mut objects = wt.open_table(self.data_table()).map_err(db_err)?;
            objects.insert(key, data).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let objects = rt.open_table(self.data_table()).map_err(db_err)?;
        let Some(data) = objects.get(key).map_err(db_err)? else {
            return Ok(None);
        };
        let props_table = rt.open_table(self.props_table()).map_err(db_err)?;
        let props: ObjectProps = match props_table.get(key).map_err(db_err)? {
            Some(p) => serde_json::from_slice(p.value())?,
            None => {
                return Err(LifecycleError::Store(format!(
                    "object '{key}' in '{}' has no properties",
                    self.data_name
                )))
            }
        };
        Ok(Some(StoredObject {
            data: data.value().to_vec(),
            created_at: props.created_at,
            metadata: props.metadata,
        }))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut objects = wt.open_table(self.data_table()).map_err(db_err)?;
            let removed = objects.remove(key).map_err(db_err)?.is_some();
            let mut props = wt.open_table(self.props_table()).map_err(db_err)?;
            props.remove(key).map_err(db_err)?;
            removed
        };
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }

    fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let props = rt.open_table(self.props_table()).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in props.range::<&str>(prefix..).map_err(db_err)? {
            let (k, v) = entry.map_err(db_err)?;
            let key = k.value();
            if !key.starts_with(prefix) {
                break;
            }
            let p: ObjectProps = serde_json::from_slice(v.value())?;
            result.push(ObjectEntry {
                key: key.to_string(),
                created_at: p.created_at,
            });
        }
        Ok(result)
    }

    fn get_metadata(&self, key: &str) -> Result<Option<Metadata>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let props = rt.open_table(self.props_table()).map_err(db_err)?;
        let Some(p) = props.get(key).map_err(db_err)? else {
            return Ok(None);
        };
        let p: ObjectProps = serde_json::from_slice(p.value())?;
        Ok(Some(p.metadata))
    }

    fn set_metadata(&self, key: &str, metadata: &Metadata) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut props = wt.open_table(self.props_table()).map_err(db_err)?;
            let mut current: ObjectProps = match props.get(key).map_err(db_err)? {
                Some(p) => serde_json::from_slice(p.value())?,
                None => {
                    return Err(LifecycleError::Store(format!(
                        "object '{key}' not found in '{}'",
                        self.data_name
                    )))
                }
            };
            current.metadata = metadata.clone();
            let encoded = serde_json::to_vec(&current)?;
            props.insert(key, encoded.as_slice()).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
