//! Workspace-scoped key-value persistence.
//!
//! Staged groups are stored as a versioned record:
//!
//! ```json
//! {"version": 1, "savedAt": "2024-05-01T12:00:00Z", "groups": [...]}
//! ```
//!
//! A bare array (the unversioned layout) is migrated on read. A record from a
//! newer version is dropped with a warning instead of being misread.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::state::model::StagedGroup;

pub const STAGED_GROUPS_KEY: &str = "stagedGroups";
pub const GENERAL_CONTEXT_KEY: &str = "generalContext";

/// Current staged-groups record version.
pub const SCHEMA_VERSION: u32 = 1;

/// Last-write-wins key-value store.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Stores all keys in one JSON object on disk, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<git_dir>/groupcommit/state.json`, private to the repository.
    pub fn for_git_dir(git_dir: &Path) -> Self {
        Self::new(git_dir.join("groupcommit").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(StoreError::ReadFailed(e)),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&text).map_err(StoreError::Corrupt)? {
            Value::Object(map) => Ok(map),
            _ => {
                warn!(
                    "State file {} is not a JSON object, starting fresh",
                    self.path.display()
                );
                Ok(Map::new())
            }
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(StoreError::WriteFailed)?;

        let json =
            serde_json::to_vec_pretty(map).map_err(StoreError::SerializationFailed)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(StoreError::WriteFailed)?;
        tmp.write_all(&json).map_err(StoreError::WriteFailed)?;
        tmp.persist(&self.path).map_err(StoreError::PersistFailed)?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        // A corrupt file is overwritten rather than blocking every later write.
        let mut map = self.read_all().unwrap_or_else(|e| {
            warn!("Replacing unreadable state file: {}", e);
            Map::new()
        });
        map.insert(key.to_string(), value);
        self.write_all(&map)
    }
}

/// In-process store, used when no repository state directory is available and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail, to exercise best-effort persistence.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed(std::io::Error::other(
                "writes disabled",
            )));
        }
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedGroupsRecord {
    version: u32,
    saved_at: DateTime<Utc>,
    groups: Vec<Value>,
}

/// Encode staged groups as the current versioned record.
pub fn encode_staged_groups(groups: &[StagedGroup]) -> Result<Value, StoreError> {
    let groups = groups
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::SerializationFailed)?;
    serde_json::to_value(StagedGroupsRecord {
        version: SCHEMA_VERSION,
        saved_at: Utc::now(),
        groups,
    })
    .map_err(StoreError::SerializationFailed)
}

/// Decode a stored staged-groups value, migrating or dropping as needed.
///
/// Individual malformed entries are skipped rather than failing the load.
pub fn decode_staged_groups(value: Value) -> Vec<StagedGroup> {
    let entries = match value {
        Value::Array(entries) => {
            debug!("Migrating unversioned staged groups ({} entries)", entries.len());
            entries
        }
        Value::Object(_) => match serde_json::from_value::<StagedGroupsRecord>(value) {
            Ok(record) if record.version == SCHEMA_VERSION => record.groups,
            Ok(record) if record.version > SCHEMA_VERSION => {
                warn!(
                    "Staged groups were saved by a newer version (schema {}), ignoring them",
                    record.version
                );
                return Vec::new();
            }
            Ok(record) => {
                warn!(
                    "Unsupported staged groups schema {}, ignoring them",
                    record.version
                );
                return Vec::new();
            }
            Err(e) => {
                warn!("Unreadable staged groups record, ignoring it: {}", e);
                return Vec::new();
            }
        },
        Value::Null => return Vec::new(),
        other => {
            warn!("Unexpected staged groups value {}, ignoring it", other);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<StagedGroup>(entry) {
            Ok(group) => Some(group),
            Err(e) => {
                warn!("Skipping malformed staged group: {}", e);
                None
            }
        })
        .collect()
}
