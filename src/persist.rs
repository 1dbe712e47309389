//! Durable storage of snapshots.
//!
//! All registrations share one JSON object stored under a single key,
//! mapping each registration name to its stripped snapshot. [`Persistence`]
//! never fails: unreadable blobs read as empty and failed writes are logged.

use crate::error::{Result, SyncError};
use crate::snapshot::{strip_store, PersistedState, Snapshot, StoreState};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A synchronous string key-value store.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Whether storage can be used in the current environment.
    fn is_available(&self) -> bool {
        true
    }
}

/// Process-local storage.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) storage rooted at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn file_path(&self, key: &str) -> Result<PathBuf> {
        let invalid = key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(|c: char| c == '/' || c == '\\' || c == '\0');
        if invalid {
            return Err(SyncError::InvalidStorageKey(key.to_string()));
        }
        Ok(self.path.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.file_path(key)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let target = self.file_path(key)?;
        let temp = target.with_extension("json.tmp");

        let written = File::create(&temp)
            .and_then(|mut file| {
                file.write_all(value.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp, &target));

        if let Err(err) = written {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(())
    }
}

/// Storage for environments without any durable storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unavailable;

impl Storage for Unavailable {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(SyncError::StorageUnavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Reads and writes the persisted blob.
#[derive(Clone)]
pub struct Persistence {
    storage: Arc<dyn Storage>,
}

impl Persistence {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn is_available(&self) -> bool {
        self.storage.is_available()
    }

    /// The blob under `key`; empty when absent, unreadable or not an object.
    pub fn read(&self, key: &str) -> PersistedState {
        if !self.is_available() {
            return PersistedState::new();
        }

        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return PersistedState::new(),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to read persisted state");
                return PersistedState::new();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(state)) => state,
            Ok(other) => {
                tracing::warn!(
                    key = %key,
                    found = %type_name(&other),
                    "persisted state is not an object"
                );
                PersistedState::new()
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "persisted state is not valid JSON");
                PersistedState::new()
            }
        }
    }

    /// Store `state` as the whole blob under `key`.
    pub fn write(&self, key: &str, state: &PersistedState) {
        if !self.is_available() {
            tracing::debug!(key = %key, "durable storage unavailable, write skipped");
            return;
        }

        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to serialize persisted state");
                return;
            }
        };

        if let Err(err) = self.storage.set(key, &raw) {
            tracing::warn!(key = %key, error = %err, "failed to write persisted state");
        }
    }

    /// Persist a whole store, stripped.
    pub fn write_store(&self, key: &str, state: &StoreState) {
        self.write(key, &strip_store(state));
    }

    /// Replace the entry for `name` with the stripped `snapshot`, leaving
    /// other entries as they are. Does nothing unless `enabled`.
    pub fn update_entry(&self, key: &str, name: &str, snapshot: &Snapshot, enabled: bool) {
        if !enabled || !self.is_available() {
            return;
        }

        let mut state = self.read(key);
        state.insert(name.to_string(), snapshot.stripped());
        self.write(key, &state);
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("available", &self.is_available())
            .finish()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::NodeState;
    use serde_json::json;
    use tempfile::TempDir;

    fn leaf(value: Value) -> Snapshot {
        Snapshot::leaf(NodeState {
            value,
            valid: true,
            dirty: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_missing_blob_reads_empty() {
        let persistence = Persistence::new(Arc::new(MemoryStorage::new()));
        assert!(persistence.read("forms").is_empty());
    }

    #[test]
    fn test_corrupt_blob_reads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("forms", "{not json").unwrap();
        storage.set("list", "[1, 2]").unwrap();

        let persistence = Persistence::new(storage);
        assert!(persistence.read("forms").is_empty());
        assert!(persistence.read("list").is_empty());
    }

    #[test]
    fn test_update_entry_keeps_others() {
        let persistence = Persistence::new(Arc::new(MemoryStorage::new()));
        persistence.update_entry("forms", "a", &leaf(json!({"x": 1})), true);
        persistence.update_entry("forms", "b", &leaf(json!(2)), true);
        persistence.update_entry("forms", "a", &leaf(json!({"x": 3})), true);

        let state = persistence.read("forms");
        assert_eq!(state["a"], json!({"x": 3}));
        assert_eq!(state["b"], json!(2));
    }

    #[test]
    fn test_update_entry_respects_flag() {
        let persistence = Persistence::new(Arc::new(MemoryStorage::new()));
        persistence.update_entry("forms", "a", &leaf(json!(1)), false);
        assert!(persistence.read("forms").is_empty());
    }

    #[test]
    fn test_unavailable_storage_is_skipped() {
        let persistence = Persistence::new(Arc::new(Unavailable));
        persistence.update_entry("forms", "a", &leaf(json!(1)), true);
        persistence.write("forms", &PersistedState::new());
        assert!(!persistence.is_available());
        assert!(persistence.read("forms").is_empty());
    }

    #[test]
    fn test_write_store_strips_status() {
        let storage = Arc::new(MemoryStorage::new());
        let persistence = Persistence::new(storage.clone());
        let mut store = StoreState::new();
        store.insert("a".into(), leaf(json!({"email": "a@x.com"})));
        persistence.write_store("forms", &store);

        let raw = storage.get("forms").unwrap().unwrap();
        let blob: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(blob, json!({"a": {"email": "a@x.com"}}));
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("state")).unwrap();

        assert_eq!(storage.get("forms").unwrap(), None);
        storage.set("forms", r#"{"a":1}"#).unwrap();
        assert_eq!(storage.get("forms").unwrap().as_deref(), Some(r#"{"a":1}"#));

        // Reopen and read back
        let reopened = FileStorage::new(dir.path().join("state")).unwrap();
        let persistence = Persistence::new(Arc::new(reopened));
        assert_eq!(persistence.read("forms")["a"], json!(1));
    }

    #[test]
    fn test_file_storage_failed_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        // A directory where the target file should go makes the rename fail
        let blocker = dir.path().join("forms.json");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        assert!(matches!(storage.set("forms", "{}"), Err(SyncError::Io(_))));
        assert!(!dir.path().join("forms.json.tmp").exists());
        assert!(blocker.is_dir());
    }

    #[test]
    fn test_file_storage_rejects_bad_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        for key in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                storage.set(key, "{}"),
                Err(SyncError::InvalidStorageKey(_))
            ));
        }
    }
}
