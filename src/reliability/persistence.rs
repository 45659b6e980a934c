use crate::domain::Event;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Key/value byte store holding at most one snapshot per key.
///
/// Calls are synchronous; the engine runs writes on the blocking pool and
/// only the erase on consent revocation runs inline.
#[cfg_attr(test, automock)]
pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    fn save(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl SnapshotStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(self.path_for(key)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;

        // Write then rename so a crash mid-write leaves the previous snapshot
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;

        tracing::debug!("Saved snapshot {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.entries.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Mirrors the event queue into a `SnapshotStore` under one key.
///
/// All writes go through a single gate. A writer that takes its snapshot
/// after acquiring the gate therefore never overwrites a later erase with
/// older contents.
pub struct PersistenceAdapter {
    store: Arc<dyn SnapshotStore>,
    key: String,
    write_gate: Mutex<()>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn SnapshotStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the stored snapshot. A missing key is an empty snapshot.
    ///
    /// Entries that no longer parse as events are skipped one by one; only a
    /// snapshot that is not a JSON array at all is an error.
    pub fn load(&self) -> Result<Vec<Event>, PersistenceError> {
        let entries: Vec<Value> = match self.store.load(&self.key)? {
            Some(data) if !data.is_empty() => serde_json::from_slice(&data)?,
            _ => return Ok(Vec::new()),
        };

        let total = entries.len();
        let events: Vec<Event> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(key = %self.key, "Skipping unreadable persisted event: {}", e);
                    None
                }
            })
            .collect();
        if events.len() < total {
            warn!(
                key = %self.key,
                skipped = total - events.len(),
                "Persisted snapshot had unreadable events"
            );
        }
        Ok(events)
    }

    /// Writes `events`; an empty slice removes the key instead.
    pub fn save(&self, events: &[Event]) -> Result<(), PersistenceError> {
        let _gate = self.write_gate.lock();
        self.write(events)
    }

    /// Takes the snapshot under the write gate, then writes it.
    pub fn save_with<F>(&self, snapshot: F) -> Result<usize, PersistenceError>
    where
        F: FnOnce() -> Vec<Event>,
    {
        let _gate = self.write_gate.lock();
        let events = snapshot();
        self.write(&events)?;
        Ok(events.len())
    }

    pub fn erase(&self) -> Result<(), PersistenceError> {
        let _gate = self.write_gate.lock();
        self.store.remove(&self.key)
    }

    fn write(&self, events: &[Event]) -> Result<(), PersistenceError> {
        if events.is_empty() {
            return self.store.remove(&self.key);
        }
        let data = serde_json::to_vec(events)?;
        self.store.save(&self.key, &data)
    }
}
