//! Whole-catalog persistence.
//!
//! A store keeps one serialized snapshot of every known video. Each save overwrites the
//! previous snapshot and the last write wins.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::{error::PersistenceError, types::Video};

pub trait CatalogStore: Send {
    /// Load the last saved snapshot, or an empty catalog when nothing was saved yet.
    fn load(&self) -> Result<Vec<Video>, PersistenceError>;

    fn save(&self, videos: &[Video]) -> Result<(), PersistenceError>;
}

/// Snapshot stored as a JSON array in a single file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CatalogStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Video>, PersistenceError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if raw.trim().is_empty() || raw.trim() == "null" {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, videos: &[Video]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(videos)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

/// In-process store holding the serialized blob. Clones share the same blob.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blob: Arc<Mutex<Option<String>>>,
    saves: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn blob(&self) -> Option<String> {
        self.blob.lock().expect("MemoryStore poisoned").clone()
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> Result<Vec<Video>, PersistenceError> {
        match self.blob.lock().expect("MemoryStore poisoned").as_deref() {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, videos: &[Video]) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::other("save rejected"),
            });
        }

        let json = serde_json::to_string(videos)?;
        *self.blob.lock().expect("MemoryStore poisoned") = Some(json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
