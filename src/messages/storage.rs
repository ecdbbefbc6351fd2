//! Durable key-value persistence for the session collection
//!
//! The whole collection is serialized as one JSON text blob under a fixed key
//! and overwritten after every mutation.

use super::types::ChatSession;
use crate::{QurmaError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key the session collection is stored under
pub const DEFAULT_STORAGE_KEY: &str = "qurma_portal_history_v3";

/// Current version of the persisted envelope
pub const SCHEMA_VERSION: u32 = 1;

/// A durable text store addressed by key
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as a file inside a data directory
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

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QurmaError::StorageError(format!(
                "Failed to read {:?}: {}",
                path, e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        // Write beside the target and rename so a crash never leaves half a file
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;

        debug!("Wrote {} bytes to {:?}", value.len(), path);
        Ok(())
    }
}

/// In-memory store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Serialize)]
struct ArchiveRef<'a> {
    version: u32,
    sessions: &'a [ChatSession],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredArchive {
    Versioned {
        version: u32,
        sessions: Vec<ChatSession>,
    },
    Legacy(Vec<ChatSession>),
}

/// Reads and writes the session collection under one fixed key
#[derive(Clone)]
pub struct SessionArchive {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionArchive {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Archive backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DEFAULT_STORAGE_KEY)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted collection.
    ///
    /// A missing entry yields an empty collection. Unparseable content is
    /// logged and also yields an empty collection.
    pub fn load(&self) -> Result<Vec<ChatSession>> {
        let Some(text) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };

        match decode(&text) {
            Ok(sessions) => {
                debug!("Loaded {} sessions from '{}'", sessions.len(), self.key);
                Ok(sessions)
            }
            Err(e) => {
                warn!("Failed to parse history under '{}': {}", self.key, e);
                Ok(Vec::new())
            }
        }
    }

    /// Overwrite the persisted collection
    pub fn save(&self, sessions: &[ChatSession]) -> Result<()> {
        let text = encode(sessions)?;
        self.store.set(&self.key, &text)
    }
}

/// Serialize a collection into the versioned envelope
pub fn encode(sessions: &[ChatSession]) -> Result<String> {
    Ok(serde_json::to_string(&ArchiveRef {
        version: SCHEMA_VERSION,
        sessions,
    })?)
}

/// Deserialize either the versioned envelope or a legacy bare array
pub fn decode(text: &str) -> Result<Vec<ChatSession>> {
    match serde_json::from_str::<StoredArchive>(text)? {
        StoredArchive::Versioned { version, sessions } => {
            if version > SCHEMA_VERSION {
                warn!(
                    "History was written by a newer schema (v{}), reading as v{}",
                    version, SCHEMA_VERSION
                );
            }
            Ok(sessions)
        }
        StoredArchive::Legacy(sessions) => Ok(sessions),
    }
}
