//! Session persistence.
//!
//! The identity of the logged-in user survives restarts so a reconnecting
//! client can resume without logging in again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde_json::Value;
use tracing::debug;

use relaychat_protocol::User;
use relaychat_protocol::constants::SESSION_IDENTITY_KEY;

use crate::config::config_dir;

/// Errors from the session store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the session identity is kept.
pub trait SessionStore: Send + Sync {
    fn load_identity(&self) -> Result<Option<User>, StoreError>;
    fn save_identity(&self, user: &User) -> Result<(), StoreError>;
    fn clear_identity(&self) -> Result<(), StoreError>;
}

/// Key/value store persisted to a JSON file.
///
/// Entries are cached in memory and the whole file is rewritten on every
/// change.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store, loading existing entries from disk.
    pub fn new(path: PathBuf) -> Result<Self, StoreError> {
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut map = self.entries.write().unwrap_or_else(|e| e.into_inner());
            map.insert(key.to_string(), value);
        }
        self.persist()
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        {
            let mut map = self.entries.write().unwrap_or_else(|e| e.into_inner());
            if map.remove(key).is_none() {
                return Ok(());
            }
        }
        self.persist()
    }

    /// Writes the current entries to disk.
    fn persist(&self) -> Result<(), StoreError> {
        let map = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let json = serde_json::to_string_pretty(&*map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!("persisted {} entry(ies) to {:?}", map.len(), self.path);
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn load_identity(&self) -> Result<Option<User>, StoreError> {
        match self.get(SESSION_IDENTITY_KEY) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save_identity(&self, user: &User) -> Result<(), StoreError> {
        self.set(SESSION_IDENTITY_KEY, serde_json::to_value(user)?)
    }

    fn clear_identity(&self) -> Result<(), StoreError> {
        self.remove(SESSION_IDENTITY_KEY)
    }
}

/// Loads entries from a JSON file on disk.
fn load_entries(path: &Path) -> Result<BTreeMap<String, Value>, StoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let entries: BTreeMap<String, Value> = serde_json::from_str(&data)?;
    debug!("loaded {} entry(ies) from {:?}", entries.len(), path);
    Ok(entries)
}

/// Returns the default session file path.
pub fn default_session_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("relaychat").join("session.json"))
}

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    identity: Mutex<Option<User>>,
}

impl SessionStore for MemoryStore {
    fn load_identity(&self) -> Result<Option<User>, StoreError> {
        Ok(self.identity.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save_identity(&self, user: &User) -> Result<(), StoreError> {
        *self.identity.lock().unwrap_or_else(|e| e.into_inner()) = Some(user.clone());
        Ok(())
    }

    fn clear_identity(&self) -> Result<(), StoreError> {
        *self.identity.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
