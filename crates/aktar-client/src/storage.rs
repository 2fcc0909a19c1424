//! Durable key/value storage for client state.
//!
//! Values are opaque strings; the stores above this layer decide the
//! encoding. Keys are the namespaced names in
//! [`aktar_common::constants::storage_keys`].

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use aktar_common::constants::storage_keys;
use uuid::Uuid;

use crate::error::ClientError;

/// Persistent string storage shared by the client stores
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), ClientError>;
}

/// In-process storage.
///
/// Clones share the same map, so dropping a store and rebuilding it from a
/// clone behaves like a page reload.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, ClientError> {
        self.entries
            .lock()
            .map_err(|_| ClientError::Storage("memory storage lock poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// One file per key under a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ClientError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are namespaced with ':', which is not portable in file names
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        // Write then rename so a crash never leaves a half-written blob
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, value)?;
        if let Err(e) = fs::rename(&tmp, self.path_for(key)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Delete keys written by older storefront builds.
///
/// Returns how many were present.
pub fn purge_legacy_keys(storage: &dyn Storage) -> Result<usize, ClientError> {
    let mut purged = 0;
    for key in storage_keys::LEGACY {
        if storage.get(key)?.is_some() {
            storage.remove(key)?;
            purged += 1;
        }
    }

    if purged > 0 {
        tracing::info!(purged = purged, "Purged legacy storage keys");
    }
    Ok(purged)
}

/// Read a key, treating the literal strings `null` / `undefined` and blank
/// values as absent.
pub(crate) fn read_present(storage: &dyn Storage, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(Some(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
                None
            } else {
                Some(raw)
            }
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key = key, error = %e, "Storage read failed, treating as empty");
            None
        }
    }
}

/// Drop a key whose contents could not be parsed
pub(crate) fn heal(storage: &dyn Storage, key: &str, reason: &str) {
    tracing::warn!(key = key, reason = reason, "Discarding malformed persisted state");
    if let Err(e) = storage.remove(key) {
        tracing::warn!(key = key, error = %e, "Failed to remove malformed key");
    }
}
