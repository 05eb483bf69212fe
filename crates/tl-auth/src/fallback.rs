use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{AuthError, Result};

/// Keys the credential is mirrored under
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    /// Absolute expiry in epoch milliseconds
    pub const TOKEN_EXPIRY: &str = "token_expiry";
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

/// Synchronous string key-value storage that survives restarts
///
/// Not necessarily secure. Used when the durable store is unreachable.
pub trait LocalFallbackStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory fallback store
#[derive(Debug, Clone, Default)]
pub struct MemoryFallbackStore {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalFallbackStore for MemoryFallbackStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Fallback store persisted as a single JSON object on disk
///
/// The whole map is kept in memory and rewritten on every change.
#[derive(Debug)]
pub struct FileFallbackStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileFallbackStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// An unreadable or corrupt file starts the store empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt fallback store {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(values)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| AuthError::Storage(format!("Failed to replace fallback store: {}", e)))
    }
}

impl LocalFallbackStore for FileFallbackStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fallback.json");

        let store = FileFallbackStore::open(&path);
        store.set(keys::ACCESS_TOKEN, "abc").unwrap();
        store.set(keys::TOKEN_EXPIRY, "1700000000000").unwrap();
        store.remove(keys::TOKEN_EXPIRY).unwrap();
        drop(store);

        let reopened = FileFallbackStore::open(&path);
        assert_eq!(reopened.get(keys::ACCESS_TOKEN).as_deref(), Some("abc"));
        assert!(reopened.get(keys::TOKEN_EXPIRY).is_none());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fallback.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = FileFallbackStore::open(&path);
        assert!(store.get(keys::ACCESS_TOKEN).is_none());
        store.set(keys::ACCESS_TOKEN, "fresh").unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).as_deref(), Some("fresh"));
    }
}
