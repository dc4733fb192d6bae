// Session-scoped key/value stores backing the client-side caches

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

pub mod availability;

pub use availability::{AvailabilityCache, AvailabilityEntry, AvailabilityPatch, DocFlag};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

/// Storage port for persisted client state. Implementations decide the medium;
/// callers treat every failure as non-fatal.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Process-lifetime store, the equivalent of a browser session store.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    store: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> CacheError {
        CacheError::OperationFailed("session store lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let store = self.store.read().map_err(|_| Self::poisoned())?;
        Ok(store.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(|_| Self::poisoned())?;
        store.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(|_| Self::poisoned())?;
        store.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(|_| Self::poisoned())?;
        store.clear();
        Ok(())
    }
}

/// One JSON file per key inside a directory. Used by the CLI so cached flags
/// survive between invocations.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        // write-then-rename so a crash never leaves a half-written blob
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, path = %path.display(), "session store entry written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                tokio::fs::remove_file(path).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trip() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileSessionStore::new(dir.path());
        first.set("availability:reagents", "{}").await.unwrap();

        let second = FileSessionStore::new(dir.path());
        assert_eq!(
            second.get("availability:reagents").await.unwrap().as_deref(),
            Some("{}")
        );

        second.clear().await.unwrap();
        assert_eq!(first.get("availability:reagents").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nope"));
        assert_eq!(store.get("x").await.unwrap(), None);
        store.delete("x").await.unwrap();
        store.clear().await.unwrap();
    }
}
