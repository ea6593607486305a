//! Key/value storage used by the request history and dialog recovery
//!
//! The engine never assumes a backing medium. Hosts usually adapt their
//! platform preferences store (SharedPreferences, NSUserDefaults) to
//! [`KeyValueStore`]; three implementations ship with the crate:
//!
//! - [`MemoryStore`] - volatile, process lifetime only
//! - [`JsonFileStore`] - durable, one JSON object on disk
//! - [`NoopStore`] - stores nothing, restores nothing

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PermitError;

/// String key/value persistence
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, PermitError>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &str, value: &str) -> Result<(), PermitError>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), PermitError>;
}

/// Store that keeps nothing
///
/// A valid substitute wherever a store is accepted: only the features that
/// depend on restoring data are lost.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl KeyValueStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, PermitError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), PermitError> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<(), PermitError> {
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PermitError> {
        let values = self
            .values
            .read()
            .map_err(|_| PermitError::Storage("memory store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), PermitError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| PermitError::Storage("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PermitError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| PermitError::Storage("memory store lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

/// Durable store persisting a flat JSON object to one file
///
/// The file is loaded on first access and rewritten on every change through a
/// temporary sibling file and a rename, so a crash mid-write leaves the old
/// contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<Option<HashMap<String, String>>>,
}

impl JsonFileStore {
    /// Create a store backed by `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, String>, PermitError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, values: &HashMap<String, String>) -> Result<(), PermitError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), keys = values.len(), "persisted key/value store");
        Ok(())
    }

    async fn update<F>(&self, change: F) -> Result<(), PermitError>
    where
        F: FnOnce(&mut HashMap<String, String>) -> bool + Send,
    {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        // The cache only ever reflects what reached the disk.
        let mut next = (*cache).clone().unwrap_or_default();
        if change(&mut next) {
            self.persist(&next).await?;
            *cache = Some(next);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PermitError> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        Ok(cache.as_ref().and_then(|values| values.get(key).cloned()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), PermitError> {
        self.update(|values| {
            let previous = values.insert(key.to_string(), value.to_string());
            previous.as_deref() != Some(value)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), PermitError> {
        self.update(|values| values.remove(key).is_some()).await
    }
}
