//! Durable key-value persistence
//!
//! Every persisted record (token, dataset, sheets config) goes through the
//! [`KeyValueStore`] trait. Values are JSON strings; the stores never look
//! inside them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{RedisConfig, RedisStore};
use crate::config::{AppConfig, StorageBackend};
use crate::error::{StorageError, StorageResult};

/// Key-value persistence backend
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Set a key-value pair
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// In-process store; contents are lost when the process exits
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// File-backed store: one `<key>.json` file per entry under a directory.
///
/// Files are written with 0600 permissions on Unix since the token record
/// holds a bearer credential.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default data directory (`<config dir>/balanciago`)
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|c| c.join("balanciago"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StorageError::Configuration(format!(
                "Invalid storage key: {key:?}"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.entry_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, value).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&path, permissions).await?;
        }

        debug!("Wrote storage entry {}", path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Open the store selected by the application configuration
pub async fn open_store(config: &AppConfig) -> StorageResult<Arc<dyn KeyValueStore>> {
    match config.storage {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::File => {
            let dir = config
                .data_dir
                .clone()
                .or_else(FileStore::default_dir)
                .ok_or_else(|| {
                    StorageError::Configuration("Could not determine data directory".into())
                })?;
            info!("Using file storage in {}", dir.display());
            Ok(Arc::new(FileStore::new(dir)))
        }
        StorageBackend::Redis => {
            let redis_config = RedisConfig {
                url: config.redis_url.clone(),
            };
            Ok(Arc::new(RedisStore::new(&redis_config).await?))
        }
    }
}
