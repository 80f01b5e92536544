//! Cache backing stores
//!
//! The function cache only needs four operations from its store: read a
//! value, write a whole value with an optional TTL, drop everything, and a
//! liveness check. Writes always replace the full value.

use crate::config::{CacheBackend, CacheConfig, ConfigManager};
use crate::error::{LyraError, LyraResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Key-value store backing the function cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch an unexpired value
    async fn get(&self, key: &str) -> LyraResult<Option<Vec<u8>>>;

    /// Store a value; `None` keeps it until flushed
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> LyraResult<()>;

    /// Remove every entry
    async fn flush_all(&self) -> LyraResult<()>;

    /// Check whether the store can currently serve requests
    async fn ping(&self) -> bool;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (Vec<u8>, Option<Instant>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> LyraResult<Option<Vec<u8>>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires_at)) => {
                    if !expires_at.is_some_and(|at| at <= Instant::now()) {
                        return Ok(Some(value.clone()));
                    }
                }
            }
        }

        debug!("Memory cache entry {} is expired", key);
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> LyraResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| !expires_at.is_some_and(|at| at <= now));

        // A zero TTL entry could never be served
        if ttl == Some(Duration::ZERO) {
            entries.remove(key);
            return Ok(());
        }
        entries.insert(key.to_string(), (value.to_vec(), ttl.map(|ttl| now + ttl)));
        Ok(())
    }

    async fn flush_all(&self) -> LyraResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// On-disk entry format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    /// Hex encoded value bytes
    value: String,

    /// When the entry expires, if ever
    expires_at: Option<DateTime<Utc>>,
}

impl FileEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Store with one JSON file per key, shared by every process using the directory
pub struct FileStore {
    cache_dir: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at `cache_dir`
    pub async fn new(cache_dir: PathBuf) -> LyraResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| LyraError::io(format!("creating cache dir {}", cache_dir.display()), e))?;
        Ok(Self { cache_dir })
    }

    /// Remove a single entry
    pub async fn remove(&self, key: &str) -> LyraResult<()> {
        let path = self.cache_path(key);
        if path.exists() {
            fs::remove_file(&path).await.map_err(|e| {
                LyraError::io(format!("removing cache file {}", path.display()), e)
            })?;
        }
        Ok(())
    }

    /// Drop an unreadable entry and report a miss so the next write repairs it
    async fn discard(&self, key: &str, reason: &str) -> LyraResult<Option<Vec<u8>>> {
        warn!("Discarding corrupt cache file {}: {}", key, reason);
        self.remove(key).await?;
        Ok(None)
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> LyraResult<Option<Vec<u8>>> {
        let path = self.cache_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| LyraError::io(format!("reading cache file {}", path.display()), e))?;

        let entry: FileEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => return self.discard(key, &e.to_string()).await,
        };

        if entry.is_expired() {
            debug!("Cache file {} is expired", key);
            self.remove(key).await?;
            return Ok(None);
        }

        match hex::decode(&entry.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => self.discard(key, &e.to_string()).await,
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> LyraResult<()> {
        if ttl == Some(Duration::ZERO) {
            return self.remove(key).await;
        }

        let expires_at = match ttl {
            Some(ttl) => Some(
                Utc::now()
                    + chrono::Duration::from_std(ttl)
                        .map_err(|e| LyraError::Internal(format!("ttl out of range: {}", e)))?,
            ),
            None => None,
        };
        let entry = FileEntry {
            value: hex::encode(value),
            expires_at,
        };
        let content = serde_json::to_string(&entry)?;

        // Readers only ever see a complete file
        let path = self.cache_path(key);
        let tmp = self
            .cache_dir
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| LyraError::io(format!("writing cache file {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| LyraError::io(format!("replacing cache file {}", path.display()), e))?;

        debug!("Cached {} until {:?}", key, entry.expires_at);
        Ok(())
    }

    async fn flush_all(&self) -> LyraResult<()> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| LyraError::io("reading cache directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LyraError::io("reading cache entry", e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(entry.path())
                    .await
                    .map_err(|e| LyraError::io("removing cache file", e))?;
            }
        }

        Ok(())
    }

    async fn ping(&self) -> bool {
        fs::metadata(&self.cache_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Store that is never available
#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _key: &str) -> LyraResult<Option<Vec<u8>>> {
        Err(LyraError::CacheUnavailable("no cache backend".to_string()))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> LyraResult<()> {
        Err(LyraError::CacheUnavailable("no cache backend".to_string()))
    }

    async fn flush_all(&self) -> LyraResult<()> {
        Ok(())
    }

    async fn ping(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "none"
    }
}

/// Create the store selected by configuration
pub async fn create_store(config: &CacheConfig) -> LyraResult<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        CacheBackend::File => {
            let dir = config.dir.clone().unwrap_or_else(ConfigManager::cache_dir);
            Ok(Arc::new(FileStore::new(dir).await?))
        }
        CacheBackend::None => Ok(Arc::new(NullStore)),
    }
}
