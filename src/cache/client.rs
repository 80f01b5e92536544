//! Memoizing cache client
//!
//! `CacheClient::get_or_compute` is the building block every expensive
//! operation goes through: look the key up, return the stored bytes on a
//! hit, otherwise run the computation to completion, store the whole value
//! and return it. Concurrent misses on the same key each compute and the
//! last write wins; the wrapped computations are deterministic, so the
//! stored value is the same either way.

use crate::cache::key::CacheKey;
use crate::cache::response::{CachedResponse, ProcessType};
use crate::cache::store::{create_store, CacheStore};
use crate::config::CacheConfig;
use crate::error::{LyraError, LyraResult};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared global caching switch
///
/// Every clone refers to the same flag, so flipping it affects all
/// subsequent calls through any client holding it.
#[derive(Debug, Clone)]
pub struct CacheSwitch(Arc<AtomicBool>);

impl CacheSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

/// Snapshot of the cache state for display
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub enabled: bool,
    pub backend: &'static str,
    pub available: bool,
}

/// Function cache bound to a backing store
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn CacheStore>,
    switch: CacheSwitch,
    available: Arc<AtomicBool>,
}

impl CacheClient {
    /// Create a client over an existing store
    pub fn new(store: Arc<dyn CacheStore>, switch: CacheSwitch) -> Self {
        Self {
            store,
            switch,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create the configured store and check that it answers
    pub async fn connect(config: &CacheConfig) -> LyraResult<Self> {
        let store = create_store(config).await?;
        let client = Self::new(store, CacheSwitch::new(config.enabled));
        client.check_health().await;
        Ok(client)
    }

    /// The switch shared by this client
    pub fn switch(&self) -> &CacheSwitch {
        &self.switch
    }

    pub fn caching_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    /// Toggle caching for every future call through this client's switch
    pub fn set_caching_enabled(&self, enabled: bool) {
        self.switch.set(enabled);
        info!(
            "Function cache {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Last known health of the backing store
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            enabled: self.caching_enabled(),
            backend: self.store.backend_name(),
            available: self.is_available(),
        }
    }

    /// Ping the store and record the result
    pub async fn check_health(&self) -> bool {
        let up = self.store.ping().await;
        self.mark_available(up, "liveness check failed");
        up
    }

    /// Drop every cached entry
    pub async fn flush_all(&self) -> LyraResult<()> {
        self.store.flush_all().await?;
        info!("Flushed {} function cache", self.store.backend_name());
        Ok(())
    }

    /// Return the cached bytes for `key`, computing and storing them on a miss
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> LyraResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LyraResult<Vec<u8>>>,
    {
        if !self.caching_enabled() {
            debug!("Cache disabled, computing {}", key.function());
            return compute().await;
        }

        let digest = key.digest();
        debug!("Cached call: {}", key.signature());

        match self.lookup(&digest).await {
            Lookup::Hit(bytes) => return Ok(bytes),
            Lookup::Unavailable => return compute().await,
            Lookup::Miss => {}
        }

        let value = compute().await?;
        self.store_value(&digest, &value, ttl).await;
        Ok(value)
    }

    /// Like `get_or_compute`, but wraps the result in a `CachedResponse`
    ///
    /// Errors never propagate: they become a `FAILURE` envelope stored with
    /// zero TTL, so the failure is reported without occupying the cache.
    pub async fn get_or_compute_response<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> LyraResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LyraResult<Vec<u8>>>,
    {
        if !self.caching_enabled() {
            let (bytes, _) = envelope(compute().await, ProcessType::CacheDisabled, ttl)?;
            return Ok(bytes);
        }

        let digest = key.digest();
        debug!("Cached response call: {}", key.signature());

        match self.lookup(&digest).await {
            Lookup::Hit(bytes) => return Ok(bytes),
            Lookup::Unavailable => {
                let (bytes, _) = envelope(compute().await, ProcessType::CacheDisabled, ttl)?;
                return Ok(bytes);
            }
            Lookup::Miss => {}
        }

        let (bytes, entry_ttl) = envelope(compute().await, ProcessType::Cached, ttl)?;
        self.store_value(&digest, &bytes, entry_ttl).await;
        Ok(bytes)
    }

    async fn lookup(&self, digest: &str) -> Lookup {
        match self.store.get(digest).await {
            Ok(Some(bytes)) => {
                self.mark_available(true, "");
                debug!("Cache hit {}", digest);
                Lookup::Hit(bytes)
            }
            Ok(None) => {
                self.mark_available(true, "");
                debug!("Cache miss {}", digest);
                Lookup::Miss
            }
            Err(e) => {
                self.mark_available(false, &e.to_string());
                Lookup::Unavailable
            }
        }
    }

    async fn store_value(&self, digest: &str, value: &[u8], ttl: Option<Duration>) {
        match self.store.set(digest, value, ttl).await {
            Ok(()) => self.mark_available(true, ""),
            Err(e) => self.mark_available(false, &e.to_string()),
        }
    }

    /// Record store health, logging only on transitions
    fn mark_available(&self, up: bool, reason: &str) {
        let was_up = self.available.swap(up, Ordering::SeqCst);
        if was_up == up {
            return;
        }
        if up {
            info!("Cache store {} is available again", self.store.backend_name());
        } else {
            warn!(
                "Cache store {} unavailable, computing without cache: {}",
                self.store.backend_name(),
                reason
            );
        }
    }
}

enum Lookup {
    Hit(Vec<u8>),
    Miss,
    Unavailable,
}

/// Wrap a computation result into envelope bytes and the TTL to store them with
fn envelope(
    result: LyraResult<Vec<u8>>,
    process_type: ProcessType,
    ttl: Option<Duration>,
) -> LyraResult<(Vec<u8>, Option<Duration>)> {
    let data = result.and_then(|bytes| {
        serde_json::from_slice::<serde_json::Value>(&bytes).map_err(LyraError::from)
    });

    let (response, entry_ttl) = match data {
        Ok(data) => (
            CachedResponse::success(process_type, data, ttl.map(|d| d.as_secs())),
            ttl,
        ),
        Err(e) => {
            warn!("Cached computation failed: {}", e);
            let mut errors = vec![e.to_string()];
            if let Some(data) = e.data() {
                errors.push(data.to_string());
            }
            (CachedResponse::failure(errors), Some(Duration::ZERO))
        }
    };

    Ok((serde_json::to_vec(&response)?, entry_ttl))
}
