use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use futures::future::BoxFuture;

use super::config::{StoreBackendConfig, StoreConfig};
use super::{CacheKey, MemoryBackend, RedisBackend};

/// Errors talking to the backing store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("timeout after {0:?} talking to the cache store")]
    Timeout(Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    fn metrics_tag(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Other(_) => "other",
        }
    }
}

/// A key-value store with per-entry expiration.
///
/// This is the raw protocol: two operations, no retries, no coordination, every failure
/// reported. [`CacheStore`] wraps a backend with the policy of how failures are treated.
pub trait StoreBackend: fmt::Debug + Send + Sync + 'static {
    /// A short name of the backend, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Reads the value stored at `key`, `None` if there is none.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>>;

    /// Stores `value` at `key`, to be expired by the store after `ttl`.
    fn set_ex<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Handle to the shared store, cheap to clone.
///
/// Read failures are transparently hidden and turn into cache misses, so a store outage
/// degrades to refilling every request instead of failing them. Write failures are reported
/// to the caller.
#[derive(Debug, Clone)]
pub struct CacheStore {
    backend: Arc<dyn StoreBackend>,
    timeout: Duration,
}

impl CacheStore {
    /// Wraps a backend, bounding each store operation by `timeout`.
    pub fn new(backend: impl StoreBackend, timeout: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            timeout,
        }
    }

    /// Creates the backend described by `config`.
    ///
    /// For Redis this establishes the initial connection, which is an error if the server is
    /// unreachable. Connections lost later on are re-established transparently.
    pub async fn from_config(config: &StoreConfig) -> anyhow::Result<Self> {
        let store = match config.backend {
            StoreBackendConfig::Redis(ref cfg) => {
                let backend = RedisBackend::connect(cfg)
                    .await
                    .context("failed to initialise redis store")?;
                Self::new(backend, config.timeout)
            }
            StoreBackendConfig::Memory(ref cfg) => {
                Self::new(MemoryBackend::new(cfg.capacity), config.timeout)
            }
        };
        tracing::info!("Using {} cache store", store.backend_name());
        Ok(store)
    }

    /// Returns the name of the backend configured.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Reads the entry for `key`.
    ///
    /// Returns `None` if the entry is absent, empty, or could not be read.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let backend = self.backend.name();
        let res = tokio::time::timeout(self.timeout, self.backend.get(key.as_str()))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.timeout)));

        match res {
            Ok(Some(data)) if !data.is_empty() => {
                metric!(
                    counter("store.get") += 1,
                    "backend" => backend,
                    "status" => "hit",
                );
                Some(data)
            }
            Ok(_) => {
                metric!(
                    counter("store.get") += 1,
                    "backend" => backend,
                    "status" => "miss",
                );
                None
            }
            Err(err) => {
                metric!(
                    counter("store.get") += 1,
                    "backend" => backend,
                    "status" => "error",
                    "errdetails" => err.metrics_tag(),
                );
                let stderr: &dyn std::error::Error = &err;
                tracing::warn!(stderr, %key, "Error reading from {} store", backend);
                None
            }
        }
    }

    /// Writes `value` at `key` with the given expiration.
    pub async fn set_with_expiry(
        &self,
        key: &CacheKey,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let backend = self.backend.name();
        let res = tokio::time::timeout(self.timeout, self.backend.set_ex(key.as_str(), value, ttl))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.timeout)));

        match res {
            Ok(()) => {
                metric!(
                    counter("store.set") += 1,
                    "backend" => backend,
                    "status" => "ok",
                );
                Ok(())
            }
            Err(err) => {
                metric!(
                    counter("store.set") += 1,
                    "backend" => backend,
                    "status" => "error",
                    "errdetails" => err.metrics_tag(),
                );
                let stderr: &dyn std::error::Error = &err;
                tracing::error!(stderr, %key, "Error writing to {} store", backend);
                Err(err)
            }
        }
    }
}
