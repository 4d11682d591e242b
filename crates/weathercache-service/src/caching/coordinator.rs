use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use sentry::{Hub, SentryFutureExt};
use tokio::time::Instant;
use tracing::Instrument;

use super::config::CoordinatorConfig;
use super::store::{CacheStore, StoreError};
use super::CacheKey;

/// Errors returned by [`FetchCoordinator::get`].
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The producer failed. Nothing was written to the store.
    #[error(transparent)]
    Producer(anyhow::Error),
    /// The producer succeeded, but its result could not be written to the store.
    #[error("failed to store the refilled entry")]
    Store(#[source] StoreError),
    /// Another caller's refill did not land in the store in time.
    #[error("timed out after {0:?} waiting for a concurrent refill")]
    Timeout(Duration),
}

/// The claim on a key's refill, released when dropped.
struct RefillClaim {
    key: CacheKey,
    refills: Arc<Mutex<HashSet<CacheKey>>>,
}

impl Drop for RefillClaim {
    fn drop(&mut self) {
        self.refills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Read-through access to the [`CacheStore`] that refills each key at most once at a time.
///
/// Every [`get`](Self::get) first reads the store. On a miss, exactly one of the concurrent
/// callers for that key wins the claim and runs the producer, writing its result with the
/// configured [`refill_ttl`](CoordinatorConfig::refill_ttl). All other callers poll the store
/// until that result shows up, or give up after [`max_wait`](CoordinatorConfig::max_wait).
///
/// The claim is local to this process. Multiple processes sharing one store may each refill
/// the same key, in which case the last write wins.
#[derive(Clone)]
pub struct FetchCoordinator {
    config: CoordinatorConfig,
    store: CacheStore,
    /// A [`HashSet`] of the keys currently being refilled.
    refills: Arc<Mutex<HashSet<CacheKey>>>,
}

impl fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refills = self
            .refills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        f.debug_struct("FetchCoordinator")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("running refills", &refills)
            .finish()
    }
}

impl FetchCoordinator {
    pub fn new(config: CoordinatorConfig, store: CacheStore) -> Self {
        Self {
            config,
            store,
            refills: Default::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Whether a refill of `key` is running right now.
    pub fn is_refilling(&self, key: &CacheKey) -> bool {
        self.refills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Returns the bytes stored for `key`, refilling them with `producer` on a miss.
    ///
    /// The producer is invoked at most once, and only if this caller wins the claim on `key`.
    /// It runs on a task of its own: when the future returned here is dropped, the refill
    /// still completes and writes its result for later callers.
    #[tracing::instrument(skip_all, fields(%key))]
    pub async fn get<F, Fut>(&self, key: &CacheKey, producer: F) -> Result<Bytes, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Bytes>> + Send + 'static,
    {
        metric!(counter("coordinator.access") += 1);

        if let Some(data) = self.store.get(key).await {
            metric!(counter("coordinator.hit") += 1);
            return Ok(data);
        }

        match self.try_claim(key) {
            Some(claim) => self.refill(claim, producer).await,
            None => self.wait_for_refill(key).await,
        }
    }

    /// Claims the refill of `key`, or returns `None` if another caller holds it.
    fn try_claim(&self, key: &CacheKey) -> Option<RefillClaim> {
        let mut refills = self
            .refills
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !refills.insert(key.clone()) {
            return None;
        }

        Some(RefillClaim {
            key: key.clone(),
            refills: Arc::clone(&self.refills),
        })
    }

    async fn refill<F, Fut>(&self, claim: RefillClaim, producer: F) -> Result<Bytes, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Bytes>> + Send + 'static,
    {
        let this = self.clone();
        let task = async move {
            let key = &claim.key;

            // A previous refill may have landed between our miss and the claim.
            if let Some(data) = this.store.get(key).await {
                metric!(counter("coordinator.hit") += 1);
                return Ok(data);
            }

            metric!(counter("coordinator.refill") += 1);
            tracing::debug!("Refilling cache entry");

            let data = match producer().await {
                Ok(data) if !data.is_empty() => data,
                Ok(_) => {
                    metric!(counter("coordinator.refill.error") += 1, "reason" => "empty");
                    return Err(FetchError::Producer(anyhow::anyhow!(
                        "producer returned no data"
                    )));
                }
                Err(err) => {
                    metric!(counter("coordinator.refill.error") += 1, "reason" => "producer");
                    return Err(FetchError::Producer(err));
                }
            };

            if let Err(err) = this
                .store
                .set_with_expiry(key, data.clone(), this.config.refill_ttl)
                .await
            {
                metric!(counter("coordinator.refill.error") += 1, "reason" => "store");
                return Err(FetchError::Store(err));
            }

            Ok(data)
        };

        let handle = tokio::spawn(
            task.in_current_span()
                .bind_hub(Hub::new_from_top(Hub::current())),
        );

        match handle.await {
            Ok(result) => result,
            Err(err) => {
                metric!(counter("coordinator.refill.error") += 1, "reason" => "panic");
                let err = anyhow::Error::new(err).context("refill task failed");
                Err(FetchError::Producer(err))
            }
        }
    }

    async fn wait_for_refill(&self, key: &CacheKey) -> Result<Bytes, FetchError> {
        metric!(counter("coordinator.wait") += 1);
        let start = Instant::now();

        let poll = async {
            loop {
                tokio::time::sleep(self.config.poll_interval).await;
                if let Some(data) = self.store.get(key).await {
                    return data;
                }
            }
        };

        match tokio::time::timeout(self.config.max_wait, poll).await {
            Ok(data) => {
                metric!(timer("coordinator.wait.duration") = start.elapsed());
                Ok(data)
            }
            Err(_) => {
                metric!(counter("coordinator.wait.timeout") += 1);
                tracing::warn!("Gave up waiting for concurrent refill");
                Err(FetchError::Timeout(self.config.max_wait))
            }
        }
    }
}
