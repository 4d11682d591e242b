use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::BoxFuture;

use super::store::{StoreBackend, StoreError};

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
struct MemoryItem {
    /// When the store considers this item expired, `None` if that is too far out to represent.
    deadline: Option<Instant>,
    /// The actual data.
    data: Bytes,
}

/// A [`moka::Expiry`] that uses the [`MemoryItem`] deadline as the explicit expiration time.
struct ItemExpiration;

/// Returns the duration between the `current_time` and `deadline` in the future.
/// In case the `deadline` is already elapsed, this will return `Some(ZERO)`. Items without a
/// deadline never expire.
fn saturating_duration_since(current_time: Instant, deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|deadline| {
        deadline
            .checked_duration_since(current_time)
            .unwrap_or_default()
    })
}

impl moka::Expiry<Arc<str>, MemoryItem> for ItemExpiration {
    fn expire_after_create(
        &self,
        _key: &Arc<str>,
        value: &MemoryItem,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &Arc<str>,
        value: &MemoryItem,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

/// A store that lives inside this process.
///
/// Entries expire individually like they would in redis. Nothing is shared with other
/// processes, so every instance refills its own entries.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    cache: moka::future::Cache<Arc<str>, MemoryItem>,
}

impl MemoryBackend {
    /// Creates a store holding at most `capacity` bytes of keys and values.
    pub fn new(capacity: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity)
            .name("weathercache-store")
            .expire_after(ItemExpiration)
            .weigher(|k: &Arc<str>, v: &MemoryItem| {
                u32::try_from(k.len() + v.data.len()).unwrap_or(u32::MAX)
            })
            .build();

        Self { cache }
    }
}

impl StoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        Box::pin(async move {
            let item = self.cache.get(key).await;
            // moka evicts lazily, an item past its deadline must not be served.
            let now = Instant::now();
            Ok(item
                .filter(|item| item.deadline.is_none_or(|deadline| deadline > now))
                .map(|item| item.data))
        })
    }

    fn set_ex<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let item = MemoryItem {
                deadline: Instant::now().checked_add(ttl),
                data: value,
            };
            self.cache.insert(Arc::from(key), item).await;
            Ok(())
        })
    }
}
