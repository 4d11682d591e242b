//! # Weathercache caching infrastructure
//!
//! Every report served by weathercache comes out of a key-value store shared by all instances.
//! The upstream API is slow and rate-limited, so the store is refilled only on demand and only
//! once per key at a time.
//!
//! ## Layers
//!
//! - The [`CacheStore`] is a thin handle to a [`StoreBackend`], usually [`RedisBackend`]. It knows
//!   two operations: reading a key, and writing a key with an expiration. Read failures become
//!   misses, so an outage of the store degrades into refilling every request.
//! - The [`FetchCoordinator`] sits on top and implements read-through access. On a miss, the
//!   first caller for a key claims the refill, runs the producer, and writes the result. Callers
//!   arriving while the refill runs poll the store until the result appears.
//!
//! The store is the only place data is handed from the refilling caller to the waiting ones.
//! This works the same within a process and across processes, at the cost of waiters observing
//! a refill up to one poll interval late.
//!
//! Nothing negative is ever cached: failed refills write nothing, and the next caller after a
//! failure retries.
//!
//! ### Metrics
//!
//! - `coordinator.access`: All accesses.
//! - `coordinator.hit`: Accesses served from the store.
//! - `coordinator.refill`: Producer invocations.
//! - `coordinator.refill.error`: Failed refills, tagged with a `reason`.
//! - `coordinator.wait`: Accesses that waited on a concurrent refill.
//! - `coordinator.wait.timeout`: Waits that gave up.
//! - `store.get` / `store.set`: Store operations, tagged with `backend` and `status`.
//!
//! ### Configuration
//!
//! [`StoreConfig`] selects the backend and bounds each store operation, [`CoordinatorConfig`]
//! holds the expiration of refilled entries and the timing of waiters.

mod cache_key;
mod config;
mod coordinator;
mod memory;
mod redis;
mod store;

pub use cache_key::{CacheKey, CacheKeyBuilder};
pub use config::{
    CoordinatorConfig, MemoryStoreConfig, RedisStoreConfig, StoreBackendConfig, StoreConfig,
};
pub use coordinator::{FetchCoordinator, FetchError};
pub use memory::MemoryBackend;
pub use self::redis::RedisBackend;
pub use store::{CacheStore, StoreBackend, StoreError};
