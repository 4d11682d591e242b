use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Connection URL of the redis server, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Maximum size in bytes of all keys and values held in memory.
    #[serde(default = "default_memory_capacity")]
    pub capacity: u64,
}

/// The backend to use for the cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendConfig {
    Redis(RedisStoreConfig),
    /// A store local to this process, for development and single-instance deployments.
    Memory(MemoryStoreConfig),
}

/// The key-value store that holds cached reports.
///
/// All instances of weathercache pointed at the same store share their cached reports. Writes
/// to the store are best-effort: a failed write is reported but never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound for a single store operation.
    ///
    /// A read that times out is treated as a miss.
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// The backend to use for the store.
    #[serde(flatten)]
    pub backend: StoreBackendConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout: default_store_timeout(),
            backend: StoreBackendConfig::Redis(RedisStoreConfig::default()),
        }
    }
}

/// Tuning of the refill protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Expiration of entries written after a refill.
    ///
    /// This bounds how stale a report can get, and how long a bad write from a racing
    /// instance survives.
    #[serde(with = "humantime_serde")]
    pub refill_ttl: Duration,

    /// How often a caller waiting on another caller's refill looks at the store.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long a caller waits on another caller's refill before giving up.
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            refill_ttl: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl CoordinatorConfig {
    /// Checks that the settings describe a protocol that can make progress.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refill_ttl.is_zero() {
            anyhow::bail!("coordinator.refill_ttl must be greater than zero");
        }
        if self.poll_interval.is_zero() {
            anyhow::bail!("coordinator.poll_interval must be greater than zero");
        }
        if self.poll_interval > self.max_wait {
            anyhow::bail!("coordinator.poll_interval must not exceed coordinator.max_wait");
        }
        Ok(())
    }
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_memory_capacity() -> u64 {
    64 * 1024 * 1024
}

/// Builds the redis URL from the variables set by a docker `--link` to a `redis` container.
fn default_redis_url() -> String {
    let host = env::var("REDIS_PORT_6379_TCP_ADDR")
        .ok()
        .filter(|addr| !addr.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_owned());
    let port = env::var("REDIS_PORT_6379_TCP_PORT")
        .ok()
        .filter(|port| !port.is_empty())
        .unwrap_or_else(|| "6379".to_owned());

    if host.contains(':') {
        format!("redis://[{host}]:{port}")
    } else {
        format!("redis://{host}:{port}")
    }
}
