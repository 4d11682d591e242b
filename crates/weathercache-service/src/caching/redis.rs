use std::fmt;
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use futures::future::BoxFuture;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::config::RedisStoreConfig;
use super::store::{StoreBackend, StoreError};

/// A store on a (possibly shared) redis server.
///
/// The [`ConnectionManager`] multiplexes all requests over one connection and transparently
/// reconnects when that connection is lost.
#[derive(Clone)]
pub struct RedisBackend {
    url: String,
    conn: ConnectionManager,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Opens the initial connection to the server at `config.url`.
    pub async fn connect(config: &RedisStoreConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .with_context(|| format!("invalid redis url `{}`", config.url))?;
        let conn = ConnectionManager::new(client)
            .await
            .with_context(|| format!("failed to connect to redis at `{}`", config.url))?;

        Ok(Self {
            url: config.url.clone(),
            conn,
        })
    }
}

/// Converts a TTL to the whole seconds SETEX expects, rounding up and never below one second.
fn setex_seconds(ttl: Duration) -> u64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.max(1)
}

impl StoreBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let value: Option<Vec<u8>> = conn.get(key).await.context("redis GET failed")?;
            Ok(value.map(Bytes::from))
        })
    }

    fn set_ex<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: () = conn
                .set_ex(key, value.as_ref(), setex_seconds(ttl))
                .await
                .context("redis SETEX failed")?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setex_seconds() {
        assert_eq!(setex_seconds(Duration::from_secs(30)), 30);
        assert_eq!(setex_seconds(Duration::from_millis(30_001)), 31);
        assert_eq!(setex_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(setex_seconds(Duration::from_millis(10)), 1);
        assert_eq!(setex_seconds(Duration::ZERO), 1);
        assert_eq!(setex_seconds(Duration::MAX), u64::MAX);
    }
}
