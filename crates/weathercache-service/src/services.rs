//! Provides the weather report service and a way to initialize it.
//!
//! [`WeatherService`] ties the [`FetchCoordinator`] to the [`WeatherClient`]: reports are read
//! from the shared store, and refilled from the weather API on a miss.

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::caching::{CacheKey, CacheStore, FetchCoordinator, FetchError};
use crate::config::Config;
use crate::upstream::WeatherClient;

#[derive(Debug, Clone)]
pub struct WeatherService {
    coordinator: FetchCoordinator,
    client: WeatherClient,
}

impl WeatherService {
    /// Connects to the configured store and sets up the weather API client.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = CacheStore::from_config(&config.store)
            .await
            .context("failed to create cache store")?;
        let client = WeatherClient::new(&config.upstream).context("failed to create weather client")?;

        Ok(Self::new(FetchCoordinator::new(config.coordinator, store), client))
    }

    pub fn new(coordinator: FetchCoordinator, client: WeatherClient) -> Self {
        Self {
            coordinator,
            client,
        }
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    /// Returns the raw weather document for `query`, from the store if possible.
    ///
    /// `query` is used verbatim, see [`effective_query`](crate::upstream::effective_query).
    pub async fn current_weather(&self, query: &str) -> Result<Bytes, FetchError> {
        let key = CacheKey::for_query(query);
        let client = self.client.clone();
        let query = query.to_owned();

        self.coordinator
            .get(&key, move || async move {
                client.fetch(&query).await.map_err(anyhow::Error::from)
            })
            .await
    }
}
