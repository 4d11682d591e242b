//! Client for the OpenWeatherMap compatible "current weather" API.
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

use crate::config::UpstreamConfig;
use crate::report::WeatherReport;

/// The query used when a request does not name a location.
pub const DEFAULT_QUERY: &str = "Cologne,DE";

/// The `User-Agent` sent to the weather API.
pub static USER_AGENT: &str = concat!("weathercache/", env!("CARGO_PKG_VERSION"));

/// Returns the location to query for the raw `q` parameter of a request.
pub fn effective_query(raw: &str) -> &str {
    match raw.trim() {
        "" => DEFAULT_QUERY,
        query => query,
    }
}

/// Errors fetching a report from the weather API.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("failed to reach the weather API")]
    Request(#[from] reqwest::Error),
    #[error("weather API responded with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("weather API returned an empty document")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<Arc<str>>,
}

impl WeatherClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&config.base_url)
            .and_then(|base| base.join("data/2.5/weather"))
            .context("invalid weather API URL")?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .context("failed to create HTTP client")?;

        if config.api_key.is_none() {
            tracing::warn!("No weather API key configured, requests are likely to be rejected");
        }

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.as_deref().map(Arc::from),
        })
    }

    /// Fetches the raw current weather document for `query`.
    ///
    /// Only successful, non-empty responses are returned. Anything else is an error, so error
    /// documents never end up in the cache.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, query: &str) -> Result<Bytes, UpstreamError> {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if let Some(ref api_key) = self.api_key {
                pairs.append_pair("appid", api_key);
            }
        }

        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        metric!(
            timer("upstream.fetch.duration") = start.elapsed(),
            "status" => status.as_str(),
        );
        tracing::info!("Queried live weather data in {:?}", start.elapsed());

        if !status.is_success() {
            let message = WeatherReport::from_slice(&body)
                .ok()
                .and_then(|report| report.message().map(str::to_owned))
                .or_else(|| status.canonical_reason().map(str::to_owned))
                .unwrap_or_default();
            return Err(UpstreamError::Status { status, message });
        }
        if body.is_empty() {
            return Err(UpstreamError::Empty);
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_query() {
        assert_eq!(effective_query(""), "Cologne,DE");
        assert_eq!(effective_query("   "), "Cologne,DE");
        assert_eq!(effective_query(" Berlin,DE "), "Berlin,DE");
    }

    #[test]
    fn test_endpoint() {
        let config = UpstreamConfig {
            base_url: "http://127.0.0.1:1234/".into(),
            api_key: None,
            ..Default::default()
        };
        let client = WeatherClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint.as_str(),
            "http://127.0.0.1:1234/data/2.5/weather"
        );

        let config = UpstreamConfig {
            base_url: "nope".into(),
            ..Default::default()
        };
        assert!(WeatherClient::new(&config).is_err());
    }
}
