use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use weathercache_service::report::WeatherReport;
use weathercache_service::services::WeatherService;
use weathercache_service::upstream::effective_query;

use super::ResponseError;

#[derive(Debug, Default, Deserialize)]
pub struct WeatherParams {
    /// The location, e.g. `Cologne,DE`.
    #[serde(default)]
    q: String,
}

/// Renders the current temperature at the location given by `q`.
pub async fn current_weather(
    State(service): State<WeatherService>,
    Query(params): Query<WeatherParams>,
) -> Result<String, ResponseError> {
    let query = effective_query(&params.q);
    let data = service.current_weather(query).await?;

    let report = WeatherReport::from_slice(&data)
        .context("cached weather report is malformed")
        .map_err(|err| (StatusCode::BAD_GATEWAY, err))?;

    Ok(format!("{report}\n"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use reqwest::StatusCode;
    use weathercache_service::caching::{
        CacheKey, CacheStore, CoordinatorConfig, FetchCoordinator, MemoryBackend,
    };
    use weathercache_service::config::UpstreamConfig;
    use weathercache_service::upstream::WeatherClient;

    use crate::endpoints::create_app;
    use crate::endpoints::error::ApiErrorResponse;
    use crate::test;

    use super::*;

    fn service(base_url: &str, coordinator: CoordinatorConfig) -> WeatherService {
        test::setup();

        let store = CacheStore::new(MemoryBackend::new(1024 * 1024), Duration::from_secs(1));
        let client = WeatherClient::new(&UpstreamConfig {
            base_url: base_url.to_owned(),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        WeatherService::new(FetchCoordinator::new(coordinator, store), client)
    }

    async fn get(server: &test::Server, path: &str) -> (StatusCode, String) {
        let response = reqwest::get(server.url(path)).await.unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }

    #[tokio::test]
    async fn test_current_weather() {
        let api = test::WeatherApi::new();
        let service = service(api.base_url().as_str(), CoordinatorConfig::default());
        let server = test::Server::with_router(create_app(service));

        let (status, body) = get(&server, "/?q=Cologne,DE").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Current temperature in Cologne (DE) is 22.1 °C\n");

        let (status, body) = get(&server, "/?q=Oymyakon,RU").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Current temperature in Oymyakon (RU) is -50.0 °C\n");

        // the default location is cached already
        let (status, body) = get(&server, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Current temperature in Cologne (DE) is 22.1 °C\n");

        assert_eq!(api.hits("Cologne,DE"), 1);
        assert_eq!(api.accesses(), 2);
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let api = test::WeatherApi::new();
        let service = service(api.base_url().as_str(), CoordinatorConfig::default());
        let server = test::Server::with_router(create_app(service));

        let (status, body) = get(&server, "/?q=Atlantis,XX").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let error: ApiErrorResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(
            error.detail.as_deref(),
            Some("weather API responded with 404 Not Found: city not found")
        );
    }

    #[tokio::test]
    async fn test_waiter_timeout() {
        let api = test::WeatherApi::new();
        let coordinator = CoordinatorConfig {
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_millis(50),
            ..Default::default()
        };
        let service = service(api.delayed_url("500ms").as_str(), coordinator);
        let server = test::Server::with_router(create_app(service));

        let (first, second) = tokio::join!(
            get(&server, "/?q=Berlin,DE"),
            get(&server, "/?q=Berlin,DE"),
        );

        let mut statuses = [first.0, second.0];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::OK, StatusCode::GATEWAY_TIMEOUT]);
        assert_eq!(api.hits("Berlin,DE"), 1);
    }

    #[tokio::test]
    async fn test_malformed_entry() {
        let api = test::WeatherApi::new();
        let service = service(api.base_url().as_str(), CoordinatorConfig::default());
        service
            .coordinator()
            .store()
            .set_with_expiry(
                &CacheKey::for_query("Cologne,DE"),
                Bytes::from_static(b"<html>"),
                Duration::from_secs(30),
            )
            .await
            .unwrap();
        let server = test::Server::with_router(create_app(service));

        let (status, body) = get(&server, "/?q=Cologne,DE").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let error: ApiErrorResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(
            error.detail.as_deref(),
            Some("cached weather report is malformed")
        );
        assert_eq!(api.accesses(), 0);
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let api = test::WeatherApi::new();
        let service = service(api.base_url().as_str(), CoordinatorConfig::default());
        let server = test::Server::with_router(create_app(service));

        let (status, body) = get(&server, "/healthcheck").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
        assert_eq!(api.accesses(), 0);
    }
}
