use std::time::Duration;

use reqwest::StatusCode;
use weathercache_service::caching::{CacheKey, FetchError};
use weathercache_service::upstream::UpstreamError;
use weathercache_test::WeatherApi;

use crate::utils::setup_service;

fn upstream_error(err: &FetchError) -> &UpstreamError {
    match err {
        FetchError::Producer(err) => err.downcast_ref::<UpstreamError>().unwrap(),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_city_is_not_cached() {
    let api = WeatherApi::new();
    let service = setup_service(api.base_url(), Duration::from_secs(30));

    let err = service.current_weather("Atlantis,XX").await.unwrap_err();
    assert!(matches!(
        upstream_error(&err),
        UpstreamError::Status { status, message }
            if *status == StatusCode::NOT_FOUND && message == "city not found"
    ));
    assert_eq!(
        err.to_string(),
        "weather API responded with 404 Not Found: city not found"
    );

    service.current_weather("Atlantis,XX").await.unwrap_err();
    assert_eq!(api.hits("Atlantis,XX"), 2);
}

#[tokio::test]
async fn test_server_errors() {
    let api = WeatherApi::new();
    let service = setup_service(api.failing_url(502), Duration::from_secs(30));

    let err = service.current_weather("Cologne,DE").await.unwrap_err();
    assert!(matches!(
        upstream_error(&err),
        UpstreamError::Status { status, message }
            if *status == StatusCode::BAD_GATEWAY && message == "fake upstream failure"
    ));
    let key = CacheKey::for_query("Cologne,DE");
    assert!(!service.coordinator().is_refilling(&key));
    assert_eq!(service.coordinator().store().get(&key).await, None);
}

#[tokio::test]
async fn test_status_without_document() {
    let api = WeatherApi::new();
    let service = setup_service(api.base_url(), Duration::from_secs(30));

    let err = service.current_weather("teapot").await.unwrap_err();
    assert!(matches!(
        upstream_error(&err),
        UpstreamError::Status { status, message }
            if *status == StatusCode::IM_A_TEAPOT && message == "I'm a teapot"
    ));
}

#[tokio::test]
async fn test_unreachable_upstream() {
    let base_url = {
        let api = WeatherApi::new();
        api.base_url()
    };
    // the server is gone, connections are refused
    tokio::time::sleep(Duration::from_millis(50)).await;
    let service = setup_service(base_url, Duration::from_secs(30));

    let err = service.current_weather("Cologne,DE").await.unwrap_err();
    assert!(matches!(upstream_error(&err), UpstreamError::Request(_)));
}
