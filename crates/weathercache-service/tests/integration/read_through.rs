use std::time::Duration;

use futures::future::join_all;
use weathercache_service::report::WeatherReport;
use weathercache_test::WeatherApi;

use crate::utils::setup_service;

#[tokio::test]
async fn test_concurrent_requests_hit_upstream_once() {
    let api = WeatherApi::new();
    let service = setup_service(api.delayed_url("200ms"), Duration::from_secs(30));

    let results = join_all((0..10).map(|_| service.current_weather("Cologne,DE"))).await;

    assert_eq!(api.hits("Cologne,DE"), 1);
    let first = results[0].as_ref().unwrap().clone();
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), &first);
    }

    let report = WeatherReport::from_slice(&first).unwrap();
    assert_eq!(
        report.to_string(),
        "Current temperature in Cologne (DE) is 22.1 °C"
    );

    // served from the store from now on
    let again = service.current_weather("Cologne,DE").await.unwrap();
    assert_eq!(again, first);
    assert_eq!(api.hits("Cologne,DE"), 1);
}

#[tokio::test]
async fn test_distinct_queries() {
    let api = WeatherApi::new();
    let service = setup_service(api.base_url(), Duration::from_secs(30));

    let (cologne, berlin) = tokio::join!(
        service.current_weather("Cologne,DE"),
        service.current_weather("Berlin,DE"),
    );

    let cologne = WeatherReport::from_slice(&cologne.unwrap()).unwrap();
    let berlin = WeatherReport::from_slice(&berlin.unwrap()).unwrap();
    assert_eq!(cologne.name, "Cologne");
    assert_eq!(berlin.to_string(), "Current temperature in Berlin (DE) is 17.0 °C");
    assert_eq!(api.hits("Cologne,DE"), 1);
    assert_eq!(api.hits("Berlin,DE"), 1);
}

#[tokio::test]
async fn test_expired_entries_are_refilled() {
    let api = WeatherApi::new();
    let service = setup_service(api.base_url(), Duration::from_millis(100));

    service.current_weather("Berlin,DE").await.unwrap();
    service.current_weather("Berlin,DE").await.unwrap();
    assert_eq!(api.hits("Berlin,DE"), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;

    service.current_weather("Berlin,DE").await.unwrap();
    assert_eq!(api.hits("Berlin,DE"), 2);
}
