use std::time::Duration;

use url::Url;
use weathercache_service::caching::{
    CacheStore, CoordinatorConfig, FetchCoordinator, MemoryBackend,
};
use weathercache_service::config::UpstreamConfig;
use weathercache_service::services::WeatherService;
use weathercache_service::upstream::WeatherClient;

/// Creates a [`WeatherService`] on an in-memory store, fetching from `base_url`.
pub fn setup_service(base_url: Url, refill_ttl: Duration) -> WeatherService {
    weathercache_test::setup();

    let store = CacheStore::new(MemoryBackend::new(1024 * 1024), Duration::from_secs(1));
    let coordinator = FetchCoordinator::new(
        CoordinatorConfig {
            refill_ttl,
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_secs(5),
        },
        store,
    );

    let client = WeatherClient::new(&UpstreamConfig {
        base_url: base_url.to_string(),
        api_key: Some("test-key".into()),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    WeatherService::new(coordinator, client)
}
