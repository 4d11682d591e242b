use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::caching::{CoordinatorConfig, StoreConfig};

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for weathercache.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A tag name to report the hostname to, for each metric. Defaults to not sending such a tag.
    pub hostname_tag: Option<String>,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "weathercache".into(),
            hostname_tag: None,
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Where current weather reports are fetched from.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the OpenWeatherMap compatible API.
    pub base_url: String,

    /// The `appid` sent along with every request.
    ///
    /// Defaults to the `OPENWEATHERMAP_API_KEY` environment variable.
    pub api_key: Option<String>,

    /// Timeout for a single upstream request, including reading the response.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/".to_owned(),
            api_key: env::var("OPENWEATHERMAP_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// The shared store holding cached reports.
    pub store: StoreConfig,

    /// Fine-tune how cache misses are refilled.
    pub coordinator: CoordinatorConfig,

    /// The weather API behind the cache.
    pub upstream: UpstreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            store: StoreConfig::default(),
            coordinator: CoordinatorConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

/// Checks if we are running in docker.
fn is_docker() -> bool {
    if fs::metadata("/.dockerenv").is_ok() {
        return true;
    }

    fs::read_to_string("/proc/self/cgroup")
        .map(|s| s.contains("/docker"))
        .unwrap_or(false)
}

/// Default value for the "bind" configuration.
fn default_bind() -> String {
    if is_docker() {
        // Docker images rely on this service being exposed
        "0.0.0.0:8080".to_owned()
    } else {
        "127.0.0.1:8080".to_owned()
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            )?,
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }

    /// Rejects settings that parse fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        if self.store.timeout.is_zero() {
            anyhow::bail!("store.timeout must be greater than zero");
        }
        Url::parse(&self.upstream.base_url).context("upstream.base_url is not a valid URL")?;
        if self.upstream.timeout.is_zero() {
            anyhow::bail!("upstream.timeout must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use crate::caching::{MemoryStoreConfig, StoreBackendConfig};

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::get(None).unwrap();

        assert_eq!(cfg.logging.level, LevelFilter::INFO);
        assert_eq!(cfg.coordinator.refill_ttl, Duration::from_secs(30));
        assert_eq!(cfg.coordinator.poll_interval, Duration::from_millis(50));
        assert_eq!(cfg.coordinator.max_wait, Duration::from_secs(10));
        assert_eq!(cfg.store.timeout, Duration::from_secs(1));
        assert!(matches!(cfg.store.backend, StoreBackendConfig::Redis(_)));
        assert_eq!(cfg.upstream.base_url, "https://api.openweathermap.org/");
        assert!(cfg.bind.ends_with(":8080"));
    }

    #[test]
    fn test_partial_config() {
        let yaml = r#"
            bind: 0.0.0.0:9000
            logging:
              level: debug
              format: json
            store:
              memory: {}
            coordinator:
              refill_ttl: 1m
            upstream:
              base_url: http://127.0.0.1:1234/
              api_key: abc123
              timeout: 2s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.bind, "0.0.0.0:9000");
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.logging.enable_backtraces);
        assert_eq!(
            cfg.store.backend,
            StoreBackendConfig::Memory(MemoryStoreConfig {
                capacity: 64 * 1024 * 1024
            })
        );
        assert_eq!(cfg.coordinator.refill_ttl, Duration::from_secs(60));
        assert_eq!(cfg.coordinator.poll_interval, Duration::from_millis(50));
        assert_eq!(cfg.upstream.base_url, "http://127.0.0.1:1234/");
        assert_eq!(cfg.upstream.api_key.as_deref(), Some("abc123"));
        assert_eq!(cfg.upstream.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_file() {
        let err = Config::from_reader("\n  \n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "config file empty");
    }

    #[test]
    fn test_invalid_level() {
        let err = Config::from_reader("logging:\n  level: loud\n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "failed to parse config YAML");
    }

    #[test]
    fn test_validate() {
        let yaml = r#"
            coordinator:
              poll_interval: 20s
              max_wait: 10s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert!(cfg.validate().is_err());

        let yaml = r#"
            upstream:
              timeout: 0s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert!(cfg.validate().is_err());

        let yaml = r#"
            upstream:
              base_url: not a url
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.to_string(), "upstream.base_url is not a valid URL");
    }
}
