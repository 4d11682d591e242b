//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`WeatherApi`], make sure that the server is held until all requests to
//!    it have been made. If the server is dropped, connections to it are refused. To avoid this,
//!    assign it to a variable: `let api = test::WeatherApi::new();`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the weathercache crates and mutes all
///    other logs (such as hyper or redis).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new(
            "weathercache=trace,weathercache_service=trace",
        ))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    pub fn with_router(router: Router) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));

        let listener = std::net::TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The report served for a known query, as `(name, country, temp in Kelvin)`.
fn known_location(query: &str) -> Option<(&'static str, &'static str, f64)> {
    match query {
        "Cologne,DE" => Some(("Cologne", "DE", 295.15)),
        "Berlin,DE" => Some(("Berlin", "DE", 290.0)),
        "Oymyakon,RU" => Some(("Oymyakon", "RU", 223.0)),
        _ => None,
    }
}

/// A fake of the OpenWeatherMap "current weather" API that counts the requests per query.
///
/// - `/data/2.5/weather?q=<query>` answers with a report for a few known locations, and with a
///   `404` document like the real API otherwise.
/// - The query `teapot` responds with `418` and an empty body.
/// - `/delay/<duration>/data/2.5/weather` answers the same after sleeping for `duration`.
/// - `/status/<code>/data/2.5/weather` responds with the given status and a `message` document.
pub struct WeatherApi {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl WeatherApi {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let weather = {
            let hits = hits.clone();
            move |Query(params): Query<BTreeMap<String, String>>| {
                let hits = hits.clone();
                async move {
                    let query = params.get("q").cloned().unwrap_or_default();
                    *hits.lock().unwrap().entry(query.clone()).or_default() += 1;
                    respond(&query)
                }
            }
        };

        let delayed = {
            let weather = weather.clone();
            move |Path(time): Path<String>, query: Query<BTreeMap<String, String>>| {
                let weather = weather.clone();
                async move {
                    let duration = humantime::parse_duration(&time).unwrap();
                    tokio::time::sleep(duration).await;
                    weather(query).await
                }
            }
        };

        let status = {
            let hits = hits.clone();
            move |Path(code): Path<u16>, Query(params): Query<BTreeMap<String, String>>| {
                let hits = hits.clone();
                async move {
                    let query = params.get("q").cloned().unwrap_or_default();
                    *hits.lock().unwrap().entry(query).or_default() += 1;

                    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    let body = serde_json::json!({
                        "cod": code,
                        "message": "fake upstream failure",
                    });
                    (status, body.to_string()).into_response()
                }
            }
        };

        let router = Router::new()
            .route("/data/2.5/weather", get(weather))
            .route("/delay/:time/data/2.5/weather", get(delayed))
            .route("/status/:code/data/2.5/weather", get(status));

        Self {
            server: Server::with_router(router),
            hits,
        }
    }

    /// Returns the base URL of the API.
    pub fn base_url(&self) -> Url {
        self.server.url("/")
    }

    /// Returns the base URL of the API answering after `delay`, e.g. `200ms`.
    pub fn delayed_url(&self, delay: &str) -> Url {
        self.server.url(&format!("delay/{delay}/"))
    }

    /// Returns the base URL of the API failing with the given status.
    pub fn failing_url(&self, status: u16) -> Url {
        self.server.url(&format!("status/{status}/"))
    }

    /// Returns the number of requests made for `query`.
    pub fn hits(&self, query: &str) -> usize {
        self.hits.lock().unwrap().get(query).copied().unwrap_or_default()
    }

    /// Returns the number of requests made in total.
    pub fn accesses(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

impl Default for WeatherApi {
    fn default() -> Self {
        Self::new()
    }
}

fn respond(query: &str) -> Response {
    if query == "teapot" {
        return StatusCode::IM_A_TEAPOT.into_response();
    }

    let body = match known_location(query) {
        Some((name, country, temp)) => serde_json::json!({
            "coord": {"lon": 0.0, "lat": 0.0},
            "main": {"temp": temp, "pressure": 1012, "humidity": 40},
            "sys": {"country": country},
            "name": name,
            "cod": 200,
        }),
        None => {
            let body = serde_json::json!({"cod": "404", "message": "city not found"});
            return (StatusCode::NOT_FOUND, body.to_string()).into_response();
        }
    };

    (StatusCode::OK, body.to_string()).into_response()
}
