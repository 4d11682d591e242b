use std::net::SocketAddr;

use anyhow::{Context, Result};
use weathercache_service::config::Config;
use weathercache_service::metric;
use weathercache_service::services::WeatherService;

use crate::endpoints;

/// Starts the store connection and the HTTP server based on loaded config.
///
/// Runs until the process receives SIGINT or SIGTERM. Requests in flight are completed before
/// this returns.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let megs = 1024 * 1024;
    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("weathercache-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    web_pool.block_on(serve(config))?;
    tracing::info!("System shutdown complete");

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Establishing connection to the cache store");
    let service = WeatherService::from_config(&config)
        .await
        .context("failed to create HTTP service state")?;

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address `{}`", config.bind))?;
    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind to {socket}"))?;
    tracing::info!("Starting HTTP server on {}", socket);

    axum::serve(listener, endpoints::create_app(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// Resolves once the process is asked to terminate.
async fn shutdown_signal() {
    #[cfg(unix)]
    let signal_name = {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            (Err(err), _) | (_, Err(err)) => {
                log_signal_error(&err);
                std::future::pending::<&str>().await
            }
        }
    };

    #[cfg(not(unix))]
    let signal_name = match tokio::signal::ctrl_c().await {
        Ok(()) => "CTRL_C",
        Err(err) => {
            log_signal_error(&err);
            std::future::pending::<&str>().await
        }
    };

    tracing::info!("Received {}, shutting down", signal_name);
}

fn log_signal_error(err: &std::io::Error) {
    let stderr: &dyn std::error::Error = err;
    tracing::error!(stderr, "Failed to install signal handlers");
}
