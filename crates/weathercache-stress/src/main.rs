use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use humantime::parse_duration;
use url::Url;

mod stresstest;

use stresstest::perform_stresstest;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Fires concurrent requests at a running weathercache server.
///
/// For every query, `concurrency` requests are kept in flight until `duration` has passed.
/// Afterwards the throughput and latency percentiles are printed per query.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Base URL of the weathercache server.
    #[arg(long, short, default_value = "http://127.0.0.1:8080/")]
    url: Url,

    /// A location to query, can be given multiple times.
    #[arg(long = "query", short, default_value = "Cologne,DE")]
    queries: Vec<String>,

    /// Number of requests in flight per query.
    #[arg(long, short, default_value_t = 10)]
    concurrency: usize,

    /// Duration of the stresstest.
    #[arg(long, short, value_parser = parse_duration, default_value = "100s")]
    duration: Duration,

    /// Timeout of a single request.
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    timeout: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    anyhow::ensure!(cli.concurrency > 0, "concurrency must be at least 1");

    let client = reqwest::Client::builder()
        .timeout(cli.timeout)
        .build()
        .context("failed to create HTTP client")?;

    perform_stresstest(client, cli.url, cli.queries, cli.concurrency, cli.duration).await
}
