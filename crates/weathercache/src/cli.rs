//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use weathercache_service::config::Config;
use weathercache_service::metrics;

use crate::healthcheck;
use crate::logging;
use crate::server;

/// Weathercache commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server.
    Run,

    /// Check the health of a running web server.
    Healthcheck {
        /// Address of the server, defaults to the configured `bind` address.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Request timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

/// Command line interface parser.
#[derive(Parser, Debug)]
#[command(
    version,
    long_version = concat!(
        "version: ",
        env!("CARGO_PKG_VERSION"),
        "\ngit commit: ",
        env!("WEATHERCACHE_GIT_VERSION")
    ),
)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: Some(env!("WEATHERCACHE_RELEASE").into()),
        ..Default::default()
    });

    // SAFETY: we are still single-threaded here, the runtime is only started by `server::run`.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let mut tags = config.metrics.custom_tags.clone();
        if let Some(hostname_tag) = config.metrics.hostname_tag.clone() {
            if let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok()) {
                tags.insert(hostname_tag, hostname);
            }
        }
        metrics::configure_statsd(&config.metrics.prefix, statsd, tags)
            .context("failed to configure metrics")?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Healthcheck { addr, timeout } => healthcheck::healthcheck(config, addr, timeout)?,
    }

    Ok(())
}
