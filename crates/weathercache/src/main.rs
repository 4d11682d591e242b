//! Weathercache.
//!
//! Weathercache is a web service that answers current weather queries from a shared cache in
//! front of the OpenWeatherMap API. Concurrent misses for the same location are coalesced into a
//! single upstream request.

#![warn(
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;

#[cfg(test)]
use weathercache_test as test;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
