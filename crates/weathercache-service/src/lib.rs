#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod report;
pub mod services;
pub mod upstream;

#[cfg(test)]
use weathercache_test as test;
