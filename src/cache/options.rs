//! Per-resource cache tuning.

use std::time::Duration;

use super::retry::Backoff;

/// Tuning for one cached resource.
///
/// The defaults mirror the product's query-client configuration: five
/// minutes of freshness, ten minutes of grace before an unobserved entry is
/// collected, three consecutive failures before the entry parks in error.
/// Override them per namespace on the cache builder or per call via
/// `subscribe_with`.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// How long after a successful fetch the value counts as fresh.
    pub stale_time: Duration,

    /// How long an entry with no subscribers survives before eviction.
    pub gc_time: Duration,

    /// Bound on consecutive fetch failures before the entry parks in error.
    pub max_retries: u32,

    /// Delay policy between failed attempts.
    pub backoff: Backoff,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl CacheOptions {
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Namespace of a resource key: the segment before the first `:`
/// (`"notifications:list"` -> `"notifications"`). Keys without a separator
/// are their own namespace.
pub(crate) fn key_namespace(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}
