//! Options recognized by a data service

use std::time::Duration;

use crate::cache::DEFAULT_TTL;

/// Caching behaviour for one data service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataServiceOptions {
    /// Whether to consult and populate the shared cache
    pub use_cache: bool,
    /// Time-to-live of the entries this service writes
    pub cache_ttl: Duration,
    /// Explicit cache key; derived from the fetcher when absent
    pub cache_key: Option<String>,
}

impl Default for DataServiceOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_ttl: DEFAULT_TTL,
            cache_key: None,
        }
    }
}

impl DataServiceOptions {
    /// Turns cache reads, writes and fetch sharing on or off
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// TTL for entries this service writes
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Shares results with every service using the same key
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }
}
