//! Cache manager for sharing fetched payloads between data services
//!
//! Provides a `CacheManager` that stores values under string keys with a
//! time-to-live, plus a registry of fetches that are still in flight so that
//! concurrent misses for the same key share one request.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::ServiceError;

/// Default time-to-live for cached entries (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A fetch that may be awaited by several load cycles at once
pub type PendingFetch<V> = Shared<BoxFuture<'static, Result<V, ServiceError>>>;

/// A registered in-flight fetch and the ticket it was started with
struct InFlight<V> {
    ticket: u64,
    fetch: PendingFetch<V>,
}

/// Wrapper struct for a stored value
#[derive(Debug)]
struct CacheEntry<V> {
    /// The cached value
    data: V,
    /// Monotonic reference point for expiry
    stored_at: Instant,
    /// When the data was cached, for display
    cached_at: DateTime<Utc>,
    /// How long the entry stays fresh
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// Result of peeking into the cache, including metadata about freshness
#[derive(Debug, Clone)]
pub struct CachedData<V> {
    /// The cached data
    pub data: V,
    /// When the data was originally cached
    pub cached_at: DateTime<Utc>,
    /// Whether the cache entry has expired
    pub is_expired: bool,
}

/// Keyed in-memory store with lazy TTL expiry
///
/// A `CacheManager` is meant to be constructed once per cache scope and shared
/// (`Arc<CacheManager>`) between every data service that should see the same
/// cached results. Expired entries are removed when they are read; `size()`
/// still counts them until then.
pub struct CacheManager<V = Value> {
    entries: DashMap<String, CacheEntry<V>>,
    pending: DashMap<String, InFlight<V>>,
    next_ticket: AtomicU64,
    default_ttl: Duration,
    max_entries: Option<usize>,
}

impl<V> fmt::Debug for CacheManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("entries", &self.entries.len())
            .field("pending", &self.pending.len())
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl<V> Default for CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an unbounded cache with the default 5 minute TTL
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Creates an unbounded cache with a custom default TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            pending: DashMap::new(),
            next_ticket: AtomicU64::new(1),
            default_ttl: ttl,
            max_entries: None,
        }
    }

    /// Bounds the number of stored entries
    ///
    /// When a new key would exceed the bound, the entry stored longest ago is
    /// evicted first. A bound of 0 is raised to 1 so the latest write is kept.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    /// The TTL applied by [`CacheManager::set`]
    pub fn ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the value stored under `key` if it is still fresh
    ///
    /// An entry whose age has reached its TTL is removed and treated as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.data.clone());
            }
        }

        // Only drop the entry if nobody replaced it since the read above
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        tracing::debug!("cache entry expired: key={}", key);
        None
    }

    /// Stores `data` under `key` using the manager's default TTL
    pub fn set(&self, key: impl Into<String>, data: V) {
        self.set_with_ttl(key, data, self.default_ttl);
    }

    /// Stores `data` under `key` with its own TTL, replacing any previous entry
    pub fn set_with_ttl(&self, key: impl Into<String>, data: V, ttl: Duration) {
        let key = key.into();

        if let Some(max) = self.max_entries {
            while !self.entries.contains_key(&key) && self.entries.len() >= max {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: Instant::now(),
                cached_at: Utc::now(),
                ttl,
            },
        );
    }

    /// Removes one entry, or every entry when `key` is `None`
    pub fn clear(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.entries.remove(key);
            }
            None => self.entries.clear(),
        }
    }

    /// Number of stored entries, including expired ones not yet read
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Reads an entry without expiring it
    ///
    /// Expired entries are still returned (with `is_expired = true`) so callers
    /// can show stale data while a new request is running.
    pub fn peek(&self, key: &str) -> Option<CachedData<V>> {
        let entry = self.entries.get(key)?;
        Some(CachedData {
            data: entry.data.clone(),
            cached_at: entry.cached_at,
            is_expired: entry.is_expired(Instant::now()),
        })
    }

    /// Removes every expired entry and returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Returns the in-flight fetch for `key`, starting one with `start` if needed
    ///
    /// `start` receives the ticket of the new registration, which
    /// [`CacheManager::store_pending`] checks before writing. With `replace`
    /// set, a new fetch is always started and takes over the key; the older
    /// fetch still resolves for whoever awaits it but can no longer write.
    pub fn pending_or_start<F>(&self, key: &str, replace: bool, start: F) -> PendingFetch<V>
    where
        F: FnOnce(u64) -> BoxFuture<'static, Result<V, ServiceError>>,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        if replace {
            let fetch = start(ticket).shared();
            let in_flight = InFlight {
                ticket,
                fetch: fetch.clone(),
            };
            if self.pending.insert(key.to_string(), in_flight).is_some() {
                tracing::debug!("replacing in-flight fetch: key={}", key);
            }
            return fetch;
        }

        let mut joined = true;
        let fetch = self
            .pending
            .entry(key.to_string())
            .or_insert_with(|| {
                joined = false;
                InFlight {
                    ticket,
                    fetch: start(ticket).shared(),
                }
            })
            .fetch
            .clone();
        if joined {
            tracing::debug!("joining in-flight fetch: key={}", key);
        }
        fetch
    }

    /// Stores the result of the fetch registered under `ticket`
    ///
    /// Nothing is written when that fetch was replaced or unregistered in the
    /// meantime. Returns whether the entry was written.
    pub fn store_pending(&self, key: &str, ticket: u64, data: V, ttl: Duration) -> bool {
        let Some(in_flight) = self.pending.get(key) else {
            return false;
        };
        if in_flight.ticket != ticket {
            return false;
        }
        self.set_with_ttl(key, data, ttl);
        true
    }

    /// Forgets the in-flight fetch for `key` if it is still `fetch`
    pub fn finish_pending(&self, key: &str, fetch: &PendingFetch<V>) {
        self.pending
            .remove_if(key, |_, current| current.fetch.ptr_eq(fetch));
    }

    /// Number of fetches currently registered as in flight
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.stored_at)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                tracing::debug!("evicting oldest cache entry: key={}", key);
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}
