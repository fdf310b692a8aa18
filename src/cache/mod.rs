//! Cache module for sharing fetched payloads between data services
//!
//! This module provides an in-memory cache manager with per-entry TTL
//! (time-to-live) values. Expired entries behave as absent on read, and
//! concurrent misses for one key can share a single in-flight fetch.

mod manager;

pub use manager::{CacheManager, CachedData, PendingFetch, DEFAULT_TTL};
