//! MES data service library
//!
//! Cached, de-duplicated data fetching with `{data, loading, error}` state for
//! the screens of a manufacturing execution system. The binary `mes-fetch`
//! drives it from the command line.

pub mod cache;
pub mod cli;
pub mod error;
pub mod refresh;
pub mod service;
pub mod source;

pub use cache::CacheManager;
pub use error::ServiceError;
pub use service::{DataService, DataServiceOptions, FetchState, Fetcher};
