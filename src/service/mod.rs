//! Data services: fetch functions bound to cached `{data, loading, error}` state
//!
//! A consumer hands a [`Fetcher`] and [`DataServiceOptions`] to a
//! [`DataService`] together with a shared [`CacheManager`](crate::cache::CacheManager),
//! then reads `loading`/`error`/`data` from [`FetchState`] and calls
//! `refetch`/`clear_cache` in response to user actions.

mod data_service;
pub mod envelope;
mod fetcher;
mod options;
mod state;

pub use data_service::{DataService, DataServiceBuilder, ServiceHandle};
pub use envelope::{unwrap_response, Envelope, EnvelopeError};
pub use fetcher::Fetcher;
pub use options::DataServiceOptions;
pub use state::{Dependencies, FetchState};
