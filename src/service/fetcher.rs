//! Type-erased fetch functions

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::ServiceError;

static NEXT_FETCHER_ID: AtomicU64 = AtomicU64::new(1);

type FetchFn = dyn Fn() -> BoxFuture<'static, Result<Value, ServiceError>> + Send + Sync;

/// A zero-argument asynchronous fetch function
///
/// Wraps any closure returning a future of `Result<R, E>`. The payload is
/// carried as JSON; the error is kept as its display string.
#[derive(Clone)]
pub struct Fetcher {
    call: Arc<FetchFn>,
    identity: String,
}

impl Fetcher {
    pub fn new<F, Fut, R, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let identity = format!(
            "{}#{}",
            std::any::type_name::<F>(),
            NEXT_FETCHER_ID.fetch_add(1, Ordering::Relaxed)
        );

        let call: Arc<FetchFn> = Arc::new(move || {
            let fut = f();
            async move {
                match fut.await {
                    Ok(response) => serde_json::to_value(response)
                        .map_err(|e| ServiceError::Payload(e.to_string())),
                    Err(e) => Err(ServiceError::Fetch(e.to_string())),
                }
            }
            .boxed()
        });

        Self { call, identity }
    }

    /// Invokes the underlying function
    pub fn call(&self) -> BoxFuture<'static, Result<Value, ServiceError>> {
        (self.call)()
    }

    /// Identity of this fetcher instance
    ///
    /// Unique per `Fetcher::new` call: re-creating a fetcher from the same
    /// closure yields a different identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Cache key used when a service has no explicit `cache_key`
    pub fn derived_key(&self) -> String {
        format!("fetch:{}", self.identity)
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("identity", &self.identity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_serializes_payload() {
        let fetcher = Fetcher::new(|| async { Ok::<_, String>(vec!["press-1", "press-2"]) });
        assert_eq!(fetcher.call().await, Ok(json!(["press-1", "press-2"])));
    }

    #[tokio::test]
    async fn test_call_wraps_plain_errors() {
        let fetcher = Fetcher::new(|| async { Err::<Value, _>("connection refused") });
        assert_eq!(
            fetcher.call().await,
            Err(ServiceError::Fetch("connection refused".to_string()))
        );
    }

    #[test]
    fn test_derived_keys_are_unique_per_instance() {
        let make = || Fetcher::new(|| async { Ok::<_, String>(1) });
        let a = make();
        let b = make();

        assert!(a.derived_key().starts_with("fetch:"));
        assert_ne!(a.derived_key(), b.derived_key());
        assert_eq!(a.clone().derived_key(), a.derived_key(), "clones share identity");
    }
}
