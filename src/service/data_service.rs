//! Data service: one fetch function bound to `{data, loading, error}` state
//!
//! A `DataService` is owned by a single consumer. It runs load cycles against a
//! shared [`CacheManager`], publishes every state change over a
//! `tokio::sync::watch` channel and drops results from load cycles that were
//! superseded or that finish after the consumer unmounted.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::envelope::unwrap_response;
use super::{DataServiceOptions, Dependencies, FetchState, Fetcher};
use crate::cache::{CacheManager, PendingFetch};
use crate::error::ServiceError;

/// Cache key used when neither an explicit key nor a fetcher is available
const MISSING_FETCHER_KEY: &str = "fetch:<none>";

/// Builder for [`DataService`]
#[derive(Debug)]
pub struct DataServiceBuilder {
    cache: Arc<CacheManager>,
    fetcher: Option<Fetcher>,
    options: DataServiceOptions,
    dependencies: Dependencies,
}

impl DataServiceBuilder {
    /// Sets the fetch function the service loads through
    pub fn fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets caching behavior and the cache key
    pub fn options(mut self, options: DataServiceOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the initial dependency list
    pub fn dependencies(mut self, dependencies: impl Into<Dependencies>) -> Self {
        self.dependencies = dependencies.into();
        self
    }

    /// Builds the service, resolving its cache key
    ///
    /// The key is the explicit `cache_key` option if set, otherwise one derived
    /// from the fetcher. No load cycle runs until [`DataService::mount`].
    pub fn build(self) -> DataService {
        let cache_key = match (&self.options.cache_key, &self.fetcher) {
            (Some(key), _) => key.clone(),
            (None, Some(fetcher)) => fetcher.derived_key(),
            (None, None) => MISSING_FETCHER_KEY.to_string(),
        };
        let (state, _) = watch::channel(FetchState::default());

        DataService {
            inner: Arc::new(Inner {
                fetcher: self.fetcher,
                cache: self.cache,
                options: self.options,
                cache_key,
                state,
                generation: AtomicU64::new(0),
                mounted: AtomicBool::new(true),
                dependencies: Mutex::new(self.dependencies),
            }),
        }
    }
}

/// Fetch/cache state machine for one consumer
///
/// Dropping the service unmounts it; load cycles still running at that point
/// finish without touching the state.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use mes_data::cache::CacheManager;
/// use mes_data::service::{DataService, DataServiceOptions, Fetcher};
///
/// # async fn demo() {
/// let cache = Arc::new(CacheManager::new());
/// let service = DataService::builder(cache)
///     .fetcher(Fetcher::new(|| async { Ok::<_, String>(vec!["press-1"]) }))
///     .options(DataServiceOptions::default().cache_key("work-centers"))
///     .build();
///
/// let state = service.mount().await;
/// assert!(state.is_success());
/// # }
/// ```
#[derive(Debug)]
pub struct DataService {
    inner: Arc<Inner>,
}

impl DataService {
    /// Starts building a service on top of a shared cache
    pub fn builder(cache: Arc<CacheManager>) -> DataServiceBuilder {
        DataServiceBuilder {
            cache,
            fetcher: None,
            options: DataServiceOptions::default(),
            dependencies: Dependencies::default(),
        }
    }

    /// Shorthand for a builder with a fetcher and options
    pub fn new(fetcher: Fetcher, cache: Arc<CacheManager>, options: DataServiceOptions) -> Self {
        Self::builder(cache).fetcher(fetcher).options(options).build()
    }

    /// Runs the first load cycle
    pub async fn mount(&self) -> FetchState {
        self.inner.load(Trigger::Mount).await
    }

    /// Replaces the dependency list, running a load cycle if it changed
    ///
    /// Returns `None` when the new list equals the current one. A fresh cache
    /// entry is still used, but a fetch this key has in flight is never joined;
    /// a new one replaces it. The cache key is not affected: services whose
    /// data depends on these values should fold them into an explicit
    /// `cache_key`.
    pub async fn update_dependencies(
        &self,
        dependencies: impl Into<Dependencies>,
    ) -> Option<FetchState> {
        let dependencies = dependencies.into();
        {
            let mut current = self.inner.dependencies.lock().await;
            if *current == dependencies {
                return None;
            }
            *current = dependencies;
        }
        Some(self.inner.load(Trigger::Dependencies).await)
    }

    /// Current dependency list
    pub async fn dependencies(&self) -> Dependencies {
        self.inner.dependencies.lock().await.clone()
    }

    /// Drops this service's cache entry and fetches again, bypassing the cache
    pub async fn refetch(&self) -> FetchState {
        self.inner.refetch().await
    }

    /// Drops this service's cache entry without reloading
    pub fn clear_cache(&self) {
        self.inner.cache.clear(Some(&self.inner.cache_key));
    }

    /// Current `{data, loading, error}` state
    pub fn snapshot(&self) -> FetchState {
        self.inner.snapshot()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.inner.state.subscribe()
    }

    /// Current payload deserialized into `T`
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.inner
            .state
            .borrow()
            .data
            .clone()
            .map(serde_json::from_value)
            .transpose()
    }

    /// Key this service reads and writes in the shared cache
    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }

    pub fn options(&self) -> &DataServiceOptions {
        &self.inner.options
    }

    /// Whether state updates are still applied
    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    /// Stops all further state updates
    pub fn unmount(&self) {
        if self.inner.mounted.swap(false, Ordering::SeqCst) {
            tracing::debug!("data service unmounted: key={}", self.inner.cache_key);
        }
    }

    /// Cloneable handle for background tasks
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for DataService {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Handle to a mounted data service
///
/// Unlike [`DataService`], dropping a handle does not unmount anything.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    inner: Arc<Inner>,
}

impl ServiceHandle {
    /// Same as [`DataService::refetch`]
    pub async fn refetch(&self) -> FetchState {
        self.inner.refetch().await
    }

    /// Runs `refetch` on the tokio runtime
    pub fn spawn_refetch(&self) -> JoinHandle<FetchState> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.refetch().await })
    }

    pub fn snapshot(&self) -> FetchState {
        self.inner.snapshot()
    }

    /// False once the owning service was unmounted or dropped
    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    pub fn cache_key(&self) -> &str {
        &self.inner.cache_key
    }
}

/// What started a load cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// First load; may join a fetch already in flight for the key
    Mount,
    /// Dependency change; reads the cache but starts its own fetch
    Dependencies,
    /// Forced reload; skips the cache entirely
    Refetch,
}

/// Unregisters an in-flight fetch when its awaiting load cycle ends
///
/// Runs on completion and when the load future is dropped early, so a
/// cancelled fetch is never joined later.
struct PendingRegistration<'a> {
    cache: &'a CacheManager,
    key: &'a str,
    fetch: PendingFetch<Value>,
}

impl Drop for PendingRegistration<'_> {
    fn drop(&mut self) {
        self.cache.finish_pending(self.key, &self.fetch);
    }
}

#[derive(Debug)]
struct Inner {
    fetcher: Option<Fetcher>,
    cache: Arc<CacheManager>,
    options: DataServiceOptions,
    cache_key: String,
    state: watch::Sender<FetchState>,
    /// Id of the most recent load cycle
    generation: AtomicU64,
    mounted: AtomicBool,
    dependencies: Mutex<Dependencies>,
}

impl Inner {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> FetchState {
        self.state.borrow().clone()
    }

    async fn refetch(&self) -> FetchState {
        self.cache.clear(Some(&self.cache_key));
        self.load(Trigger::Refetch).await
    }

    /// One load cycle: cache lookup, then fetch, then commit
    async fn load(&self, trigger: Trigger) -> FetchState {
        let Some(generation) = self.begin_cycle() else {
            return self.snapshot();
        };

        if self.options.use_cache && trigger != Trigger::Refetch {
            if let Some(data) = self.cache.get(&self.cache_key) {
                tracing::debug!("cache hit: key={}", self.cache_key);
                self.commit(generation, Ok(data));
                return self.snapshot();
            }
            tracing::debug!("cache miss: key={}", self.cache_key);
        }

        let outcome = self.fetch(trigger != Trigger::Mount).await;
        if let Err(e) = &outcome {
            tracing::warn!("load cycle failed: key={} error={}", self.cache_key, e);
        }
        self.commit(generation, outcome);
        self.snapshot()
    }

    fn begin_cycle(&self) -> Option<u64> {
        if !self.is_mounted() {
            return None;
        }

        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.loading = true;
            state.error = None;
        });
        Some(generation)
    }

    fn commit(&self, generation: u64, outcome: Result<Value, ServiceError>) {
        let applied = self.state.send_if_modified(|state| {
            if !self.is_mounted() || self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match outcome {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                }
                Err(e) => {
                    state.data = None;
                    state.error = Some(e);
                }
            }
            state.loading = false;
            true
        });

        if !applied {
            tracing::debug!(
                "discarding superseded load cycle: key={} generation={}",
                self.cache_key,
                generation
            );
        }
    }

    /// Fetches through the in-flight registry, joining unless `replace` is set
    async fn fetch(&self, replace: bool) -> Result<Value, ServiceError> {
        let Some(fetcher) = self.fetcher.clone() else {
            return Err(ServiceError::FetcherMissing);
        };

        if !self.options.use_cache {
            return invoke(fetcher).await;
        }

        let cache = Arc::clone(&self.cache);
        let key = self.cache_key.clone();
        let ttl = self.options.cache_ttl;
        let pending = self.cache.pending_or_start(&self.cache_key, replace, move |ticket| {
            async move {
                let data = invoke(fetcher).await?;
                if !cache.store_pending(&key, ticket, data.clone(), ttl) {
                    tracing::debug!("skipping cache write of replaced fetch: key={}", key);
                }
                Ok(data)
            }
            .boxed()
        });

        let _registration = PendingRegistration {
            cache: &self.cache,
            key: &self.cache_key,
            fetch: pending.clone(),
        };
        pending.await
    }
}

/// Calls the fetcher and unwraps its response, turning panics into errors
async fn invoke(fetcher: Fetcher) -> Result<Value, ServiceError> {
    let outcome = AssertUnwindSafe(async move {
        let response = fetcher.call().await?;
        unwrap_response(response)
    })
    .catch_unwind()
    .await;

    match outcome {
        Ok(result) => result,
        Err(panic) => {
            let err = ServiceError::from_panic(panic);
            tracing::warn!("fetch function panicked: {}", err);
            Err(err)
        }
    }
}
