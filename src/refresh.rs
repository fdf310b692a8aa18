//! Background data refresh system
//!
//! Periodically refetches a mounted data service in the background, using
//! tokio channels to report each refresh cycle to the consumer.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::service::{FetchState, ServiceHandle};

/// Messages sent from background refresh to the consumer
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// Refresh started
    RefreshStarted,
    /// Refresh completed successfully with the new state
    RefreshCompleted(FetchState),
    /// The refresh cycle ended with an error
    RefreshError(String),
}

/// Configuration for the refresh interval
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between two refetches
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300), // 5 minutes
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Creates a new RefreshHandle and spawns the background refresh task
    ///
    /// The task stops on [`RefreshHandle::shutdown`], when the handle is
    /// dropped, or once the service has been unmounted.
    pub fn spawn(service: ServiceHandle, config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if !service.is_mounted() {
                                tracing::debug!("stopping refresh: key={} unmounted", service.cache_key());
                                break;
                            }

                            if msg_tx.send(RefreshMessage::RefreshStarted).await.is_err() {
                                break;
                            }

                            let state = service.refetch().await;
                            let message = match &state.error {
                                Some(e) => RefreshMessage::RefreshError(e.message()),
                                None => RefreshMessage::RefreshCompleted(state),
                            };
                            if msg_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for pending refresh messages without blocking
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::service::{DataService, DataServiceOptions, Fetcher};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_service(calls: Arc<AtomicUsize>) -> DataService {
        DataService::new(
            Fetcher::new(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, String>(json!({ "success": true, "data": n })) }
            }),
            Arc::new(CacheManager::new()),
            DataServiceOptions::default().cache_key("dashboard"),
        )
    }

    #[test]
    fn test_refresh_config_default() {
        let config = RefreshConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert!(config.enabled);
    }

    #[tokio::test]
    async fn test_refresh_handle_spawn_disabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = counting_service(calls.clone());
        let config = RefreshConfig {
            enabled: false,
            ..Default::default()
        };

        let mut handle = RefreshHandle::spawn(service.handle(), config);

        // With refresh disabled, there should be no messages
        assert!(try_recv(&mut handle).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_refetches_on_each_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = counting_service(calls.clone());
        service.mount().await;

        let mut handle = RefreshHandle::spawn(
            service.handle(),
            RefreshConfig {
                interval: Duration::from_secs(60),
                enabled: true,
            },
        );

        assert!(matches!(handle.receiver.recv().await, Some(RefreshMessage::RefreshStarted)));
        match handle.receiver.recv().await {
            Some(RefreshMessage::RefreshCompleted(state)) => assert_eq!(state.data, Some(json!(2))),
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2, "refresh bypasses the fresh cache");

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_reports_errors() {
        let service = DataService::new(
            Fetcher::new(|| async { Ok::<_, String>(json!({ "success": false, "error": { "message": "line offline" } })) }),
            Arc::new(CacheManager::new()),
            DataServiceOptions::default().cache_key("line"),
        );

        let mut handle = RefreshHandle::spawn(
            service.handle(),
            RefreshConfig {
                interval: Duration::from_secs(1),
                enabled: true,
            },
        );

        assert!(matches!(handle.receiver.recv().await, Some(RefreshMessage::RefreshStarted)));
        match handle.receiver.recv().await {
            Some(RefreshMessage::RefreshError(message)) => assert_eq!(message, "line offline"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stops_after_unmount() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = counting_service(calls.clone());
        let mut handle = RefreshHandle::spawn(
            service.handle(),
            RefreshConfig {
                interval: Duration::from_secs(1),
                enabled: true,
            },
        );

        drop(service);

        // The task notices the unmount on its next tick and closes the channel
        assert!(handle.receiver.recv().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
