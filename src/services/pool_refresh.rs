//! Periodic proxy pool refresh

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::proxy::pool::ProxyPoolManager;

/// Pool refresh service configuration
#[derive(Debug, Clone)]
pub struct PoolRefreshConfig {
    /// Seconds between refreshes; 0 disables the service
    pub interval_secs: u64,
}

impl Default for PoolRefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300, // 5 minutes
        }
    }
}

/// Re-pulls the proxy source on a fixed interval
pub struct PoolRefreshService {
    pool: Arc<ProxyPoolManager>,
    config: PoolRefreshConfig,
}

impl PoolRefreshService {
    pub fn new(pool: Arc<ProxyPoolManager>, config: PoolRefreshConfig) -> Self {
        Self { pool, config }
    }

    /// Run until the shutdown signal flips to `true`
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.config.interval_secs == 0 {
            info!("Proxy pool refresh disabled");
            return;
        }

        info!(
            "Starting proxy pool refresh service (every {}s)",
            self.config.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.pool.refresh().await {
                        Ok(count) => debug!(count, "Scheduled proxy refresh complete"),
                        Err(e) => warn!("Scheduled proxy refresh failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Proxy pool refresh service shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle for stopping the pool refresh service
pub struct PoolRefreshHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl PoolRefreshHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for PoolRefreshHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::{ProviderType, ProxyEndpoint, ProxyScheme};
    use crate::proxy::pool::PoolConfig;
    use crate::proxy::source::{ProxySource, SourceRegistry};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProxySource for CountingSource {
        fn provider(&self) -> ProviderType {
            ProviderType::Free
        }

        async fn load_all(&self) -> Result<Vec<ProxyEndpoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ProxyEndpoint::new("10.0.0.1", 8080, ProxyScheme::Http)])
        }
    }

    fn pool(source: Arc<CountingSource>) -> Arc<ProxyPoolManager> {
        Arc::new(ProxyPoolManager::new(
            Arc::new(InMemoryStore::new()),
            SourceRegistry::new().with(source),
            PoolConfig::default(),
        ))
    }

    #[test]
    fn test_config_default() {
        assert_eq!(PoolRefreshConfig::default().interval_secs, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_on_interval_until_shutdown() {
        let source = Arc::new(CountingSource::default());
        let service = PoolRefreshService::new(
            pool(source.clone()),
            PoolRefreshConfig { interval_secs: 60 },
        );
        let (handle, rx) = PoolRefreshHandle::new();
        let task = tokio::spawn(async move { service.run(rx).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_disables_service() {
        let source = Arc::new(CountingSource::default());
        let service = PoolRefreshService::new(
            pool(source.clone()),
            PoolRefreshConfig { interval_secs: 0 },
        );
        let (_handle, rx) = PoolRefreshHandle::new();

        service.run(rx).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
