//! Proxy pool manager
//!
//! Owns the working set of egress proxies: round-robin selection, failure
//! tracking, refresh from the configured source and a snapshot persisted in
//! the store so restarts and source outages keep a usable pool.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{RelayError, Result};
use crate::models::{EndpointId, ProviderType, ProxyEndpoint};
use crate::proxy::source::SourceRegistry;
use crate::store::Store;

/// Store key of the persisted pool snapshot
pub const SNAPSHOT_KEY: &str = "proxies:active";
/// Store key prefix of per-proxy failure markers
pub const FAILED_KEY_PREFIX: &str = "proxies:failed";

fn failed_key(id: &EndpointId) -> String {
    format!("{}:{}:{}", FAILED_KEY_PREFIX, id.address, id.port)
}

/// Pool manager configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Provider the pool pulls from
    pub provider: ProviderType,
    /// Lifetime of the persisted snapshot
    pub snapshot_ttl_secs: u64,
    /// Lifetime of a persisted failure marker
    pub failed_ttl_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::Free,
            snapshot_ttl_secs: 24 * 60 * 60,
            failed_ttl_secs: 60 * 60,
        }
    }
}

/// Observable pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No entries loaded
    Empty,
    /// At least one entry is selectable
    Loaded,
    /// Every entry is marked failed; the next selection resets the failed set
    Degraded,
}

impl PoolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolState::Empty => "empty",
            PoolState::Loaded => "loaded",
            PoolState::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FailureMarker {
    proxy: ProxyEndpoint,
    failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: Vec<Arc<ProxyEndpoint>>,
    cursor: usize,
    failed: HashSet<EndpointId>,
}

impl PoolInner {
    fn replace(&mut self, endpoints: Vec<ProxyEndpoint>) {
        let ids: HashSet<EndpointId> = endpoints.iter().map(ProxyEndpoint::id).collect();
        self.failed.retain(|id| ids.contains(id));
        self.entries = endpoints.into_iter().map(Arc::new).collect();
        // The list size may have changed
        self.cursor = 0;
    }

    /// Next non-failed entry at or after the cursor, advancing the cursor past it
    fn select(&mut self) -> Option<Arc<ProxyEndpoint>> {
        let len = self.entries.len();
        for offset in 0..len {
            let idx = (self.cursor + offset) % len;
            let candidate = &self.entries[idx];
            if !self.failed.contains(&candidate.id()) {
                self.cursor = (idx + 1) % len;
                return Some(candidate.clone());
            }
        }
        None
    }

    fn available(&self) -> Vec<Arc<ProxyEndpoint>> {
        self.entries
            .iter()
            .filter(|p| !self.failed.contains(&p.id()))
            .cloned()
            .collect()
    }

    fn state(&self) -> PoolState {
        if self.entries.is_empty() {
            PoolState::Empty
        } else if self.entries.iter().all(|p| self.failed.contains(&p.id())) {
            PoolState::Degraded
        } else {
            PoolState::Loaded
        }
    }
}

/// Shared pool of egress proxies
///
/// Entries, cursor and failed set sit behind one mutex so selection and failure
/// marking are serialized. Store I/O never happens while the lock is held, and
/// store failures are logged and absorbed.
pub struct ProxyPoolManager {
    inner: Mutex<PoolInner>,
    store: Arc<dyn Store>,
    sources: SourceRegistry,
    config: PoolConfig,
}

impl ProxyPoolManager {
    pub fn new(store: Arc<dyn Store>, sources: SourceRegistry, config: PoolConfig) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            store,
            sources,
            config,
        }
    }

    /// Load the persisted snapshot, or pull from the source when there is none
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub async fn initialize(&self) -> Result<usize> {
        let cached = self.load_snapshot().await;
        if cached.is_empty() {
            info!("No cached proxy snapshot, loading from provider");
            return self.refresh().await;
        }

        let count = cached.len();
        self.inner.lock().replace(cached);
        self.restore_failures().await;
        info!(count, "Loaded proxies from cache");
        Ok(count)
    }

    /// Next non-failed proxy in round-robin order
    ///
    /// When every entry is marked failed the failed set is cleared and selection
    /// runs again. Only an empty entry set (after a refresh attempt) yields
    /// `PoolExhausted`.
    pub async fn next(&self) -> Result<Arc<ProxyEndpoint>> {
        if self.is_empty() {
            self.refresh().await?;
        }

        let (selected, cleared) = {
            let mut inner = self.inner.lock();
            if inner.entries.is_empty() {
                return Err(RelayError::PoolExhausted);
            }

            match inner.select() {
                Some(proxy) => (proxy, None),
                None => {
                    let cleared: Vec<EndpointId> = inner.failed.drain().collect();
                    let proxy = inner.select().ok_or(RelayError::PoolExhausted)?;
                    (proxy, Some(cleared))
                }
            }
        };

        if let Some(cleared) = cleared {
            warn!(
                count = cleared.len(),
                "All proxies marked as failed, resetting failed list"
            );
            self.clear_failure_markers(&cleared).await;
        }

        debug!(proxy = %selected, "Selected proxy");
        Ok(selected)
    }

    /// Exclude a proxy from selection until the failed set is reset
    pub async fn mark_failed(&self, endpoint: &ProxyEndpoint) {
        let id = endpoint.id();
        let newly_failed = self.inner.lock().failed.insert(id.clone());
        if newly_failed {
            info!(proxy = %id, "Marked proxy as failed");
        }

        let marker = FailureMarker {
            proxy: endpoint.clone(),
            failed_at: Utc::now(),
        };
        let persisted = match serde_json::to_string(&marker) {
            Ok(value) => {
                self.store
                    .set_with_expiry(&failed_key(&id), &value, self.config.failed_ttl_secs)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = persisted {
            warn!(proxy = %id, error = %e, "Failed to persist proxy failure");
        }
    }

    /// Re-pull the source and replace the working set
    ///
    /// On source failure the current entries are kept, or the persisted snapshot
    /// when memory is empty. Fails only when nothing is available anywhere.
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub async fn refresh(&self) -> Result<usize> {
        let loaded = match self.sources.get(self.config.provider) {
            Ok(source) => source.load_all().await,
            Err(e) => Err(e),
        };

        match loaded {
            Ok(endpoints) if !endpoints.is_empty() => {
                let count = endpoints.len();
                self.persist_snapshot(&endpoints).await;
                self.inner.lock().replace(endpoints);
                self.restore_failures().await;
                info!(count, "Refreshed proxies from provider");
                Ok(count)
            }
            Ok(_) => {
                warn!("Proxy provider returned no proxies");
                self.fall_back_to_cache().await
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh proxies from provider");
                self.fall_back_to_cache().await
            }
        }
    }

    /// Entries not currently marked failed
    pub fn available(&self) -> Vec<Arc<ProxyEndpoint>> {
        self.inner.lock().available()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn failed_count(&self) -> usize {
        self.inner.lock().failed.len()
    }

    pub fn state(&self) -> PoolState {
        self.inner.lock().state()
    }

    pub fn provider(&self) -> ProviderType {
        self.config.provider
    }

    async fn fall_back_to_cache(&self) -> Result<usize> {
        let current = self.len();
        if current > 0 {
            info!(count = current, "Keeping current proxy list");
            return Ok(current);
        }

        let cached = self.load_snapshot().await;
        if cached.is_empty() {
            return Err(RelayError::PoolExhausted);
        }

        let count = cached.len();
        self.inner.lock().replace(cached);
        self.restore_failures().await;
        info!(count, "Loaded proxies from cache after provider failure");
        Ok(count)
    }

    async fn load_snapshot(&self) -> Vec<ProxyEndpoint> {
        match self.store.get(SNAPSHOT_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable proxy snapshot");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load proxy snapshot");
                Vec::new()
            }
        }
    }

    async fn persist_snapshot(&self, endpoints: &[ProxyEndpoint]) {
        let result = match serde_json::to_string(endpoints) {
            Ok(raw) => {
                self.store
                    .set_with_expiry(SNAPSHOT_KEY, &raw, self.config.snapshot_ttl_secs)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist proxy snapshot");
        }
    }

    /// Re-apply failure markers that survived in the store
    async fn restore_failures(&self) {
        let ids: Vec<EndpointId> = self.inner.lock().entries.iter().map(|p| p.id()).collect();
        let lookups = ids.iter().map(|id| {
            let key = failed_key(id);
            async move { self.store.get(&key).await }
        });
        let results = join_all(lookups).await;

        let mut restored = Vec::new();
        let mut errors = 0usize;
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(Some(_)) => restored.push(id),
                Ok(None) => {}
                Err(_) => errors += 1,
            }
        }

        if errors > 0 {
            warn!(errors, "Failed to read some proxy failure markers");
        }
        if !restored.is_empty() {
            debug!(count = restored.len(), "Restored proxy failure markers");
            self.inner.lock().failed.extend(restored);
        }
    }

    async fn clear_failure_markers(&self, ids: &[EndpointId]) {
        let deletions = ids.iter().map(|id| {
            let key = failed_key(id);
            async move { self.store.delete(&key).await }
        });
        let errors = join_all(deletions)
            .await
            .into_iter()
            .filter(|r| r.is_err())
            .count();
        if errors > 0 {
            warn!(errors, "Failed to clear some proxy failure markers");
        }
    }
}
