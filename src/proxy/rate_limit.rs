//! Per-proxy rate limiting
//!
//! Fixed one-second windows counted in the shared store. Counters reset hard at
//! the window boundary, so a proxy may see up to twice its ceiling across two
//! adjacent windows. Any store failure fails open.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::models::ProxyEndpoint;
use crate::store::Store;

const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit";

/// Source of the current Unix time in whole seconds
pub trait WindowClock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WindowClock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Rate limiter for egress proxies
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn Store>,
    clock: Arc<dyn WindowClock>,
    /// Window length in seconds
    window_secs: u64,
}

impl RateLimiter {
    /// Create a rate limiter with one-second windows on the system clock
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn WindowClock>) -> Self {
        Self {
            store,
            clock,
            window_secs: 1,
        }
    }

    /// Use windows of `secs` seconds instead of one
    pub fn with_window_secs(mut self, secs: u64) -> Self {
        self.window_secs = secs.max(1);
        self
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Whether `endpoint` is still below `ceiling` in the current window
    ///
    /// Read-only. Returns `true` if the store cannot be read.
    pub async fn check(&self, endpoint: &ProxyEndpoint, ceiling: u32) -> bool {
        let key = self.window_key(endpoint);

        let count = match self.store.get(&key).await {
            Ok(Some(raw)) => match raw.parse::<u64>() {
                Ok(count) => count,
                Err(_) => {
                    warn!(key = %key, value = %raw, "Unreadable rate limit counter, allowing request");
                    return true;
                }
            },
            Ok(None) => 0,
            Err(e) => {
                warn!(proxy = %endpoint.id(), error = %e, "Rate limit check failed, allowing request");
                return true;
            }
        };

        if count >= u64::from(ceiling) {
            debug!(
                proxy = %endpoint.id(),
                count,
                ceiling,
                "Rate limit reached"
            );
            return false;
        }
        true
    }

    /// Take one slot in the current window for `endpoint`
    ///
    /// Returns `false`, leaving the counter untouched, when the window is full.
    /// Returns `true` if the store cannot be reached.
    pub async fn admit(&self, endpoint: &ProxyEndpoint, ceiling: u32) -> bool {
        let key = self.window_key(endpoint);

        match self
            .store
            .atomic_increment_with_expiry(&key, u64::from(ceiling), self.window_secs + 1)
            .await
        {
            Ok(Some(count)) => {
                debug!(proxy = %endpoint.id(), count, ceiling, "Rate limit slot taken");
                true
            }
            Ok(None) => {
                debug!(proxy = %endpoint.id(), ceiling, "Rate limit reached on admission");
                false
            }
            Err(e) => {
                warn!(proxy = %endpoint.id(), error = %e, "Rate limit admission failed, allowing request");
                true
            }
        }
    }

    fn window_key(&self, endpoint: &ProxyEndpoint) -> String {
        let now = self.clock.now_secs();
        let window_start = now - now % self.window_secs;
        format!(
            "{}:{}:{}:{}",
            RATE_LIMIT_KEY_PREFIX, endpoint.address, endpoint.port, window_start
        )
    }
}
