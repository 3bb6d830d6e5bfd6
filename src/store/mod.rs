//! Persisted key-value store with expiry
//!
//! Backs the proxy pool snapshot, failure markers and rate-limit counters.
//! Callers treat every store error as recoverable: the pool falls back to its
//! in-memory state and the rate limiter fails open.

mod memory;
mod redis_backend;

pub use memory::InMemoryStore;
pub use redis_backend::RedisStore;

use async_trait::async_trait;

use crate::error::Result;

/// Key-value store with per-key expiry
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a value, `None` if the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value that expires after `ttl_secs` seconds (0 = no expiry)
    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment the integer counter at `key` if it is below `ceiling`
    ///
    /// A missing key starts at zero and is created with a `ttl_secs` expiry.
    /// Returns the incremented count, or `None` without touching the counter when
    /// it has already reached `ceiling`. This is a single round trip.
    async fn atomic_increment_with_expiry(
        &self,
        key: &str,
        ceiling: u64,
        ttl_secs: u64,
    ) -> Result<Option<u64>>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}
