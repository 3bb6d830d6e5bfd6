//! In-process store backend

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::Store;
use crate::error::{RelayError, Result};

/// Purge expired keys once every this many writes
const PURGE_EVERY: u64 = 1024;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

fn deadline(now: Instant, ttl_secs: u64) -> Option<Instant> {
    (ttl_secs > 0).then(|| now + Duration::from_secs(ttl_secs))
}

fn parse_counter(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| RelayError::Store(format!("value at '{}' is not an integer", key)))
}

/// Store kept in a concurrent map
///
/// Atomicity of the conditional increment comes from the map's per-shard entry
/// lock. Expired keys are dropped lazily on read and swept periodically on write.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, StoredValue>,
    writes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Purged expired store keys");
        }
    }

    fn after_write(&self) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|v| (v.is_expired(now), v.value.clone()));

        match found {
            Some((false, value)) => Ok(Some(value)),
            Some((true, _)) => {
                self.entries.remove_if(key, |_, v| v.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let now = Instant::now();
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: deadline(now, ttl_secs),
            },
        );
        self.after_write();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, v)| !v.is_expired(now))
            .unwrap_or(false))
    }

    async fn atomic_increment_with_expiry(
        &self,
        key: &str,
        ceiling: u64,
        ttl_secs: u64,
    ) -> Result<Option<u64>> {
        let now = Instant::now();

        let outcome = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_expired(now) {
                    0
                } else {
                    parse_counter(key, &occupied.get().value)?
                };

                if current >= ceiling {
                    None
                } else {
                    let expires_at = if current == 0 {
                        deadline(now, ttl_secs)
                    } else {
                        occupied.get().expires_at
                    };
                    occupied.insert(StoredValue {
                        value: (current + 1).to_string(),
                        expires_at,
                    });
                    Some(current + 1)
                }
            }
            Entry::Vacant(vacant) => {
                if ceiling == 0 {
                    None
                } else {
                    vacant.insert(StoredValue {
                        value: "1".to_string(),
                        expires_at: deadline(now, ttl_secs),
                    });
                    Some(1)
                }
            }
        };

        if outcome.is_some() {
            self.after_write();
        }
        Ok(outcome)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
