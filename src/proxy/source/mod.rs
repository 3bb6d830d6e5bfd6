//! Proxy sources
//!
//! A source supplies the candidate endpoints for the pool. Sources are
//! registered by provider type so new providers plug in without touching
//! selection logic.

mod file;

pub use file::{parse_proxy_list, FileProxySource};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RelayError, Result};
use crate::models::{ProviderType, ProxyEndpoint};

/// Supplier of egress proxy endpoints
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Provider this source serves
    fn provider(&self) -> ProviderType;

    /// Load every endpoint the provider currently offers
    async fn load_all(&self) -> Result<Vec<ProxyEndpoint>>;
}

/// Registry of sources keyed by provider type
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<ProviderType, Arc<dyn ProxySource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own provider type, replacing any previous one
    pub fn register(&mut self, source: Arc<dyn ProxySource>) {
        self.sources.insert(source.provider(), source);
    }

    pub fn with(mut self, source: Arc<dyn ProxySource>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, provider: ProviderType) -> Result<Arc<dyn ProxySource>> {
        self.sources
            .get(&provider)
            .cloned()
            .ok_or_else(|| RelayError::UnknownProvider(provider.to_string()))
    }

    pub fn providers(&self) -> Vec<ProviderType> {
        self.sources.keys().copied().collect()
    }
}
