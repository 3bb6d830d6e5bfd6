//! Flat-file proxy list provider

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::ProxySource;
use crate::error::Result;
use crate::models::{ProviderType, ProxyEndpoint, ProxyMetadata, ProxyScheme, Reliability};

const FREE_LIST_ORIGIN: &str = "free-proxy-list.net";

/// Parse a proxy list with one `ip:port` per line
///
/// Blank lines and `#` comments are skipped, as are lines with an invalid IPv4
/// address or port. Port 443 is assumed to speak HTTPS, everything else HTTP.
pub fn parse_proxy_list(content: &str) -> Vec<(Ipv4Addr, u16, ProxyScheme)> {
    let mut proxies = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parsed = line.split_once(':').and_then(|(ip, port)| {
            let ip = ip.trim().parse::<Ipv4Addr>().ok()?;
            let port = port.trim().parse::<u16>().ok().filter(|p| *p > 0)?;
            Some((ip, port))
        });

        match parsed {
            Some((ip, port)) => {
                let scheme = if port == 443 {
                    ProxyScheme::Https
                } else {
                    ProxyScheme::Http
                };
                proxies.push((ip, port, scheme));
            }
            None => debug!(line = lineno + 1, "Skipping malformed proxy entry"),
        }
    }

    proxies
}

/// Free provider reading `ip:port` lines from a file
///
/// Every load re-reads the file. The last good list is served when the file
/// becomes unreadable.
pub struct FileProxySource {
    path: PathBuf,
    cache: RwLock<Option<Vec<ProxyEndpoint>>>,
}

impl FileProxySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and replace the cached list
    pub async fn reload(&self) -> Result<Vec<ProxyEndpoint>> {
        let endpoints = self.read_file().await?;
        *self.cache.write().await = Some(endpoints.clone());
        Ok(endpoints)
    }

    async fn read_file(&self) -> Result<Vec<ProxyEndpoint>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to read proxy list");
            e
        })?;

        let checked_at = Utc::now();
        let endpoints: Vec<ProxyEndpoint> = parse_proxy_list(&content)
            .into_iter()
            .map(|(ip, port, scheme)| {
                ProxyEndpoint::new(ip.to_string(), port, scheme)
                    .with_provider(ProviderType::Free)
                    .with_metadata(ProxyMetadata {
                        source: FREE_LIST_ORIGIN.to_string(),
                        last_checked: Some(checked_at),
                        reliability: Reliability::Low,
                    })
            })
            .collect();

        info!(
            path = %self.path.display(),
            count = endpoints.len(),
            "Loaded free proxy list"
        );
        Ok(endpoints)
    }
}

#[async_trait]
impl ProxySource for FileProxySource {
    fn provider(&self) -> ProviderType {
        ProviderType::Free
    }

    async fn load_all(&self) -> Result<Vec<ProxyEndpoint>> {
        match self.reload().await {
            Ok(endpoints) => Ok(endpoints),
            Err(e) => match self.cache.read().await.as_ref() {
                Some(cached) if !cached.is_empty() => {
                    warn!(count = cached.len(), "Serving last good proxy list");
                    Ok(cached.clone())
                }
                _ => Err(e),
            },
        }
    }
}
