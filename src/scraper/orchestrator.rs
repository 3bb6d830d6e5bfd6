//! Retry and timeout orchestration for scrape requests

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::session::ScrapeSession;
use crate::error::{RelayError, Result};
use crate::models::{ScrapeRequest, ScrapeSuccess};
use crate::proxy::fetch::{FetchOptions, Fetcher};
use crate::proxy::pool::ProxyPoolManager;
use crate::proxy::rate_limit::RateLimiter;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(30);

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum fetches that may end in an error per request
    pub max_attempts: u32,
    /// Budget used when the request has no timeout
    pub default_timeout: Duration,
    /// Per-proxy ceiling used when the request has none
    pub default_requests_per_second: u32,
    pub fetch: FetchOptions,
    /// Pause after a full pool rotation of rate-limited proxies
    pub rate_limit_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_timeout: DEFAULT_SCRAPE_TIMEOUT,
            default_requests_per_second: 1,
            fetch: FetchOptions::default(),
            rate_limit_backoff: Duration::from_millis(100),
        }
    }
}

/// Drives a scrape across the proxy pool until success, timeout or exhaustion
pub struct ScrapeOrchestrator {
    pool: Arc<ProxyPoolManager>,
    limiter: RateLimiter,
    fetcher: Arc<dyn Fetcher>,
    config: OrchestratorConfig,
}

impl ScrapeOrchestrator {
    pub fn new(
        pool: Arc<ProxyPoolManager>,
        limiter: RateLimiter,
        fetcher: Arc<dyn Fetcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pool,
            limiter,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Fetch `request.url` through the pool
    ///
    /// Invalid input fails immediately. Otherwise proxies are tried in pool order
    /// until one returns a 2xx/3xx status, the time budget runs out or
    /// `max_attempts` fetches have failed with an error. Error statuses move on
    /// to the next proxy without using up an attempt.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeSuccess> {
        let validated = request.validate()?;
        let budget = validated
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_timeout);
        let ceiling = validated
            .requests_per_second
            .unwrap_or(self.config.default_requests_per_second);

        let session = ScrapeSession::new(validated.url, budget);
        self.run(session, ceiling).await
    }

    #[instrument(
        name = "scrape",
        skip_all,
        fields(request_id = %session.request_id, url = %session.target)
    )]
    async fn run(&self, mut session: ScrapeSession, ceiling: u32) -> Result<ScrapeSuccess> {
        let max_attempts = self.config.max_attempts;
        let mut consecutive_skips = 0usize;

        while session.attempts < max_attempts && !session.is_expired() {
            let proxy = match self.pool.next().await {
                Ok(proxy) => proxy,
                Err(e) => {
                    session.attempts += 1;
                    warn!(error = %e, "No proxy available, aborting scrape");
                    break;
                }
            };

            if !self.limiter.check(&proxy, ceiling).await
                || !self.limiter.admit(&proxy, ceiling).await
            {
                let skip = RelayError::RateLimited {
                    proxy: proxy.id().to_string(),
                };
                debug!(reason = %skip, "Skipping proxy");
                session.skipped += 1;
                consecutive_skips += 1;

                if consecutive_skips >= self.pool.available().len().max(1) {
                    let pause = self.config.rate_limit_backoff.min(session.remaining());
                    debug!(pause_ms = pause.as_millis() as u64, "Every proxy is rate limited, backing off");
                    tokio::time::sleep(pause).await;
                    consecutive_skips = 0;
                }
                continue;
            }
            consecutive_skips = 0;

            session.fetches += 1;
            debug!(
                "Fetching through proxy {} (fetch {}, {}/{} failed attempts)",
                proxy, session.fetches, session.attempts, max_attempts
            );

            match self
                .fetcher
                .fetch(&session.target, &proxy, &self.config.fetch)
                .await
            {
                Ok(response) if response.is_success() => {
                    info!(
                        proxy = %proxy,
                        status = response.status,
                        protocol = %response.protocol_used,
                        fetches = session.fetches,
                        elapsed_ms = session.elapsed().as_millis() as u64,
                        "Scrape succeeded"
                    );
                    return Ok(ScrapeSuccess {
                        html: response.body,
                        headers: response.headers,
                    });
                }
                Ok(response) => {
                    let message = format!("HTTP {}: {}", response.status, response.status_text);
                    warn!("Proxy {} returned {}", proxy, message);
                    session.record_failure(message);
                    self.pool.mark_failed(&proxy).await;
                }
                Err(e) => {
                    session.attempts += 1;
                    warn!(
                        "Fetch through {} failed: {} (attempt {}/{})",
                        proxy, e, session.attempts, max_attempts
                    );
                    session.record_failure(e.to_string());
                    self.pool.mark_failed(&proxy).await;
                }
            }
        }

        warn!(
            attempts = session.attempts,
            fetches = session.fetches,
            skipped = session.skipped,
            elapsed_ms = session.elapsed().as_millis() as u64,
            timed_out = session.is_expired(),
            "Scrape failed"
        );
        Err(session.into_failure())
    }
}
