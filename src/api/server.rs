//! API server using Axum

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ServerConfig;
use crate::error::{RelayError, Result};
use crate::proxy::pool::ProxyPoolManager;
use crate::scraper::ScrapeOrchestrator;
use crate::store::Store;

use super::middleware::cors_layer;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScrapeOrchestrator>,
    pub pool: Arc<ProxyPoolManager>,
    pub store: Arc<dyn Store>,
    /// Attach debug detail to error responses
    pub diagnostics: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ScrapeOrchestrator>,
        pool: Arc<ProxyPoolManager>,
        store: Arc<dyn Store>,
        diagnostics: bool,
    ) -> Self {
        Self {
            orchestrator,
            pool,
            store,
            diagnostics,
            started_at: Instant::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        let cors = cors_layer(&self.config.cors_origins);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until the shutdown signal fires
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| RelayError::InvalidConfig(format!("Invalid API server address: {}", e)))?;

        let router = self.build_router();

        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| RelayError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
