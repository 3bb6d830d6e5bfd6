//! Scrape Relay - Entry Point
//!
//! Wires the store, proxy pool, rate limiter and fetcher together and serves
//! the scrape API with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scrape_relay::api::{ApiServer, AppState};
use scrape_relay::config::{Config, LogConfig, StoreBackend, StoreConfig};
use scrape_relay::proxy::{
    DualProtocolFetcher, FileProxySource, ProxyPoolManager, RateLimiter, SourceRegistry,
};
use scrape_relay::services::{PoolRefreshHandle, PoolRefreshService};
use scrape_relay::store::{InMemoryStore, RedisStore, Store};
use scrape_relay::ScrapeOrchestrator;

#[tokio::main]
async fn main() -> scrape_relay::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!("Starting Scrape Relay ({})", config.environment);

    let store = connect_store(&config.store).await;

    // Proxy pool
    let sources =
        SourceRegistry::new().with(Arc::new(FileProxySource::new(config.pool.list_path.clone())));
    let pool = Arc::new(ProxyPoolManager::new(
        store.clone(),
        sources,
        config.pool_config(),
    ));
    match pool.initialize().await {
        Ok(count) => info!("Loaded {} proxies", count),
        Err(e) => warn!("Proxy pool starts empty: {}", e),
    }

    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        pool.clone(),
        RateLimiter::new(store.clone()),
        Arc::new(DualProtocolFetcher::new()),
        config.orchestrator_config(),
    ));

    // Start pool refresh service
    let (refresh_handle, refresh_shutdown) = PoolRefreshHandle::new();
    let refresh_service = PoolRefreshService::new(pool.clone(), config.refresh_config());
    let refresh_task = tokio::spawn(async move {
        refresh_service.run(refresh_shutdown).await;
    });

    // Create API server
    let state = AppState::new(
        orchestrator,
        pool,
        store,
        config.diagnostics_enabled(),
    );
    let api_server = ApiServer::new(config.server.clone(), state);

    let (shutdown_tx, api_shutdown) = watch::channel(false);
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started on {}", config.server_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    refresh_handle.shutdown();

    let _ = tokio::join!(api_task, refresh_task);

    info!("Scrape Relay stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("scrape_relay={},tower_http=debug", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.format.eq_ignore_ascii_case("pretty") {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

/// Connect the configured store, falling back to memory when Redis is unreachable
async fn connect_store(config: &StoreConfig) -> Arc<dyn Store> {
    if config.backend == StoreBackend::Memory {
        info!("Using in-memory store");
        return Arc::new(InMemoryStore::new());
    }

    let connected = match RedisStore::connect(&config.redis_url).await {
        Ok(store) => store.ping().await.map(|_| store),
        Err(e) => Err(e),
    };

    match connected {
        Ok(store) => {
            info!("Connected to Redis");
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                "Redis unavailable ({}), falling back to in-memory store; rate limits are not shared",
                e
            );
            Arc::new(InMemoryStore::new())
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
