//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::api::server::AppState;
use crate::proxy::pool::PoolState;

/// Health check endpoint
///
/// Always 200; `status` is "degraded" when the pool is empty or the store is
/// unreachable.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_reachable = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Store health check failed: {}", e);
            false
        }
    };
    let pool_state = state.pool.state();
    let status = if store_reachable && pool_state != PoolState::Empty {
        "healthy"
    } else {
        "degraded"
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "service": "scrape-relay",
            "proxies": state.pool.len(),
            "failed": state.pool.failed_count(),
            "pool_state": pool_state.as_str(),
            "store": state.store.backend_name(),
            "store_reachable": store_reachable,
            "uptime_secs": state.started_at.elapsed().as_secs(),
        })),
    )
}
