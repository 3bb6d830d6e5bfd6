//! Scrape endpoint

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::debug;

use super::ApiError;
use crate::api::server::AppState;
use crate::error::RelayError;
use crate::models::{ScrapeRequest, ScrapeSuccess};

/// Fetch a page through the proxy pool
pub async fn scrape(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Json<ScrapeSuccess>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        ApiError::new(RelayError::InvalidInput(e.body_text()), state.diagnostics)
    })?;
    debug!(url = %request.url, "Scrape requested");

    let result = state
        .orchestrator
        .scrape(&request)
        .await
        .map_err(|e| ApiError::new(e, state.diagnostics))?;

    Ok(Json(result))
}
