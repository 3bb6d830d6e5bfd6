//! API request handlers

pub mod health;
pub mod scrape;

use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::RelayError;

/// Error response that honours the diagnostics setting
#[derive(Debug)]
pub struct ApiError {
    error: RelayError,
    diagnostics: bool,
}

impl ApiError {
    pub fn new(error: RelayError, diagnostics: bool) -> Self {
        Self { error, diagnostics }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        (status, Json(self.error.to_body(self.diagnostics))).into_response()
    }
}
