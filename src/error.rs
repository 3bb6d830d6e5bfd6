use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Unified error type for the scrape relay
#[derive(Error, Debug)]
pub enum RelayError {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Pool errors
    #[error("No proxies available")]
    PoolExhausted,

    #[error("Proxy provider '{0}' not registered")]
    UnknownProvider(String),

    #[error("Rate limit reached for proxy {proxy}")]
    RateLimited { proxy: String },

    // Fetch errors
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("{message}")]
    ScrapeFailed { message: String, attempts: u32 },

    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RelayError::InvalidInput(_) | RelayError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            RelayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway
            RelayError::Fetch(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            RelayError::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            RelayError::ScrapeFailed { .. }
            | RelayError::UnknownProvider(_)
            | RelayError::Store(_)
            | RelayError::Io(_)
            | RelayError::Serialization(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Build the JSON error body, optionally with the debug representation attached
    pub fn to_body(&self, diagnostics: bool) -> serde_json::Value {
        if diagnostics {
            json!({
                "error": self.to_string(),
                "detail": format!("{:?}", self),
            })
        } else {
            json!({
                "error": self.to_string(),
            })
        }
    }
}

// Convert from redis errors
impl From<redis::RedisError> for RelayError {
    fn from(err: redis::RedisError) -> Self {
        RelayError::Store(err.to_string())
    }
}

// Convert from reqwest errors
impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout
        } else {
            RelayError::Fetch(err.to_string())
        }
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for RelayError {
    fn from(err: url::ParseError) -> Self {
        RelayError::InvalidInput(format!("Invalid URL format: {}", err))
    }
}
