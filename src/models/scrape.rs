use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RelayError, Result};

/// Allowed range for a caller-supplied per-proxy rate
pub const MIN_REQUESTS_PER_SECOND: u32 = 1;
pub const MAX_REQUESTS_PER_SECOND: u32 = 10;

/// Inbound scrape request
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub url: String,
    /// Total wall-clock budget in milliseconds
    pub timeout: Option<u64>,
    /// Per-proxy request ceiling for each one-second window
    pub requests_per_second: Option<u32>,
}

/// A scrape request that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub url: Url,
    pub timeout_ms: Option<u64>,
    pub requests_per_second: Option<u32>,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = Some(rps);
        self
    }

    /// Check the request before any proxy is touched
    pub fn validate(&self) -> Result<ValidatedRequest> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(RelayError::InvalidInput("URL is required".to_string()));
        }

        let url = Url::parse(raw)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RelayError::InvalidInput(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(RelayError::InvalidInput("URL must include a host".to_string()));
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err(RelayError::InvalidInput(
                    "Timeout must be a positive number".to_string(),
                ));
            }
        }

        if let Some(rps) = self.requests_per_second {
            if !(MIN_REQUESTS_PER_SECOND..=MAX_REQUESTS_PER_SECOND).contains(&rps) {
                return Err(RelayError::InvalidInput(format!(
                    "Requests per second must be a number between {} and {}",
                    MIN_REQUESTS_PER_SECOND, MAX_REQUESTS_PER_SECOND
                )));
            }
        }

        Ok(ValidatedRequest {
            url,
            timeout_ms: self.timeout,
            requests_per_second: self.requests_per_second,
        })
    }
}

/// Successful scrape result returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeSuccess {
    pub html: String,
    pub headers: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_http_and_https() {
        assert!(ScrapeRequest::new("http://example.com").validate().is_ok());
        let validated = ScrapeRequest::new("https://example.com/a?b=c")
            .with_timeout(5000)
            .with_requests_per_second(3)
            .validate()
            .unwrap();
        assert_eq!(validated.url.as_str(), "https://example.com/a?b=c");
        assert_eq!(validated.timeout_ms, Some(5000));
        assert_eq!(validated.requests_per_second, Some(3));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        for url in ["", "   ", "not a url", "ftp://example.com/file", "example.com"] {
            let err = ScrapeRequest::new(url).validate().unwrap_err();
            assert!(matches!(err, RelayError::InvalidInput(_)), "url {:?}", url);
        }
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let err = ScrapeRequest::new("http://example.com")
            .with_timeout(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rate_bounds() {
        for rps in [0, 11, 100] {
            assert!(ScrapeRequest::new("http://example.com")
                .with_requests_per_second(rps)
                .validate()
                .is_err());
        }
        for rps in [1, 10] {
            assert!(ScrapeRequest::new("http://example.com")
                .with_requests_per_second(rps)
                .validate()
                .is_ok());
        }
    }

    #[test]
    fn test_request_uses_camel_case_fields() {
        let req: ScrapeRequest = serde_json::from_str(
            r#"{"url":"http://example.com","timeout":1000,"requestsPerSecond":2}"#,
        )
        .unwrap();
        assert_eq!(req.timeout, Some(1000));
        assert_eq!(req.requests_per_second, Some(2));
    }
}
