//! Per-request scrape bookkeeping

use std::time::Duration;

use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::error::RelayError;

const EXHAUSTED_MESSAGE: &str = "All proxies exhausted";

/// State carried through one scrape request
#[derive(Debug)]
pub struct ScrapeSession {
    pub request_id: Uuid,
    pub target: Url,
    pub started: Instant,
    pub deadline: Instant,
    /// Fetches that raised an error; counted against the attempt limit
    pub attempts: u32,
    /// Fetches issued, whatever their outcome
    pub fetches: u32,
    pub skipped: u32,
    pub last_error: Option<String>,
}

impl ScrapeSession {
    pub fn new(target: Url, budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            request_id: Uuid::new_v4(),
            target,
            started,
            deadline: started + budget,
            attempts: 0,
            fetches: 0,
            skipped: 0,
            last_error: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Terminal error once the loop gives up
    pub fn into_failure(self) -> RelayError {
        RelayError::ScrapeFailed {
            message: self
                .last_error
                .unwrap_or_else(|| EXHAUSTED_MESSAGE.to_string()),
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_deadline() {
        let session = ScrapeSession::new(target(), Duration::from_millis(50));
        assert!(!session.is_expired());
        assert_eq!(session.remaining(), Duration::from_millis(50));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(session.is_expired());
        assert_eq!(session.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_failure_without_attempts_reports_exhaustion() {
        let session = ScrapeSession::new(target(), Duration::from_secs(1));
        match session.into_failure() {
            RelayError::ScrapeFailed { message, attempts } => {
                assert_eq!(message, "All proxies exhausted");
                assert_eq!(attempts, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_failure_carries_last_error() {
        let mut session = ScrapeSession::new(target(), Duration::from_secs(1));
        session.attempts = 2;
        session.record_failure("first");
        session.record_failure("HTTP 404: Not Found");

        let err = session.into_failure();
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
        assert!(matches!(err, RelayError::ScrapeFailed { attempts: 2, .. }));
    }
}
