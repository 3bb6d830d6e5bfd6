//! Scrape orchestration
//!
//! Ties the pool, rate limiter and fetcher together for a single request.

pub mod orchestrator;
pub mod session;

pub use orchestrator::{OrchestratorConfig, ScrapeOrchestrator};
pub use session::ScrapeSession;
