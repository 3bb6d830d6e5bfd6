//! Scrape Relay - page fetching through rotating proxies
//!
//! Fetches web pages through a pool of egress proxies so that no single
//! address carries the request load.
//!
//! ## Features
//!
//! - Round-robin proxy rotation with failure exclusion and automatic reset
//! - Per-proxy rate limiting shared across instances through Redis
//! - HTTP/HTTPS scheme fallback for each proxy
//! - Bounded retries under a per-request time budget
//! - Proxy list snapshot persisted across restarts
//! - Axum HTTP API with health reporting

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod scraper;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{RelayError, Result};
pub use scraper::ScrapeOrchestrator;
