//! HTTP API
//!
//! `POST /scrape` runs a scrape through the proxy pool; `GET /health` reports
//! pool and store status.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
