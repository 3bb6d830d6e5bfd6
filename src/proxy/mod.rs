//! Egress proxy handling
//!
//! - Pool of proxies with round-robin selection and failure tracking
//! - Pluggable proxy sources keyed by provider
//! - Per-proxy fixed-window rate limiting
//! - Dual-scheme fetching through a selected proxy

pub mod fetch;
pub mod pool;
pub mod rate_limit;
pub mod source;

pub use fetch::{DualProtocolFetcher, FetchOptions, FetchResponse, Fetcher, ProxyTransport, ReqwestTransport};
pub use pool::{PoolConfig, PoolState, ProxyPoolManager};
pub use rate_limit::{RateLimiter, SystemClock, WindowClock};
pub use source::{FileProxySource, ProxySource, SourceRegistry};
