use crate::error::{RelayError, Result};
use crate::models::ProviderType;
use crate::proxy::fetch::{FetchOptions, DEFAULT_USER_AGENT};
use crate::proxy::pool::PoolConfig;
use crate::scraper::OrchestratorConfig;
use crate::services::PoolRefreshConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API configuration
    pub server: ServerConfig,
    /// Persisted store configuration
    pub store: StoreConfig,
    /// Scrape defaults
    pub scrape: ScrapeConfig,
    /// Proxy pool configuration
    pub pool: PoolSettings,
    /// Logging configuration
    pub log: LogConfig,
    /// Deployment environment (development, production, ...)
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the API server (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis connection URL
    pub redis_url: String,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Default time budget per scrape in milliseconds
    pub timeout_ms: u64,
    /// Default per-proxy request ceiling per second
    pub rate_limit_per_second: u32,
    /// Timeout of a single proxied request in milliseconds
    pub proxy_timeout_ms: u64,
    /// Maximum fetches per scrape that may end in an error
    pub max_attempts: u32,
    pub max_redirects: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub provider: ProviderType,
    /// Proxy list file for the free provider
    pub list_path: PathBuf,
    /// Seconds between background refreshes (0 disables)
    pub refresh_interval_secs: u64,
    pub snapshot_ttl_secs: u64,
    pub failed_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let backend = match get_env_or("STORE_BACKEND", "redis").to_lowercase().as_str() {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(RelayError::InvalidConfig(format!(
                    "STORE_BACKEND must be 'redis' or 'memory', got '{}'",
                    other
                )))
            }
        };

        let redis_url = match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => {
                let port: u16 = parse_env("REDIS_PORT", "6379")?;
                format!("redis://{}:{}", get_env_or("REDIS_HOST", "localhost"), port)
            }
        };

        let provider_raw = get_env_or("PROXY_PROVIDER", "free");
        let provider = ProviderType::from_str(&provider_raw).ok_or_else(|| {
            RelayError::InvalidConfig(format!("PROXY_PROVIDER '{}' is not supported", provider_raw))
        })?;

        let timeout_ms: u64 = parse_env("SCRAPE_TIMEOUT_MS", "30000")?;
        if timeout_ms == 0 {
            return Err(RelayError::InvalidConfig(
                "SCRAPE_TIMEOUT_MS must be positive".into(),
            ));
        }

        let rate_limit_per_second: u32 = parse_env("RATE_LIMIT_PER_SECOND", "1")?;
        if !(1..=10).contains(&rate_limit_per_second) {
            return Err(RelayError::InvalidConfig(
                "RATE_LIMIT_PER_SECOND must be between 1 and 10".into(),
            ));
        }

        Ok(Config {
            server: ServerConfig {
                port: get_env_or("PORT", "3000").parse().map_err(|_| {
                    RelayError::InvalidConfig("PORT must be a valid port number".into())
                })?,
                host: get_env_or("HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            store: StoreConfig { backend, redis_url },
            scrape: ScrapeConfig {
                timeout_ms,
                rate_limit_per_second,
                proxy_timeout_ms: parse_env("PROXY_TIMEOUT_MS", "10000")?,
                max_attempts: parse_env("SCRAPE_MAX_ATTEMPTS", "100")?,
                max_redirects: parse_env("MAX_REDIRECTS", "5")?,
                user_agent: get_env_or("USER_AGENT", DEFAULT_USER_AGENT),
            },
            pool: PoolSettings {
                provider,
                list_path: PathBuf::from(get_env_or("PROXY_LIST_PATH", "data/proxies.txt")),
                refresh_interval_secs: parse_env("PROXY_REFRESH_INTERVAL_SECS", "300")?,
                snapshot_ttl_secs: parse_env("PROXY_SNAPSHOT_TTL_SECS", "86400")?,
                failed_ttl_secs: parse_env("PROXY_FAILED_TTL_SECS", "3600")?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
            environment: get_env_or("APP_ENV", "development"),
        })
    }

    /// Get the API server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Error details are exposed outside production
    pub fn diagnostics_enabled(&self) -> bool {
        !self.environment.eq_ignore_ascii_case("production")
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_millis(self.scrape.proxy_timeout_ms),
            max_redirects: self.scrape.max_redirects,
            user_agent: self.scrape.user_agent.clone(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_attempts: self.scrape.max_attempts,
            default_timeout: Duration::from_millis(self.scrape.timeout_ms),
            default_requests_per_second: self.scrape.rate_limit_per_second,
            fetch: self.fetch_options(),
            ..OrchestratorConfig::default()
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            provider: self.pool.provider,
            snapshot_ttl_secs: self.pool.snapshot_ttl_secs,
            failed_ttl_secs: self.pool.failed_ttl_secs,
        }
    }

    pub fn refresh_config(&self) -> PoolRefreshConfig {
        PoolRefreshConfig {
            interval_secs: self.pool.refresh_interval_secs,
        }
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a numeric environment variable, falling back to `default` when unset
fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| RelayError::InvalidConfig(format!("{} must be a valid number", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "CORS_ORIGINS",
        "STORE_BACKEND",
        "REDIS_URL",
        "REDIS_HOST",
        "REDIS_PORT",
        "SCRAPE_TIMEOUT_MS",
        "RATE_LIMIT_PER_SECOND",
        "PROXY_TIMEOUT_MS",
        "SCRAPE_MAX_ATTEMPTS",
        "MAX_REDIRECTS",
        "USER_AGENT",
        "PROXY_PROVIDER",
        "PROXY_LIST_PATH",
        "PROXY_REFRESH_INTERVAL_SECS",
        "PROXY_SNAPSHOT_TTL_SECS",
        "PROXY_FAILED_TTL_SECS",
        "LOG_LEVEL",
        "LOG_FORMAT",
        "APP_ENV",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.server.cors_origins.is_empty());

        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis_url, "redis://localhost:6379");

        assert_eq!(config.scrape.timeout_ms, 30000);
        assert_eq!(config.scrape.rate_limit_per_second, 1);
        assert_eq!(config.scrape.proxy_timeout_ms, 10000);
        assert_eq!(config.scrape.max_attempts, 100);
        assert_eq!(config.scrape.max_redirects, 5);
        assert_eq!(config.scrape.user_agent, DEFAULT_USER_AGENT);

        assert_eq!(config.pool.provider, ProviderType::Free);
        assert_eq!(config.pool.list_path, PathBuf::from("data/proxies.txt"));
        assert_eq!(config.pool.refresh_interval_secs, 300);

        assert_eq!(config.log.format, "json");
        assert!(config.diagnostics_enabled());
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("PORT", "8080");
        env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("REDIS_HOST", "cache.internal");
        env::set_var("REDIS_PORT", "6380");
        env::set_var("SCRAPE_TIMEOUT_MS", "5000");
        env::set_var("RATE_LIMIT_PER_SECOND", "4");
        env::set_var("PROXY_PROVIDER", "premium");
        env::set_var("APP_ENV", "production");

        let config = Config::from_env().unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.server.cors_origins,
            vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ]
        );
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.redis_url, "redis://cache.internal:6380");
        assert_eq!(config.scrape.timeout_ms, 5000);
        assert_eq!(config.scrape.rate_limit_per_second, 4);
        assert_eq!(config.pool.provider, ProviderType::Premium);
        assert!(!config.diagnostics_enabled());
    }

    #[test]
    fn test_redis_url_takes_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("REDIS_URL", "redis://:secret@redis.example:6379/2");
        env::set_var("REDIS_HOST", "ignored");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store.redis_url, "redis://:secret@redis.example:6379/2");
    }

    #[test]
    fn test_config_from_env_invalid_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        for (key, value) in [
            ("PORT", "not-a-port"),
            ("STORE_BACKEND", "postgres"),
            ("SCRAPE_TIMEOUT_MS", "0"),
            ("RATE_LIMIT_PER_SECOND", "11"),
            ("PROXY_TIMEOUT_MS", "soon"),
            ("PROXY_PROVIDER", "unknown"),
        ] {
            env::set_var(key, value);
            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, RelayError::InvalidConfig(_)),
                "{}={} should be rejected",
                key,
                value
            );
            env::remove_var(key);
        }
    }

    #[test]
    fn test_component_configs() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("SCRAPE_TIMEOUT_MS", "2500");
        env::set_var("PROXY_TIMEOUT_MS", "750");
        env::set_var("SCRAPE_MAX_ATTEMPTS", "7");
        env::set_var("PROXY_FAILED_TTL_SECS", "60");
        env::set_var("PROXY_REFRESH_INTERVAL_SECS", "0");

        let config = Config::from_env().unwrap();

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.max_attempts, 7);
        assert_eq!(orchestrator.default_timeout, Duration::from_millis(2500));
        assert_eq!(orchestrator.fetch.timeout, Duration::from_millis(750));

        assert_eq!(config.pool_config().failed_ttl_secs, 60);
        assert_eq!(config.refresh_config().interval_secs, 0);
        assert_eq!(config.server_addr(), "0.0.0.0:3000");
    }
}
