use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
///
/// Upstream credentials given here are the static fallback; the settings
/// table may override them at client construction time.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub upstream_base_url: String,
    pub upstream_api_key: Option<String>,
    pub upstream_verify_ssl: bool,
    pub upstream_timeout: Duration,
    pub response_cache_ttl: Duration,
    pub sync_interval: Duration,
    pub sync_page_budget: u64,
    pub sync_page_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address: {0}")]
    InvalidAddr(#[from] std::net::AddrParseError),
    #[error("invalid value for {0}: {1}")]
    InvalidVar(&'static str, String),
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<u64>().map_err(|_| ConfigError::InvalidVar(name, raw)),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidVar(name, raw)),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://worksla.db?mode=rwc".to_string());

        let upstream_base_url = std::env::var("UPSTREAM_BASE_URL").unwrap_or_default();
        let upstream_api_key = std::env::var("UPSTREAM_API_KEY").ok().filter(|v| !v.is_empty());

        Ok(Self {
            listen_addr,
            database_url,
            upstream_base_url,
            upstream_api_key,
            upstream_verify_ssl: env_bool("UPSTREAM_VERIFY_SSL", true)?,
            upstream_timeout: Duration::from_secs(env_u64("UPSTREAM_TIMEOUT_SECS", 30)?),
            response_cache_ttl: Duration::from_secs(env_u64("RESPONSE_CACHE_TTL_SECS", 120)?),
            sync_interval: Duration::from_secs(env_u64("SYNC_INTERVAL_SECS", 300)?),
            sync_page_budget: env_u64("SYNC_PAGE_BUDGET", 1000)?,
            sync_page_size: env_u64("SYNC_PAGE_SIZE", 200)?,
        })
    }
}
