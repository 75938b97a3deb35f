use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Metrics/ingest listen port
    /// Env: PORT (default: 9137)
    pub port: u16,

    /// Value of the `server` label on every series
    /// Env: SERVER_NAME (default: "srcds")
    pub server_name: String,

    /// How often the latest pushed status is applied to the metrics
    /// Env: POLL_INTERVAL_SECS (default: 15)
    pub poll_interval: Duration,

    /// How long departed players stay exposed before their series is removed
    /// Env: SWEEP_INTERVAL_SECS (default: 180)
    pub sweep_interval: Duration,

    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 262144 = 256KB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 10)
    pub request_timeout: Duration,

    /// Milliseconds between replenished requests for POST /status
    /// Env: RATE_LIMIT_STATUS_REPLENISH_MS (default: 500)
    pub rate_limit_status_replenish_ms: u64,

    /// Burst size for POST /status
    /// Env: RATE_LIMIT_STATUS_BURST (default: 5)
    pub rate_limit_status_burst: u32,

    /// Milliseconds between replenished requests for GET /metrics
    /// Env: RATE_LIMIT_GENERAL_REPLENISH_MS (default: 100)
    pub rate_limit_general_replenish_ms: u64,

    /// Burst size for GET /metrics
    /// Env: RATE_LIMIT_GENERAL_BURST (default: 20)
    pub rate_limit_general_burst: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for local runs mostly
        let defaults = Self::default();
        Self {
            port: env_or_default("PORT", defaults.port),
            server_name: env_or_default_string("SERVER_NAME", &defaults.server_name),
            poll_interval: secs_or_default("POLL_INTERVAL_SECS", defaults.poll_interval),
            sweep_interval: secs_or_default("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", defaults.request_body_limit),
            request_timeout: secs_or_default("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            rate_limit_status_replenish_ms: env_or_default(
                "RATE_LIMIT_STATUS_REPLENISH_MS",
                defaults.rate_limit_status_replenish_ms,
            ),
            rate_limit_status_burst: env_or_default(
                "RATE_LIMIT_STATUS_BURST",
                defaults.rate_limit_status_burst,
            ),
            rate_limit_general_replenish_ms: env_or_default(
                "RATE_LIMIT_GENERAL_REPLENISH_MS",
                defaults.rate_limit_general_replenish_ms,
            ),
            rate_limit_general_burst: env_or_default(
                "RATE_LIMIT_GENERAL_BURST",
                defaults.rate_limit_general_burst,
            ),
        }
    }

    pub fn rate_limit(&self) -> crate::RateLimitConfig {
        crate::RateLimitConfig {
            status_replenish_ms: self.rate_limit_status_replenish_ms,
            status_burst: self.rate_limit_status_burst,
            general_replenish_ms: self.rate_limit_general_replenish_ms,
            general_burst: self.rate_limit_general_burst,
        }
    }
}

impl Default for Config {
    /// Create configuration with all default values
    fn default() -> Self {
        Self {
            port: 9137,
            server_name: "srcds".to_string(),
            poll_interval: Duration::from_secs(15),
            sweep_interval: srcds_metrics::DEFAULT_SWEEP_INTERVAL,
            request_body_limit: 256 * 1024, // 256 KB
            request_timeout: Duration::from_secs(10),
            rate_limit_status_replenish_ms: 500,
            rate_limit_status_burst: 5,
            rate_limit_general_replenish_ms: 100,
            rate_limit_general_burst: 20,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a whole number of seconds; zero falls back to the default
fn secs_or_default(key: &str, default: Duration) -> Duration {
    match env_or_default::<u64>(key, 0) {
        0 => default,
        secs => Duration::from_secs(secs),
    }
}
