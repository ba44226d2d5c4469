//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use settlement::{
    CircuitBreakerConfig, INVENTORY_SERVICE, PAYMENT_SERVICE, SettlementConfig,
    StaticEndpointResolver,
};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory storage when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `PAYMENT_SERVICE_URL`: payment authority base URL
/// - `INVENTORY_SERVICE_URL`: inventory authority base URL
/// - `SETTLE_POLL_ATTEMPTS`, `SETTLE_POLL_DELAY_MS`, `SETTLE_INITIAL_DELAY_MS`
/// - `SWEEP_INTERVAL_SECS`, `REMOTE_TIMEOUT_MS`
/// - `BREAKER_FAILURE_THRESHOLD`, `BREAKER_WINDOW_SECS`, `BREAKER_COOL_DOWN_SECS`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub payment_service_url: String,
    pub inventory_service_url: String,
    pub poll_attempts: u32,
    pub poll_delay_ms: u64,
    pub initial_delay_ms: u64,
    pub sweep_interval_secs: u64,
    pub remote_timeout_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_window_secs: u64,
    pub breaker_cool_down_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values. The sweep interval, remote timeout and
    /// failure threshold also fall back when set to zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(lookup("PORT"), defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: parse_or(
                lookup("DATABASE_MAX_CONNECTIONS"),
                defaults.database_max_connections,
            ),
            payment_service_url: lookup("PAYMENT_SERVICE_URL")
                .unwrap_or(defaults.payment_service_url),
            inventory_service_url: lookup("INVENTORY_SERVICE_URL")
                .unwrap_or(defaults.inventory_service_url),
            poll_attempts: parse_or(lookup("SETTLE_POLL_ATTEMPTS"), defaults.poll_attempts),
            poll_delay_ms: parse_or(lookup("SETTLE_POLL_DELAY_MS"), defaults.poll_delay_ms),
            initial_delay_ms: parse_or(
                lookup("SETTLE_INITIAL_DELAY_MS"),
                defaults.initial_delay_ms,
            ),
            sweep_interval_secs: parse_nonzero_or(
                lookup("SWEEP_INTERVAL_SECS"),
                defaults.sweep_interval_secs,
            ),
            remote_timeout_ms: parse_nonzero_or(
                lookup("REMOTE_TIMEOUT_MS"),
                defaults.remote_timeout_ms,
            ),
            breaker_failure_threshold: parse_nonzero_or(
                lookup("BREAKER_FAILURE_THRESHOLD"),
                defaults.breaker_failure_threshold,
            ),
            breaker_window_secs: parse_or(
                lookup("BREAKER_WINDOW_SECS"),
                defaults.breaker_window_secs,
            ),
            breaker_cool_down_secs: parse_or(
                lookup("BREAKER_COOL_DOWN_SECS"),
                defaults.breaker_cool_down_secs,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settlement timings and breaker thresholds.
    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            poll_attempts: self.poll_attempts,
            poll_delay: Duration::from_millis(self.poll_delay_ms),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            remote_timeout: Duration::from_millis(self.remote_timeout_ms),
            breaker: CircuitBreakerConfig {
                failure_threshold: self.breaker_failure_threshold,
                failure_window: Duration::from_secs(self.breaker_window_secs),
                cool_down: Duration::from_secs(self.breaker_cool_down_secs),
                ..CircuitBreakerConfig::default()
            },
        }
    }

    /// Endpoint table for the remote authorities.
    pub fn resolver(&self) -> StaticEndpointResolver {
        StaticEndpointResolver::new()
            .with_endpoint(PAYMENT_SERVICE, self.payment_service_url.as_str())
            .with_endpoint(INVENTORY_SERVICE, self.inventory_service_url.as_str())
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_nonzero_or<T: FromStr + Default + PartialEq>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.parse().ok())
        .filter(|v| *v != T::default())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 5,
            payment_service_url: "http://localhost:8083".to_string(),
            inventory_service_url: "http://localhost:8082".to_string(),
            poll_attempts: 5,
            poll_delay_ms: 800,
            initial_delay_ms: 0,
            sweep_interval_secs: 30,
            remote_timeout_ms: 3000,
            breaker_failure_threshold: 5,
            breaker_window_secs: 60,
            breaker_cool_down_secs: 10,
        }
    }
}
