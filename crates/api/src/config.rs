//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::CurrencyCode;
use saga::CheckoutConfig;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:8000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL for orders and owner locks; in-memory when unset
/// - `REDIS_URL`: Redis for carts; in-memory when unset
/// - `CATALOG_SERVICE_URL`, `EXCHANGE_SERVICE_URL`, `PAYMENT_SERVICE_URL`
/// - `SETTLEMENT_CURRENCY` (default `EUR`), `PAYMENT_CURRENCY` (default `USD`)
/// - `CHECKOUT_LOCK_TIMEOUT_MS` (default 5000), `REMOTE_TIMEOUT_MS` (default 10000)
///
/// Values that fail to parse fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub catalog_url: String,
    pub exchange_url: String,
    pub payment_url: String,
    pub settlement_currency: CurrencyCode,
    pub payment_currency: CurrencyCode,
    pub lock_timeout: Duration,
    pub remote_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let millis = |name: &str, default: Duration| {
            var(name)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: var("LOG_FORMAT")
                .and_then(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            catalog_url: var("CATALOG_SERVICE_URL").unwrap_or(defaults.catalog_url),
            exchange_url: var("EXCHANGE_SERVICE_URL").unwrap_or(defaults.exchange_url),
            payment_url: var("PAYMENT_SERVICE_URL").unwrap_or(defaults.payment_url),
            settlement_currency: var("SETTLEMENT_CURRENCY")
                .map(CurrencyCode::new)
                .unwrap_or(defaults.settlement_currency),
            payment_currency: var("PAYMENT_CURRENCY")
                .map(CurrencyCode::new)
                .unwrap_or(defaults.payment_currency),
            lock_timeout: millis("CHECKOUT_LOCK_TIMEOUT_MS", defaults.lock_timeout),
            remote_timeout: millis("REMOTE_TIMEOUT_MS", defaults.remote_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the orchestrator's part of the configuration.
    pub fn checkout_config(&self) -> CheckoutConfig {
        CheckoutConfig {
            settlement_currency: self.settlement_currency.clone(),
            payment_currency: self.payment_currency.clone(),
            lock_timeout: self.lock_timeout,
            remote_timeout: self.remote_timeout,
            ..CheckoutConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let checkout = CheckoutConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            redis_url: None,
            catalog_url: "http://localhost:8001".to_string(),
            exchange_url: "http://localhost:8002".to_string(),
            payment_url: "http://localhost:8003".to_string(),
            settlement_currency: checkout.settlement_currency,
            payment_currency: checkout.payment_currency,
            lock_timeout: checkout.lock_timeout,
            remote_timeout: checkout.remote_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.addr(), "0.0.0.0:8000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.catalog_url, "http://localhost:8001");
        assert_eq!(config.settlement_currency.as_str(), "EUR");
        assert_eq!(config.payment_currency.as_str(), "USD");
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/checkout"),
            ("PAYMENT_CURRENCY", "gbp"),
            ("CHECKOUT_LOCK_TIMEOUT_MS", "250"),
        ]);

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/checkout")
        );
        assert_eq!(config.payment_currency.as_str(), "GBP");

        let checkout = config.checkout_config();
        assert_eq!(checkout.lock_timeout, Duration::from_millis(250));
        assert_eq!(checkout.payment_currency.as_str(), "GBP");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "eighty"),
            ("LOG_FORMAT", "xml"),
            ("REMOTE_TIMEOUT_MS", "-1"),
            ("REDIS_URL", "   "),
        ]);

        assert_eq!(config.port, 8000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert!(config.redis_url.is_none());
    }
}
