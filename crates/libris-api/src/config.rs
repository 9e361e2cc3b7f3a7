//! Server configuration read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | `postgres://localhost/libris` |
//! | `HOST` / `PORT` | `0.0.0.0` / `3000` |
//! | `DB_MAX_CONNECTIONS` / `DB_MIN_CONNECTIONS` | `10` / `1` |
//! | `DB_ACQUIRE_TIMEOUT_SECS` / `DB_IDLE_TIMEOUT_SECS` | `30` / `600` |
//! | `ACCESS_TOKEN_TTL_HOURS` | `24` |
//! | `RATE_LIMIT_ENABLED` / `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_PERIOD_SECS` | `true` / `100` / `60` |
//! | `ALLOWED_ORIGINS` | `http://localhost:3000` |
//!
//! Unparseable numbers fall back to their defaults.

use std::time::Duration;

use axum::http::HeaderValue;
use tracing::warn;

use libris_core::defaults::{
    ACCESS_TOKEN_TTL_HOURS, DB_ACQUIRE_TIMEOUT_SECS, DB_IDLE_TIMEOUT_SECS, DB_MAX_CONNECTIONS,
    DB_MIN_CONNECTIONS, RATE_LIMIT_PERIOD_SECS, RATE_LIMIT_REQUESTS,
};
use libris_db::PoolConfig;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/libris";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub db_idle_timeout_secs: u64,
    pub access_token_ttl_hours: i64,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_period_secs: u64,
    pub allowed_origins: Vec<HeaderValue>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }

        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(lookup("PORT"), 3000),
            db_max_connections: parsed(lookup("DB_MAX_CONNECTIONS"), DB_MAX_CONNECTIONS),
            db_min_connections: parsed(lookup("DB_MIN_CONNECTIONS"), DB_MIN_CONNECTIONS),
            db_acquire_timeout_secs: parsed(
                lookup("DB_ACQUIRE_TIMEOUT_SECS"),
                DB_ACQUIRE_TIMEOUT_SECS,
            ),
            db_idle_timeout_secs: parsed(lookup("DB_IDLE_TIMEOUT_SECS"), DB_IDLE_TIMEOUT_SECS),
            access_token_ttl_hours: parsed(lookup("ACCESS_TOKEN_TTL_HOURS"), ACCESS_TOKEN_TTL_HOURS),
            rate_limit_enabled: lookup("RATE_LIMIT_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            rate_limit_requests: parsed(lookup("RATE_LIMIT_REQUESTS"), RATE_LIMIT_REQUESTS),
            rate_limit_period_secs: parsed(lookup("RATE_LIMIT_PERIOD_SECS"), RATE_LIMIT_PERIOD_SECS),
            allowed_origins: parse_allowed_origins(lookup("ALLOWED_ORIGINS")),
        }
    }

    /// Pool sizing for the PostgreSQL store.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.db_max_connections,
            min_connections: self.db_min_connections,
            acquire_timeout: Duration::from_secs(self.db_acquire_timeout_secs),
            idle_timeout: Duration::from_secs(self.db_idle_timeout_secs),
        }
    }
}

/// Parse the comma-separated CORS origin whitelist.
///
/// Invalid entries are skipped with a warning; an unset or blank value
/// yields the local development origin.
pub fn parse_allowed_origins(raw: Option<String>) -> Vec<HeaderValue> {
    let origins_str = raw.unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string());

    if origins_str.trim().is_empty() {
        return vec![HeaderValue::from_static(DEFAULT_ALLOWED_ORIGINS)];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.database_url, "postgres://localhost/libris");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.access_token_ttl_hours, 24);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.rate_limit_period_secs, 60);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("RATE_LIMIT_ENABLED", "false"),
            ("ACCESS_TOKEN_TTL_HOURS", "2"),
        ]);
        assert_eq!(config.port, 8080);
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.access_token_ttl_hours, 2);
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("DB_MAX_CONNECTIONS", "-1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_max_connections, 10);
    }

    #[test]
    fn test_pool_config_follows_env() {
        let config = config_from(&[
            ("DB_MAX_CONNECTIONS", "25"),
            ("DB_MIN_CONNECTIONS", "3"),
            ("DB_ACQUIRE_TIMEOUT_SECS", "5"),
            ("DB_IDLE_TIMEOUT_SECS", "120"),
        ]);
        let pool = config.pool_config();
        assert_eq!(pool.max_connections, 25);
        assert_eq!(pool.min_connections, 3);
        assert_eq!(pool.acquire_timeout, Duration::from_secs(5));
        assert_eq!(pool.idle_timeout, Duration::from_secs(120));

        assert_eq!(ServerConfig::default().pool_config(), PoolConfig::default());
    }

    #[test]
    fn test_parse_allowed_origins() {
        let origins = parse_allowed_origins(Some(
            "https://a.example, ,https://b.example".to_string(),
        ));
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);

        let blank = parse_allowed_origins(Some("   ".to_string()));
        assert_eq!(blank, vec!["http://localhost:3000"]);
    }
}
