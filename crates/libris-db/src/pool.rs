//! PostgreSQL pool sizing and health logging.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use libris_core::defaults::{
    DB_ACQUIRE_TIMEOUT_SECS, DB_IDLE_TIMEOUT_SECS, DB_MAX_CONNECTIONS, DB_MIN_CONNECTIONS,
};
use libris_core::{Error, Result};

/// How many connections the store may hold and how long it waits on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            min_connections: DB_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DB_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// sqlx options for this config. A zero ceiling is raised to one and the
    /// floor never exceeds the ceiling.
    pub fn options(&self) -> PgPoolOptions {
        let max = self.max_connections.max(1);
        PgPoolOptions::new()
            .max_connections(max)
            .min_connections(self.min_connections.min(max))
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
    }

    /// Open a pool against `database_url`.
    pub async fn connect(&self, database_url: &str) -> Result<PgPool> {
        let start = Instant::now();
        let pool = self
            .options()
            .connect(database_url)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "pool",
            op = "connect",
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            acquire_timeout_secs = self.acquire_timeout.as_secs(),
            open = pool.size(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Store pool ready"
        );
        Ok(pool)
    }
}

/// Log open and idle connection counts. Warns when every open connection
/// is checked out, which is where acquire timeouts start.
pub fn log_pool_metrics(pool: &PgPool) {
    let open = pool.size();
    let idle = pool.num_idle() as u32;
    let in_use = open.saturating_sub(idle);

    debug!(
        subsystem = "database",
        component = "pool",
        op = "ping",
        open,
        idle,
        in_use,
        "Store pool status"
    );

    if open > 0 && idle == 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            op = "ping",
            open,
            in_use,
            "Store pool saturated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_options_carry_config() {
        let config = PoolConfig {
            max_connections: 4,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(90),
        };
        let options = config.options();
        assert_eq!(options.get_max_connections(), 4);
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(5));
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_options_keep_floor_under_ceiling() {
        let config = PoolConfig {
            max_connections: 0,
            min_connections: 8,
            ..PoolConfig::default()
        };
        let options = config.options();
        assert_eq!(options.get_max_connections(), 1);
        assert_eq!(options.get_min_connections(), 1);
    }
}
