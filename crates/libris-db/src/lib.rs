//! # libris-db
//!
//! PostgreSQL database layer for libris.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for every `libris-core` storage trait
//! - Embedded schema migrations (behind the `migrations` feature)
//!
//! Unique-constraint violations are surfaced as `Error::Conflict` so that
//! concurrent creators of the same library name or membership pair see the
//! same outcome as a sequential duplicate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use libris_db::{Database, LibraryRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/libris").await?;
//!     let libraries = db.libraries.list_by_owner(1).await?;
//!     println!("{} libraries", libraries.len());
//!     Ok(())
//! }
//! ```

pub mod books;
pub mod libraries;
pub mod pool;
pub mod reading_records;
pub mod tags;
pub mod users;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use async_trait::async_trait;

// Re-export core types
pub use libris_core::*;

pub use books::PgBookRepository;
pub use libraries::PgLibraryRepository;
pub use pool::{log_pool_metrics, PoolConfig};
pub use reading_records::PgReadingRecordRepository;
pub use tags::PgTagRepository;
pub use users::{PgTokenRepository, PgUserRepository};

/// Map a write failure, turning constraint violations into domain errors.
///
/// Unique and check violations become `Conflict(message)`, foreign key
/// violations become `NotFound`.
pub(crate) fn map_write_err(err: sqlx::Error, message: impl FnOnce() -> String) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() || db_err.is_check_violation() {
            return Error::Conflict(message());
        }
        if db_err.is_foreign_key_violation() {
            return Error::NotFound(format!(
                "Referenced row does not exist ({})",
                db_err.constraint().unwrap_or("foreign key")
            ));
        }
    }
    Error::Database(err)
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Media libraries and their membership items.
    pub libraries: PgLibraryRepository,
    pub books: PgBookRepository,
    /// Key/value tags shared by books and libraries.
    pub tags: PgTagRepository,
    pub users: PgUserRepository,
    /// Bearer access tokens.
    pub tokens: PgTokenRepository,
    pub reading_records: PgReadingRecordRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            libraries: PgLibraryRepository::new(pool.clone()),
            books: PgBookRepository::new(pool.clone()),
            tags: PgTagRepository::new(pool.clone()),
            users: PgUserRepository::new(pool.clone()),
            tokens: PgTokenRepository::new(pool.clone()),
            reading_records: PgReadingRecordRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool sizing.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Connect with explicit pool sizing.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = config.connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

#[async_trait]
impl StoreHealth for Database {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        log_pool_metrics(&self.pool);
        Ok(())
    }
}
