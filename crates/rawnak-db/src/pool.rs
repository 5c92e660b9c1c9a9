//! # Cache Database
//!
//! Opens the SQLite file behind [`CacheRepository`] and migrates it.
//!
//! ```text
//! SyncConfig [cache] backend = "sqlite", path = ...
//!      │
//!      ▼
//! Database::new(DbConfig::new(path))   WAL, create if missing, migrate
//!      │
//!      ▼
//! db.cache() ─► CacheRepository (impl LocalCache)
//!                 products_main, customers_b2, activeBranchId, ...
//! ```
//!
//! WAL lets one engine read its cache entry while another writes through.

use std::path::PathBuf;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cache::CacheRepository;

/// Connections for a cache file. Writes are one row at a time.
const FILE_POOL_SIZE: u32 = 4;

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the cache lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub database_path: PathBuf,
}

impl DbConfig {
    /// A cache file at `path`, created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
        }
    }

    /// A private in-memory cache (tests).
    pub fn in_memory() -> Self {
        DbConfig::new(IN_MEMORY_PATH)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }

    /// An in-memory database exists per connection, so it gets exactly one.
    fn pool_size(&self) -> u32 {
        if self.is_in_memory() {
            1
        } else {
            FILE_POOL_SIZE
        }
    }
}

// =============================================================================
// Database
// =============================================================================

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the cache database and applies pending migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let url = format!("sqlite://{}?mode=rwc", config.database_path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            // A lost last write only costs one stale cache entry
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size())
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        migrations::run_migrations(&pool).await?;
        info!(
            path = %config.database_path.display(),
            connections = config.pool_size(),
            "Cache database ready"
        );
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The cache repository over this database.
    pub fn cache(&self) -> CacheRepository {
        CacheRepository::new(self.pool.clone())
    }

    /// Closes the pool. Later cache calls fail.
    pub async fn close(&self) {
        info!("Closing cache database");
        self.pool.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
