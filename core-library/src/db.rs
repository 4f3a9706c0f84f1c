//! # Database Connection Pool Module
//!
//! SQLite pool setup for the catalog database (local songs, download records,
//! recent plays, and the key-value settings table when the desktop settings
//! store shares the pool).
//!
//! ## Features
//!
//! - **WAL Mode**: readers never block the download manager's writes
//! - **Embedded Migrations**: `migrations/` is compiled in with `sqlx::migrate!`
//! - **Health Check**: a `SELECT 1` before the pool is handed out
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("/data/musicboom.db")).await?;
//! ```
//!
//! Tests use [`create_test_pool`], an in-memory database with the schema applied.

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the database file, or `sqlite::memory:`
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum idle time for a connection before being closed
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    /// Configuration for a database file, created if missing
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        let database_url = format!("sqlite:{}", path.to_string_lossy().replace('\\', "/"));

        Self {
            database_url,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// Configuration for an in-memory database
    ///
    /// Each in-memory connection is a separate database, so the pool is
    /// pinned to a single connection that never idles out.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured pool, apply migrations and verify the connection.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        in_memory = config.is_in_memory(),
        max_connections = config.max_connections,
        "Opening catalog database"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(LibraryError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let mut pool_options = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if config.is_in_memory() {
        pool_options = pool_options.max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            LibraryError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory pool with the schema applied, for tests
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    debug!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            LibraryError::Migration(e.to_string())
        })?;

    info!("Database migrations completed");
    Ok(())
}

/// Execute a trivial query to prove the pool is usable
pub async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        LibraryError::Database(e)
    })?;

    debug!("Database health check passed");
    Ok(())
}
