//! Settings Storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

const CREATE_SETTINGS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed settings store implementation
///
/// Keys map to opaque string values (JSON for structured settings). The
/// store can own its own database file or share the library pool.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (or create) a settings database at the given path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid settings path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        debug!(path = ?db_path, "Opened settings store");
        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the settings table when missing
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_SETTINGS_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to create table: {}", e)))?;

        Ok(Self { pool })
    }

    /// Create an in-memory settings store (for testing)
    ///
    /// Limited to one connection: every in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::from_pool(pool).await
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to set setting: {}", e)))?;

        debug!(key, "Stored setting");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to get setting: {}", e)))?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to delete setting: {}", e)))?;

        debug!(key, "Deleted setting");
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to check key: {}", e)))?;

        Ok(row.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to list keys: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}
