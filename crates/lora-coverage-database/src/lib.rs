//! Coverage observation store for LoRa coverage mapping

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod models;
pub mod queries;

pub use queries::CoverageQueries;

use lora_coverage_core::{Config, Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{str::FromStr, time::Duration};
use tracing::debug;

// Re-export SqlitePool for convenience
pub use sqlx::SqlitePool;

const CREATE_COVERAGE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS coverage (
        gateway     TEXT    NOT NULL,
        device      TEXT    NOT NULL,
        time        TEXT    NOT NULL,
        frequency   REAL    NOT NULL,
        datarate    TEXT    NOT NULL,
        power       INTEGER,
        rssi        INTEGER NOT NULL,
        snr         REAL    NOT NULL,
        size        INTEGER NOT NULL,
        payload     TEXT    NOT NULL,
        lat         REAL,
        lon         REAL,
        create_time TEXT    DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (gateway, device, time, payload)
    )
";

const CREATE_COVERAGE_INDEX: &str = r"
    CREATE INDEX IF NOT EXISTS coverage_gateway_datarate
    ON coverage (gateway, datarate)
";

/// Database connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// The database file is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection cannot be
    /// established.
    pub async fn new(config: &Config) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database.url)
            .map_err(|e| Error::Database(format!("Invalid database URL: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Connect and make sure the schema exists
    ///
    /// # Errors
    ///
    /// Returns an error if either step fails.
    pub async fn open(config: &Config) -> Result<Self> {
        let database = Self::new(config).await?;
        database.initialize().await?;
        Ok(database)
    }

    /// Get a reference to the connection pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the coverage table and its index if missing
    ///
    /// Safe to run against a populated store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn initialize(&self) -> Result<()> {
        for statement in [CREATE_COVERAGE_TABLE, CREATE_COVERAGE_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database(format!("Schema initialization failed: {e}")))?;
        }

        debug!("Coverage schema ready");
        Ok(())
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_for(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.database.url = format!("sqlite://{}", dir.path().join("coverage.db").display());
        config
    }

    #[tokio::test]
    async fn test_database_new_invalid_url() {
        let mut config = Config::default();
        config.database.url = "invalid://url".to_string();
        config.database.connect_timeout = 1;

        let result = Database::new(&config).await;
        assert!(matches!(result, Err(Error::Database(ref msg)) if !msg.is_empty()));
    }

    #[tokio::test]
    async fn test_database_unreachable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.url = format!(
            "sqlite://{}",
            dir.path().join("missing").join("coverage.db").display()
        );
        config.database.connect_timeout = 1;

        assert!(Database::open(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(&config_for(&dir)).await.unwrap();

        database.initialize().await.unwrap();
        database.initialize().await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'coverage'")
                .fetch_all(database.pool())
                .await
                .unwrap();
        assert_eq!(tables.len(), 1);

        database.close().await;
    }

    #[tokio::test]
    async fn test_initialize_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::new(&config_for(&dir)).await.unwrap();
        database.close().await;

        let result = database.initialize().await;
        assert!(matches!(result, Err(Error::Database(ref msg)) if msg.contains("Schema initialization failed")));
    }
}
