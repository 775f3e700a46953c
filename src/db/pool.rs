//! Database connection pool abstraction
//!
//! This module provides a unified interface for database operations that works
//! with both SQLite and MySQL backends. The appropriate pool is created based
//! on the configuration. Pools are bounded and recycle connections after
//! `max_lifetime`; one pool is shared by request handlers and the session sweeper.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// Shared handle over whichever backend the configuration selected.
///
/// Backends only expose their concrete pool; statements that do not depend
/// on the dialect are provided here once.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Database driver type
    fn driver(&self) -> DatabaseDriver;

    /// Underlying SQLite pool, if any
    fn as_sqlite(&self) -> Option<&SqlitePool>;

    /// Underlying MySQL pool, if any
    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Close the connection pool, waiting for checked-out connections
    async fn close(&self);

    /// Borrow the concrete pool for driver-specific queries
    fn backend(&self) -> Result<Backend<'_>> {
        if let Some(pool) = self.as_sqlite() {
            return Ok(Backend::Sqlite(pool));
        }
        if let Some(pool) = self.as_mysql() {
            return Ok(Backend::Mysql(pool));
        }
        Err(anyhow::anyhow!("Database pool exposes no supported backend"))
    }

    /// Run a statement that returns no rows; yields rows affected
    async fn execute(&self, statement: &str) -> Result<u64> {
        let affected = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query(statement)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(statement)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        };
        affected.with_context(|| format!("Failed to execute statement: {}", statement))
    }

    /// Round-trip a trivial query to prove a connection can be used
    async fn ping(&self) -> Result<()> {
        let result = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            Backend::Mysql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        };
        result.context("Database ping failed")
    }
}

/// Concrete pool behind a `DatabasePool`
pub enum Backend<'a> {
    Sqlite(&'a SqlitePool),
    Mysql(&'a MySqlPool),
}

/// SQLite backend; the default single-file deployment
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open the database file (created with its parent directories if
    /// missing) or an in-memory database for `:memory:`
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_str();
        let in_memory = url == ":memory:" || url.starts_with("sqlite::memory:");

        if !in_memory {
            let path = url.trim_start_matches("sqlite:");
            let path = path.split('?').next().unwrap_or(path);

            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
                }
            }
        }

        let connection_url = if in_memory {
            "sqlite::memory:".to_string()
        } else if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite:{}", url)
        };

        // Foreign keys are a per-connection pragma; sessions rely on them for
        // ON DELETE CASCADE, so every pooled connection must have them on.
        let options = SqliteConnectOptions::from_str(&connection_url)
            .with_context(|| format!("Invalid SQLite URL: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .max_lifetime(config.max_lifetime())
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// MySQL backend for shared deployments
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_str();
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .max_lifetime(config.max_lifetime())
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to MySQL database: {}", url))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Type alias for a shared database pool
pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Connect the backend named by `config.driver`
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::new(config).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::new(config).await?),
    };
    Ok(pool)
}

/// Create a pool, retrying with exponential backoff (2s, 4s, 8s, ...).
///
/// Used at startup where the database container may still be booting.
/// Gives up after `config.connect_retries` attempts.
pub async fn create_pool_with_retry(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let attempts = config.connect_retries.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        tracing::info!(
            "Attempting to connect to database (attempt {}/{})...",
            attempt + 1,
            attempts
        );

        match create_pool(config).await {
            Ok(pool) => match pool.ping().await {
                Ok(()) => return Ok(pool),
                Err(e) => last_error = Some(e),
            },
            Err(e) => last_error = Some(e),
        }

        if let Some(ref e) = last_error {
            tracing::warn!("Failed to connect to database: {:#}", e);
        }

        if attempt + 1 < attempts {
            let delay = retry_delay(attempt);
            tracing::info!("Retrying in {:?}...", delay);
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("no connection attempts made"))
        .context(format!("Could not connect to the database after {} attempts", attempts)))
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64 << attempt.min(16))
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
        ..DatabaseConfig::default()
    };
    create_pool(&config).await
}
