//! Database layer
//!
//! This module provides database abstraction for the user service.
//! It supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for shared deployments)
//!
//! The database driver is selected based on configuration.
//!
//! # Usage
//!
//! ```ignore
//! use usergate::config::DatabaseConfig;
//! use usergate::db::{create_pool_with_retry, migrations};
//!
//! let pool = create_pool_with_retry(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_pool_with_retry, create_test_pool, Backend, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};
