//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL
//!
//! The session manager only depends on `get_by_username`; the rest backs
//! sign-up and the profile endpoints.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{NewUser, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, password_hash, email, name, surname, birthdate, \
                            phone_number, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Check whether a username is taken
    async fn exists(&self, username: &str) -> Result<bool>;

    /// Check whether an email is registered
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Update profile fields and the password hash of an existing user
    async fn update(&self, user: &User) -> Result<User>;

    /// Delete a user. Owned sessions go with it.
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get user by ID")?;
                row.map(|row| row_to_user_sqlite(&row)).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get user by ID")?;
                row.map(|row| row_to_user_mysql(&row)).transpose()
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(username)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get user by username")?;
                row.map(|row| row_to_user_sqlite(&row)).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(username)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get user by username")?;
                row.map(|row| row_to_user_mysql(&row)).transpose()
            }
        }
    }

    async fn exists(&self, username: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM users WHERE username = ?";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => count_sqlite(pool, sql, username).await,
            Backend::Mysql(pool) => count_mysql(pool, sql, username).await,
        }
        .context("Failed to check username")?;

        Ok(count > 0)
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM users WHERE email = ?";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => count_sqlite(pool, sql, email).await,
            Backend::Mysql(pool) => count_mysql(pool, sql, email).await,
        }
        .context("Failed to check email")?;

        Ok(count > 0)
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => update_user_sqlite(pool, user).await?,
            Backend::Mysql(pool) => update_user_mysql(pool, user).await?,
        }

        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM users WHERE id = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql).bind(id).execute(pool).await.map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql).bind(id).execute(pool).await.map(|_| ()),
        }
        .context("Failed to delete user")?;

        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &NewUser) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, email, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.email)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(new_user_record(result.last_insert_rowid(), user, now))
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = ?, email = ?, name = ?, surname = ?, birthdate = ?,
            phone_number = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.password_hash)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.surname)
    .bind(user.birthdate)
    .bind(&user.phone_number)
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    Ok(())
}

async fn count_sqlite(pool: &SqlitePool, sql: &str, value: &str) -> Result<i64> {
    let row = sqlx::query(sql).bind(value).fetch_one(pool).await?;
    Ok(row.try_get("count")?)
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        surname: row.try_get("surname")?,
        birthdate: row.try_get("birthdate")?,
        phone_number: row.try_get("phone_number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &NewUser) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, email, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.email)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(new_user_record(result.last_insert_id() as i64, user, now))
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = ?, email = ?, name = ?, surname = ?, birthdate = ?,
            phone_number = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.password_hash)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.surname)
    .bind(user.birthdate)
    .bind(&user.phone_number)
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    Ok(())
}

async fn count_mysql(pool: &MySqlPool, sql: &str, value: &str) -> Result<i64> {
    let row = sqlx::query(sql).bind(value).fetch_one(pool).await?;
    Ok(row.try_get("count")?)
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        surname: row.try_get("surname")?,
        birthdate: row.try_get("birthdate")?,
        phone_number: row.try_get("phone_number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn new_user_record(id: i64, user: &NewUser, now: chrono::DateTime<Utc>) -> User {
    User {
        id,
        username: user.username.clone(),
        password_hash: user.password_hash.clone(),
        email: user.email.clone(),
        name: String::new(),
        surname: String::new(),
        birthdate: None,
        phone_number: String::new(),
        created_at: now,
        updated_at: now,
    }
}
