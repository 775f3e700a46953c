//! Session repository
//!
//! Durable storage for sessions. This is the session store behind the
//! session manager and the expiry sweeper.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! Expiry is not interpreted here: `get_by_token` returns expired rows too and
//! leaves the decision to the caller. Only `delete_expired` looks at time.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Issue a session with a fresh token expiring at `now + ttl`
    async fn create(&self, user_id: i64, username: &str, ttl: Duration) -> Result<Session>;

    /// Exact-match lookup; `None` when no row carries this token
    async fn get_by_token(&self, token: &str) -> Result<Option<Session>>;

    /// Delete one session. Deleting an unknown token is not an error.
    async fn delete_by_token(&self, token: &str) -> Result<()>;

    /// Delete every session owned by `username`
    async fn delete_all_for_user(&self, username: &str) -> Result<u64>;

    /// Delete every session with `expires_at < now` in a single statement
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Generate an unguessable session token.
///
/// UUIDv4 carries 122 random bits drawn from the operating system CSPRNG.
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, user_id: i64, username: &str, ttl: Duration) -> Result<Session> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .with_context(|| format!("Session lifetime out of range: {}", ttl))?;
        let session = Session {
            id: 0,
            user_id,
            username: username.to_string(),
            token: generate_token(),
            expires_at,
            created_at: now,
        };

        let id = match self.pool.backend()? {
            Backend::Sqlite(pool) => insert_session_sqlite(pool, &session).await?,
            Backend::Mysql(pool) => insert_session_mysql(pool, &session).await?,
        };

        Ok(Session { id, ..session })
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_session_by_token_sqlite(pool, token).await,
            Backend::Mysql(pool) => get_session_by_token_mysql(pool, token).await,
        }
    }

    async fn delete_by_token(&self, token: &str) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE token = ?";
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql).bind(token).execute(pool).await.map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql).bind(token).execute(pool).await.map(|_| ()),
        }
        .context("Failed to delete session")?;

        Ok(())
    }

    async fn delete_all_for_user(&self, username: &str) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE username = ?";
        let deleted = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(username)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(username)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete sessions by user")?;

        Ok(deleted)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let deleted = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete expired sessions")?;

        Ok(deleted)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sessions (user_id, username, token, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.user_id)
    .bind(&session.username)
    .bind(&session.token)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(result.last_insert_rowid())
}

async fn get_session_by_token_sqlite(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, username, token, expires_at, created_at
        FROM sessions
        WHERE token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by token")?;

    row.map(|row| row_to_session_sqlite(&row)).transpose()
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_session_mysql(pool: &MySqlPool, session: &Session) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sessions (user_id, username, token, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.user_id)
    .bind(&session.username)
    .bind(&session.token)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(result.last_insert_id() as i64)
}

async fn get_session_by_token_mysql(pool: &MySqlPool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, username, token, expires_at, created_at
        FROM sessions
        WHERE token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by token")?;

    row.map(|row| row_to_session_mysql(&row)).transpose()
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}
