//! Database migrations module
//!
//! Code-based migrations embedded directly as SQL strings, supporting both
//! SQLite and MySQL so the service ships as a single binary.
//!
//! Applied versions are recorded in a `_migrations` ledger table.
//!
//! The sessions table references users with `ON DELETE CASCADE`, so deleting a
//! user removes every session it owns without application code.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;

use super::pool::Backend;
use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, increasing version number
    pub version: i64,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                email VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL DEFAULT '',
                surname VARCHAR(100) NOT NULL DEFAULT '',
                birthdate DATE,
                phone_number VARCHAR(20) NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                email VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL DEFAULT '',
                surname VARCHAR(100) NOT NULL DEFAULT '',
                birthdate DATE NULL,
                phone_number VARCHAR(20) NOT NULL DEFAULT '',
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
            );
            CREATE INDEX idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username VARCHAR(50) NOT NULL,
                token VARCHAR(100) NOT NULL UNIQUE,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_username ON sessions(username);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_id BIGINT NOT NULL,
                username VARCHAR(50) NOT NULL,
                token VARCHAR(100) NOT NULL UNIQUE,
                expires_at DATETIME(6) NOT NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_username ON sessions(username);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
];

/// Apply every migration not yet recorded in `_migrations`, in order.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    ensure_ledger(pool).await?;
    let applied = applied_versions(pool).await?;

    let mut count = 0;
    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        tracing::info!(version = migration.version, name = migration.name, "Applying migration");
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("Schema is up to date");
    }

    Ok(count)
}

async fn ensure_ledger(pool: &DynDatabasePool) -> Result<()> {
    let applied_at = match pool.driver() {
        DatabaseDriver::Sqlite => "TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
        DatabaseDriver::Mysql => "DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)",
    };
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS _migrations (\
            version INT PRIMARY KEY, \
            name VARCHAR(255) NOT NULL UNIQUE, \
            applied_at {})",
        applied_at
    );

    pool.execute(&sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<HashSet<i64>> {
    let sql = "SELECT version FROM _migrations";
    let versions: Vec<i64> = match pool.backend()? {
        Backend::Sqlite(pool) => sqlx::query_scalar(sql).fetch_all(pool).await?,
        Backend::Mysql(pool) => sqlx::query_scalar::<_, i32>(sql)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(i64::from)
            .collect(),
    };
    Ok(versions.into_iter().collect())
}

/// Run the migration's statements, then record it in the ledger.
///
/// Statements run one by one; MySQL commits DDL implicitly, so a partially
/// applied migration is not rolled back on either backend.
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let script = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(script) {
        pool.execute(statement).await?;
    }

    let record = "INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)";
    match pool.backend()? {
        Backend::Sqlite(pool) => sqlx::query(record)
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now())
            .execute(pool)
            .await
            .map(|_| ()),
        Backend::Mysql(pool) => sqlx::query(record)
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now())
            .execute(pool)
            .await
            .map(|_| ()),
    }
    .context("Failed to record migration")
}

/// Split a script on `;`, dropping blank and comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| {
            stmt.lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_session_token_is_unique() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let sqlite_pool = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO users (username, password_hash, email) VALUES (?, ?, ?)")
            .bind("dave")
            .bind("hash")
            .bind("dave@example.com")
            .execute(sqlite_pool)
            .await
            .expect("Failed to create user");

        let insert = "INSERT INTO sessions (user_id, username, token, expires_at) VALUES (1, 'dave', 'same-token', ?)";
        sqlx::query(insert)
            .bind(Utc::now())
            .execute(sqlite_pool)
            .await
            .expect("First insert should succeed");

        let duplicate = sqlx::query(insert).bind(Utc::now()).execute(sqlite_pool).await;
        assert!(duplicate.is_err(), "Duplicate token must be rejected");
    }

    #[tokio::test]
    async fn test_session_requires_existing_user() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let result = sqlx::query(
            "INSERT INTO sessions (user_id, username, token, expires_at) VALUES (42, 'ghost', 't', ?)",
        )
        .bind(Utc::now())
        .execute(pool.as_sqlite().unwrap())
        .await;

        assert!(result.is_err(), "Foreign key should reject orphan sessions");
    }

    #[test]
    fn test_versions_are_unique_and_increasing() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn test_split_sql_statements_skips_blanks() {
        let sql = "CREATE TABLE a (id INT);\n  \n-- comment only\n;CREATE INDEX i ON a(id);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }
}
