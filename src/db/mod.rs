//! Relational store for persistent chat state.
//!
//! Async SQLite access through SQLx for:
//! - user profiles
//! - chat session membership
//! - the append-only message history
//!
//! Repositories borrow the shared pool; `TRUNCATE`-style wipes exist for
//! test teardown only.

mod members;
mod messages;
mod users;

pub use members::SessionMemberRepository;
pub use messages::{MessageRecord, MessageRepository};
pub use users::{UserRecord, UserRepository};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("duplicate row: {0}")]
    Duplicate(String),
    #[error("row not found: {0}")]
    RowMissing(String),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking
    /// indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str, pool_size: u32) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // One pinned connection: an in-memory database lives and dies
            // with its connection, so the pool must never recycle it, and a
            // second connection would see a different database entirely.
            let options = SqliteConnectOptions::new().in_memory(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(pool_size)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "database connected");

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    pub fn members(&self) -> SessionMemberRepository<'_> {
        SessionMemberRepository::new(&self.pool)
    }

    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(&self.pool)
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL UNIQUE,
                nickname TEXT UNIQUE,
                description TEXT,
                password_hash TEXT,
                email TEXT UNIQUE,
                avatar_id TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_session_member (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                UNIQUE(session_id, user_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_csm_session ON chat_session_member(session_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                message_type INTEGER NOT NULL,
                create_time INTEGER NOT NULL,
                content TEXT,
                file_id TEXT,
                file_name TEXT,
                file_size INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_message_session ON message(session_id)")
            .execute(pool)
            .await?;

        Ok(())
    }
}

/// Map a unique-constraint violation onto `DbError::Duplicate(label)`.
pub(crate) fn map_unique_violation(e: sqlx::Error, label: &str) -> DbError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return DbError::Duplicate(label.to_string());
    }
    DbError::from(e)
}
