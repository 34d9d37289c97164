//! User profile repository.

use super::{DbError, map_unique_violation};
use sqlx::{QueryBuilder, SqlitePool};

/// One row of the `users` table.
///
/// `nickname`, `email` and `password_hash` are nullable: email-registered
/// users start without a password, nickname-registered users without an
/// email.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub user_id: String,
    pub nickname: Option<String>,
    pub description: Option<String>,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub avatar_id: Option<String>,
}

impl UserRecord {
    /// A nickname/password registration.
    pub fn with_password(user_id: &str, nickname: &str, password_hash: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            nickname: Some(nickname.to_string()),
            password_hash: Some(password_hash.to_string()),
            ..Default::default()
        }
    }

    /// An email registration; gets the default nickname.
    pub fn with_email(user_id: &str, email: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: Some(email.to_string()),
            nickname: Some(format!("BreezeChatUser_{user_id}")),
            ..Default::default()
        }
    }

    pub fn nickname(&self) -> &str {
        self.nickname.as_deref().unwrap_or("")
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or("")
    }

    pub fn avatar_id(&self) -> &str {
        self.avatar_id.as_deref().unwrap_or("")
    }
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new profile. Unique violations (user_id, nickname, email)
    /// surface as [`DbError::Duplicate`].
    pub async fn insert(&self, user: &UserRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, nickname, description, password_hash, email, avatar_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.nickname)
        .bind(&user.description)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.avatar_id)
        .execute(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &user.user_id))?;
        Ok(())
    }

    /// Overwrite the mutable profile fields of `user.user_id`.
    pub async fn update(&self, user: &UserRecord) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET nickname = ?, description = ?, password_hash = ?, email = ?, avatar_id = ?
            WHERE user_id = ?
            "#,
        )
        .bind(&user.nickname)
        .bind(&user.description)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.avatar_id)
        .bind(&user.user_id)
        .execute(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &user.user_id))?;

        if result.rows_affected() == 0 {
            return Err(DbError::RowMissing(user.user_id.clone()));
        }
        Ok(())
    }

    pub async fn remove(&self, user_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn by_user_id(&self, user_id: &str) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    pub async fn by_nickname(&self, nickname: &str) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE nickname = ?")
            .bind(nickname)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    pub async fn by_email(&self, email: &str) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// IN-list lookup. Returns only the rows that exist, in no particular
    /// order; the caller decides whether missing ids are an error.
    pub async fn by_user_ids(&self, user_ids: &[String]) -> Result<Vec<UserRecord>, DbError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder = QueryBuilder::new("SELECT * FROM users WHERE user_id IN (");
        let mut separated = builder.separated(", ");
        for id in user_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        let rows = builder
            .build_query_as::<UserRecord>()
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Test teardown only.
    pub async fn truncate(&self) -> Result<(), DbError> {
        sqlx::query("DELETE FROM users").execute(self.pool).await?;
        Ok(())
    }
}
