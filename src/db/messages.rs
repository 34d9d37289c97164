//! Message history repository.
//!
//! Rows are append-only from the storage consumer's perspective; the
//! `message_id` unique index is what makes broker redelivery harmless.

use super::{DbError, map_unique_violation};
use sqlx::SqlitePool;

/// One row of the `message` table. Exactly one payload column group is set,
/// according to `message_type`: `content` for text, `file_*` otherwise.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct MessageRecord {
    pub id: i64,
    pub message_id: String,
    pub user_id: String,
    pub session_id: String,
    pub message_type: i64,
    /// Seconds since the epoch.
    pub create_time: i64,
    pub content: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message. A duplicate `message_id` surfaces as
    /// [`DbError::Duplicate`] so redelivered envelopes insert at most once.
    pub async fn insert(&self, msg: &MessageRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO message
                (message_id, user_id, session_id, message_type, create_time,
                 content, file_id, file_name, file_size)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&msg.message_id)
        .bind(&msg.user_id)
        .bind(&msg.session_id)
        .bind(msg.message_type)
        .bind(msg.create_time)
        .bind(&msg.content)
        .bind(&msg.file_id)
        .bind(&msg.file_name)
        .bind(msg.file_size)
        .execute(self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &msg.message_id))?;
        Ok(())
    }

    /// The latest `count` messages of a session, oldest first.
    pub async fn recent(&self, session_id: &str, count: i64) -> Result<Vec<MessageRecord>, DbError> {
        let mut rows = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT * FROM message
            WHERE session_id = ?
            ORDER BY create_time DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(count)
        .fetch_all(self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Like [`Self::recent`], but only considering messages at or before
    /// `before`.
    pub async fn recent_before(
        &self,
        session_id: &str,
        count: i64,
        before: i64,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let mut rows = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT * FROM message
            WHERE session_id = ? AND create_time <= ?
            ORDER BY create_time DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(before)
        .bind(count)
        .fetch_all(self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Messages of a session with `create_time` in `[start, end]`, oldest
    /// first.
    pub async fn range(
        &self,
        session_id: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT * FROM message
            WHERE session_id = ? AND create_time >= ? AND create_time <= ?
            ORDER BY create_time ASC, id ASC
            "#,
        )
        .bind(session_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Bulk delete by session.
    pub async fn purge_session(&self, session_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM message WHERE session_id = ?")
            .bind(session_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Test teardown only.
    pub async fn truncate(&self) -> Result<(), DbError> {
        sqlx::query("DELETE FROM message").execute(self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    fn text_row(message_id: &str, session_id: &str, create_time: i64, content: &str) -> MessageRecord {
        MessageRecord {
            message_id: message_id.to_string(),
            user_id: "u1".to_string(),
            session_id: session_id.to_string(),
            message_type: 0,
            create_time,
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn message_id_is_unique() {
        let db = Database::new(":memory:", 2).await.unwrap();
        let messages = db.messages();

        messages.insert(&text_row("m1", "s1", 100, "hi")).await.unwrap();
        let err = messages
            .insert(&text_row("m1", "s1", 101, "hi again"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[tokio::test]
    async fn recent_returns_latest_oldest_first() {
        let db = Database::new(":memory:", 2).await.unwrap();
        let messages = db.messages();
        for (i, t) in [100, 200, 300, 400].iter().enumerate() {
            messages
                .insert(&text_row(&format!("m{i}"), "s1", *t, "x"))
                .await
                .unwrap();
        }
        messages.insert(&text_row("other", "s2", 500, "x")).await.unwrap();

        let recent = messages.recent("s1", 2).await.unwrap();
        let times: Vec<i64> = recent.iter().map(|m| m.create_time).collect();
        assert_eq!(times, vec![300, 400]);
    }

    #[tokio::test]
    async fn range_is_inclusive_and_session_scoped() {
        let db = Database::new(":memory:", 2).await.unwrap();
        let messages = db.messages();
        for (i, t) in [100, 200, 300].iter().enumerate() {
            messages
                .insert(&text_row(&format!("m{i}"), "s1", *t, "x"))
                .await
                .unwrap();
        }

        let rows = messages.range("s1", 100, 200).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].create_time, 100);
        assert!(messages.range("s9", 0, 999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_session_deletes_in_bulk() {
        let db = Database::new(":memory:", 2).await.unwrap();
        let messages = db.messages();
        messages.insert(&text_row("m1", "s1", 100, "x")).await.unwrap();
        messages.insert(&text_row("m2", "s1", 200, "x")).await.unwrap();
        messages.insert(&text_row("m3", "s2", 300, "x")).await.unwrap();

        messages.purge_session("s1").await.unwrap();
        assert!(messages.recent("s1", 10).await.unwrap().is_empty());
        assert_eq!(messages.recent("s2", 10).await.unwrap().len(), 1);
    }
}
