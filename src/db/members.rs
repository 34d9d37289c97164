//! Chat session membership repository.

use super::DbError;
use sqlx::SqlitePool;

pub struct SessionMemberRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionMemberRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a member pair; re-adding an existing pair is a no-op, keeping the
    /// row unique per `(session_id, user_id)`.
    pub async fn append(&self, session_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query(
            "INSERT OR IGNORE INTO chat_session_member (session_id, user_id) VALUES (?, ?)",
        )
        .bind(session_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Remove one member pair.
    pub async fn remove(&self, session_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM chat_session_member WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Whole-session purge.
    pub async fn purge_session(&self, session_id: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM chat_session_member WHERE session_id = ?")
            .bind(session_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Every member user id of a session.
    pub async fn member_ids(&self, session_id: &str) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM chat_session_member WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Test teardown only.
    pub async fn truncate(&self) -> Result<(), DbError> {
        sqlx::query("DELETE FROM chat_session_member")
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;

    #[tokio::test]
    async fn membership_roundtrip() {
        let db = Database::new(":memory:", 2).await.unwrap();
        let members = db.members();

        members.append("s1", "uA").await.unwrap();
        members.append("s1", "uB").await.unwrap();
        members.append("s2", "uA").await.unwrap();

        let mut ids = members.member_ids("s1").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["uA", "uB"]);

        members.remove("s1", "uA").await.unwrap();
        assert_eq!(members.member_ids("s1").await.unwrap(), vec!["uB"]);
    }

    #[tokio::test]
    async fn pair_is_unique() {
        let db = Database::new(":memory:", 2).await.unwrap();
        let members = db.members();

        members.append("s1", "uA").await.unwrap();
        members.append("s1", "uA").await.unwrap();
        assert_eq!(members.member_ids("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_clears_whole_session() {
        let db = Database::new(":memory:", 2).await.unwrap();
        let members = db.members();

        members.append("s1", "uA").await.unwrap();
        members.append("s1", "uB").await.unwrap();
        members.append("s2", "uC").await.unwrap();

        members.purge_session("s1").await.unwrap();
        assert!(members.member_ids("s1").await.unwrap().is_empty());
        assert_eq!(members.member_ids("s2").await.unwrap(), vec!["uC"]);
    }
}
