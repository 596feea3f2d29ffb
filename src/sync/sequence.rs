//! Per-user history sequencer
//!
//! Each entity type keeps one counter row per user. Mutations draw the next
//! value inside their own transaction, so the assigned ids follow the order
//! in which SQLite serializes the writers.

use sqlx::SqliteConnection;

use super::types::EntityType;
use crate::error::Result;

/// History counter for one entity type
#[derive(Debug, Clone, Copy)]
pub struct HistorySequencer {
    entity: EntityType,
}

impl HistorySequencer {
    pub fn new(entity: EntityType) -> Self {
        Self { entity }
    }

    /// Make sure the user's counter row exists.
    ///
    /// Must be the first statement of a mutating transaction: it is a write,
    /// so it takes the database write lock before anything is read.
    pub async fn lock(&self, conn: &mut SqliteConnection, user_id: i64) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (user_id, last_history_id) VALUES (?, 0) ON CONFLICT(user_id) DO NOTHING",
            self.entity.sequence_table()
        );

        sqlx::query(&query).bind(user_id).execute(conn).await?;

        Ok(())
    }

    /// Increment and get the next history id for a user
    pub async fn next(&self, conn: &mut SqliteConnection, user_id: i64) -> Result<i64> {
        let query = format!(
            r#"
            INSERT INTO {} (user_id, last_history_id)
            VALUES (?, 1)
            ON CONFLICT(user_id) DO UPDATE SET
                last_history_id = last_history_id + 1
            RETURNING last_history_id
            "#,
            self.entity.sequence_table()
        );

        let (history_id,): (i64,) = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_one(conn)
            .await?;

        Ok(history_id)
    }

    /// Current high-water-mark; zero for users that never wrote
    pub async fn current(&self, conn: &mut SqliteConnection, user_id: i64) -> Result<i64> {
        let query = format!(
            "SELECT last_history_id FROM {} WHERE user_id = ?",
            self.entity.sequence_table()
        );

        let row: Option<(i64,)> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_optional(conn)
            .await?;

        Ok(row.map(|(v,)| v).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[tokio::test]
    async fn test_version_tracking() {
        let pool = create_memory_pool().await.unwrap();
        let seq = HistorySequencer::new(EntityType::Contact);
        let mut conn = pool.acquire().await.unwrap();

        assert_eq!(seq.current(&mut conn, 1).await.unwrap(), 0);
        assert_eq!(seq.next(&mut conn, 1).await.unwrap(), 1);
        assert_eq!(seq.next(&mut conn, 1).await.unwrap(), 2);
        assert_eq!(seq.current(&mut conn, 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lock_keeps_existing_value() {
        let pool = create_memory_pool().await.unwrap();
        let seq = HistorySequencer::new(EntityType::Draft);
        let mut conn = pool.acquire().await.unwrap();

        seq.lock(&mut conn, 1).await.unwrap();
        assert_eq!(seq.current(&mut conn, 1).await.unwrap(), 0);

        seq.next(&mut conn, 1).await.unwrap();
        seq.lock(&mut conn, 1).await.unwrap();
        assert_eq!(seq.current(&mut conn, 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let pool = create_memory_pool().await.unwrap();
        let contacts = HistorySequencer::new(EntityType::Contact);
        let files = HistorySequencer::new(EntityType::File);
        let mut conn = pool.acquire().await.unwrap();

        contacts.next(&mut conn, 1).await.unwrap();
        contacts.next(&mut conn, 1).await.unwrap();
        contacts.next(&mut conn, 2).await.unwrap();

        assert_eq!(files.next(&mut conn, 1).await.unwrap(), 1);
        assert_eq!(contacts.current(&mut conn, 1).await.unwrap(), 2);
        assert_eq!(contacts.current(&mut conn, 2).await.unwrap(), 1);
    }
}
