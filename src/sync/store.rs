//! Entity persistence and the sync read path
//!
//! [`EntityStore`] implements the mutation, list and sync operations once for
//! every [`Collection`]. Each mutation runs in its own transaction and draws
//! one history id per touched row from the collection's sequencer; list and
//! sync read all their buckets plus the high-water-mark from one snapshot.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::collection::Collection;
#[cfg(test)]
use super::collection::Versioned;
use super::sequence::HistorySequencer;
use super::types::{Delta, Listing, RecordState, Tombstone};
use crate::auth::AuthUser;
use crate::config::TimeoutConfig;
use crate::error::{AppError, Result};

/// Rows attributed to the calling device are not echoed back to it. Rows
/// without attribution, and callers without a device, always pass.
const DEVICE_FILTER: &str = "(device_id IS NULL OR ? IS NULL OR device_id <> ?)";

/// Store for one collection, borrowing the shared pool
pub struct EntityStore<'a, C: Collection> {
    pool: &'a SqlitePool,
    timeouts: TimeoutConfig,
    sequencer: HistorySequencer,
    _collection: PhantomData<C>,
}

impl<'a, C: Collection> EntityStore<'a, C> {
    pub fn new(pool: &'a SqlitePool, timeouts: TimeoutConfig) -> Self {
        Self {
            pool,
            timeouts,
            sequencer: HistorySequencer::new(C::ENTITY),
            _collection: PhantomData,
        }
    }

    /// Insert a new active record attributed to the caller's device
    pub async fn create(&self, user: &AuthUser, new: &C::New) -> Result<C::Record> {
        with_deadline(self.timeouts.statement(), "create", self.insert(user, new)).await
    }

    async fn insert(&self, user: &AuthUser, new: &C::New) -> Result<C::Record> {
        let mut tx = self.pool.begin().await?;

        let history_id = self.sequencer.next(&mut tx, user.user_id).await?;
        let key = Uuid::new_v4().to_string();
        let now = timestamp();

        let sql = insert_sql::<C>();
        let query = sqlx::query(&sql)
            .bind(&key)
            .bind(user.user_id)
            .bind(&now)
            .bind(history_id)
            .bind(RecordState::Active)
            .bind(user.device());

        C::bind_new(query, new)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_write(e, || C::DUPLICATE.to_string()))?;

        let record = fetch_by_key::<C>(&mut tx, user.user_id, &key, false)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Failed to fetch created {}", C::ENTITY.table()))
            })?;

        tx.commit().await?;

        tracing::debug!(
            entity = C::ENTITY.table(),
            user_id = user.user_id,
            key = %key,
            history_id,
            "Created record"
        );

        Ok(record)
    }

    /// Overwrite the domain fields of a live record
    pub async fn update(&self, user: &AuthUser, changes: &C::Changes) -> Result<C::Record> {
        with_deadline(self.timeouts.statement(), "update", self.overwrite(user, changes)).await
    }

    async fn overwrite(&self, user: &AuthUser, changes: &C::Changes) -> Result<C::Record> {
        let key = C::changes_key(changes);
        let mut tx = self.pool.begin().await?;

        // Dropping the transaction on NotFound rolls the counter back.
        let history_id = self.sequencer.next(&mut tx, user.user_id).await?;
        let now = timestamp();

        let sql = update_sql::<C>();
        let query = C::bind_changes(sqlx::query(&sql), changes)
            .bind(&now)
            .bind(history_id)
            .bind(RecordState::Updated)
            .bind(user.device())
            .bind(user.user_id)
            .bind(key)
            .bind(RecordState::Trashed);

        let result = query
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_write(e, || C::DUPLICATE.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "{} not found: {}",
                C::ENTITY.table(),
                key
            )));
        }

        let record = fetch_by_key::<C>(&mut tx, user.user_id, key, false)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Failed to fetch updated {}", C::ENTITY.table()))
            })?;

        tx.commit().await?;

        tracing::debug!(
            entity = C::ENTITY.table(),
            user_id = user.user_id,
            key = %key,
            history_id,
            "Updated record"
        );

        Ok(record)
    }

    /// Move live records to the trash. Unknown or already trashed keys are skipped.
    pub async fn trash(&self, user: &AuthUser, keys: &[String]) -> Result<u64> {
        self.transition(user, keys, "last_stmt <> 2", RecordState::Trashed, "trash")
            .await
    }

    /// Restore trashed records. Unknown or live keys are skipped.
    pub async fn untrash(&self, user: &AuthUser, keys: &[String]) -> Result<u64> {
        self.transition(user, keys, "last_stmt = 2", RecordState::Active, "untrash")
            .await
    }

    async fn transition(
        &self,
        user: &AuthUser,
        keys: &[String],
        condition: &'static str,
        target: RecordState,
        operation: &'static str,
    ) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let apply = self.apply_transition(user, keys, condition, target, operation);
        with_deadline(self.timeouts.statement(), operation, apply).await
    }

    async fn apply_transition(
        &self,
        user: &AuthUser,
        keys: &[String],
        condition: &'static str,
        target: RecordState,
        operation: &'static str,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        self.sequencer.lock(&mut tx, user.user_id).await?;

        let matched = matching_keys::<C>(&mut tx, user.user_id, keys, Some(condition)).await?;

        let sql = format!(
            "UPDATE {} SET last_stmt = ?, history_id = ?, device_id = ? WHERE user_id = ? AND {} = ?",
            C::ENTITY.table(),
            C::ENTITY.key_column()
        );

        for key in &matched {
            let history_id = self.sequencer.next(&mut tx, user.user_id).await?;

            sqlx::query(&sql)
                .bind(target)
                .bind(history_id)
                .bind(user.device())
                .bind(user.user_id)
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            entity = C::ENTITY.table(),
            user_id = user.user_id,
            requested = keys.len(),
            affected = matched.len(),
            "Applied {}",
            operation
        );

        Ok(matched.len() as u64)
    }

    /// Hard-delete records, leaving a tombstone for each one removed
    pub async fn delete(&self, user: &AuthUser, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        with_deadline(self.timeouts.statement(), "delete", self.remove(user, keys)).await
    }

    async fn remove(&self, user: &AuthUser, keys: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        self.sequencer.lock(&mut tx, user.user_id).await?;

        let matched = matching_keys::<C>(&mut tx, user.user_id, keys, None).await?;

        let key_column = C::ENTITY.key_column();
        let tombstone_sql = format!(
            r#"
            INSERT INTO {table} ({key}, user_id, history_id, device_id)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, {key}) DO UPDATE SET
                history_id = excluded.history_id,
                device_id = excluded.device_id
            "#,
            table = C::ENTITY.tombstone_table(),
            key = key_column
        );
        let delete_sql = format!(
            "DELETE FROM {} WHERE user_id = ? AND {} = ?",
            C::ENTITY.table(),
            key_column
        );

        for key in &matched {
            let history_id = self.sequencer.next(&mut tx, user.user_id).await?;

            sqlx::query(&tombstone_sql)
                .bind(key)
                .bind(user.user_id)
                .bind(history_id)
                .bind(user.device())
                .execute(&mut *tx)
                .await?;

            sqlx::query(&delete_sql)
                .bind(user.user_id)
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            entity = C::ENTITY.table(),
            user_id = user.user_id,
            requested = keys.len(),
            affected = matched.len(),
            "Deleted records"
        );

        Ok(matched.len() as u64)
    }

    /// Point lookup of a live record
    pub async fn get(&self, user: &AuthUser, key: &str) -> Result<Option<C::Record>> {
        with_deadline(self.timeouts.statement(), "get", self.lookup(user, key)).await
    }

    async fn lookup(&self, user: &AuthUser, key: &str) -> Result<Option<C::Record>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_key::<C>(&mut conn, user.user_id, key, true).await
    }

    /// Every live record plus the current high-water-mark
    pub async fn list(&self, user: &AuthUser) -> Result<Listing<C::Record>> {
        with_deadline(self.timeouts.snapshot(), "list", self.read_listing(user)).await
    }

    async fn read_listing(&self, user: &AuthUser) -> Result<Listing<C::Record>> {
        let mut tx = self.pool.begin().await?;

        let order = if C::LIST_ORDERED {
            " ORDER BY created_at DESC, rowid DESC"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = ? AND last_stmt < 2{}",
            C::COLUMNS.join(", "),
            C::ENTITY.table(),
            order
        );

        let records = sqlx::query_as::<_, C::Record>(&sql)
            .bind(user.user_id)
            .fetch_all(&mut *tx)
            .await?;

        let last_history_id = self.sequencer.current(&mut tx, user.user_id).await?;

        tx.commit().await?;

        Ok(Listing {
            entity: C::ENTITY,
            last_history_id,
            records,
        })
    }

    /// Changes made by other devices after `since`, bucketed by record state
    pub async fn sync(&self, user: &AuthUser, since: i64) -> Result<Delta<C::Record>> {
        with_deadline(self.timeouts.snapshot(), "sync", self.read_delta(user, since)).await
    }

    async fn read_delta(&self, user: &AuthUser, since: i64) -> Result<Delta<C::Record>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            SELECT {}
            FROM {}
            WHERE user_id = ?
              AND last_stmt = ?
              AND history_id > ?
              AND {}
            ORDER BY created_at DESC, rowid DESC
            "#,
            C::COLUMNS.join(", "),
            C::ENTITY.table(),
            DEVICE_FILTER
        );

        let mut buckets = Vec::with_capacity(3);
        for state in [RecordState::Active, RecordState::Updated, RecordState::Trashed] {
            let rows = sqlx::query_as::<_, C::Record>(&sql)
                .bind(user.user_id)
                .bind(state)
                .bind(since)
                .bind(user.device())
                .bind(user.device())
                .fetch_all(&mut *tx)
                .await?;
            buckets.push(rows);
        }

        let tombstone_sql = format!(
            r#"
            SELECT {} AS id, user_id, history_id, device_id
            FROM {}
            WHERE user_id = ?
              AND history_id > ?
              AND {}
            ORDER BY history_id ASC
            "#,
            C::ENTITY.key_column(),
            C::ENTITY.tombstone_table(),
            DEVICE_FILTER
        );

        let deleted = sqlx::query_as::<_, Tombstone>(&tombstone_sql)
            .bind(user.user_id)
            .bind(since)
            .bind(user.device())
            .bind(user.device())
            .fetch_all(&mut *tx)
            .await?;

        let last_history_id = self.sequencer.current(&mut tx, user.user_id).await?;

        tx.commit().await?;

        let trashed = buckets.pop().unwrap_or_default();
        let updated = buckets.pop().unwrap_or_default();
        let inserted = buckets.pop().unwrap_or_default();

        tracing::debug!(
            entity = C::ENTITY.table(),
            user_id = user.user_id,
            since,
            last_history_id,
            inserted = inserted.len(),
            updated = updated.len(),
            trashed = trashed.len(),
            deleted = deleted.len(),
            "Computed sync delta"
        );

        Ok(Delta {
            last_history_id,
            inserted,
            updated,
            trashed,
            deleted,
        })
    }
}

/// Run a store operation under a deadline. On expiry the future is dropped,
/// which rolls back any open transaction.
async fn with_deadline<T>(
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AppError::Timeout(operation))?
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn insert_sql<C: Collection>() -> String {
    let mut columns = vec![
        C::ENTITY.key_column(),
        "user_id",
        "created_at",
        "history_id",
        "last_stmt",
        "device_id",
    ];
    columns.extend_from_slice(C::INSERT_COLUMNS);

    let placeholders = vec!["?"; columns.len()].join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        C::ENTITY.table(),
        columns.join(", "),
        placeholders
    )
}

fn update_sql<C: Collection>() -> String {
    let mut assignments: Vec<String> = C::UPDATE_COLUMNS
        .iter()
        .map(|column| format!("{} = ?", column))
        .collect();
    assignments.extend(
        ["modified_at", "history_id", "last_stmt", "device_id"]
            .iter()
            .map(|column| format!("{} = ?", column)),
    );

    format!(
        "UPDATE {} SET {} WHERE user_id = ? AND {} = ? AND last_stmt <> ?",
        C::ENTITY.table(),
        assignments.join(", "),
        C::ENTITY.key_column()
    )
}

async fn fetch_by_key<C: Collection>(
    conn: &mut SqliteConnection,
    user_id: i64,
    key: &str,
    live_only: bool,
) -> Result<Option<C::Record>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE user_id = ? AND {} = ?{}",
        C::COLUMNS.join(", "),
        C::ENTITY.table(),
        C::ENTITY.key_column(),
        if live_only { " AND last_stmt < 2" } else { "" }
    );

    let record = sqlx::query_as::<_, C::Record>(&sql)
        .bind(user_id)
        .bind(key)
        .fetch_optional(conn)
        .await?;

    Ok(record)
}

/// Keys from `keys` that exist for the user and satisfy `condition`, in
/// insertion order
async fn matching_keys<C: Collection>(
    conn: &mut SqliteConnection,
    user_id: i64,
    keys: &[String],
    condition: Option<&str>,
) -> Result<Vec<String>> {
    // The key list is bound once as a JSON array, so its length is not
    // limited by SQLite's bound-variable cap.
    let sql = format!(
        "SELECT {key} FROM {table} WHERE user_id = ? AND {key} IN (SELECT value FROM json_each(?)){extra} ORDER BY rowid",
        key = C::ENTITY.key_column(),
        table = C::ENTITY.table(),
        extra = condition.map(|c| format!(" AND {}", c)).unwrap_or_default()
    );

    let query = sqlx::query_as::<_, (String,)>(&sql)
        .bind(user_id)
        .bind(Json(keys));

    let rows = query.fetch_all(conn).await?;

    Ok(rows.into_iter().map(|(key,)| key).collect())
}

/// Check that a record carries the bookkeeping the store wrote
#[cfg(test)]
pub(crate) fn assert_bookkeeping<R: Versioned>(
    record: &R,
    history_id: i64,
    state: RecordState,
    device: Option<&str>,
) {
    assert_eq!(record.history_id(), history_id, "history id of {}", record.key());
    assert_eq!(record.state(), state, "state of {}", record.key());
    assert_eq!(record.device_id(), device, "device of {}", record.key());
}
