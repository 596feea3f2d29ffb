//! Column mapping for syncable collections
//!
//! A [`Collection`] describes one entity type to the generic store: which
//! domain columns it writes and how its input types bind onto a query. Rows
//! are read back through `sqlx::FromRow`, so every mapping is fixed at
//! compile time.

use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Sqlite};

use super::types::{EntityType, RecordState};

/// Parameterized SQLite statement
pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bookkeeping columns shared by every syncable record
pub trait Versioned {
    fn key(&self) -> &str;
    fn history_id(&self) -> i64;
    fn state(&self) -> RecordState;
    fn device_id(&self) -> Option<&str>;
}

/// One syncable entity type
pub trait Collection: Send + Sync + 'static {
    /// Row as stored and returned to clients
    type Record: for<'r> FromRow<'r, SqliteRow> + Versioned + Serialize + Send + Unpin;
    /// Domain values for a new record
    type New: Send + Sync;
    /// Domain values for an update, carrying the record key
    type Changes: Send + Sync;

    const ENTITY: EntityType;

    /// Every column of the entity table, in select order
    const COLUMNS: &'static [&'static str];

    /// Domain columns bound by [`Collection::bind_new`], in bind order
    const INSERT_COLUMNS: &'static [&'static str];

    /// Domain columns bound by [`Collection::bind_changes`], in bind order
    const UPDATE_COLUMNS: &'static [&'static str];

    /// Whether list returns newest records first
    const LIST_ORDERED: bool = true;

    /// Message for unique-constraint violations
    const DUPLICATE: &'static str;

    fn bind_new<'q>(query: SqliteQuery<'q>, new: &'q Self::New) -> SqliteQuery<'q>;

    fn bind_changes<'q>(query: SqliteQuery<'q>, changes: &'q Self::Changes) -> SqliteQuery<'q>;

    fn changes_key(changes: &Self::Changes) -> &str;
}
