//! Sync module for multi-device synchronization
//!
//! Provides:
//! - Per-user, per-entity history sequences
//! - A generic entity store with trash and tombstone handling
//! - Full listings and incremental deltas
//!
//! # Sync Protocol
//!
//! 1. A fresh client calls list and remembers `lastHistoryId`
//! 2. Every mutation draws a new history id for each row it touches and
//!    stamps the row with the calling device
//! 3. The client later calls sync with the remembered id and receives the
//!    rows changed since, bucketed by their current state:
//!    - `inserted`: active rows
//!    - `updated`: rows updated at least once
//!    - `trashed`: rows in the trash
//!    - `deleted`: tombstones of hard-deleted rows
//! 4. Changes attributed to the calling device are left out; that device
//!    already applied them when it issued the mutation

mod collection;
mod sequence;
mod store;
mod types;

pub use collection::{Collection, SqliteQuery, Versioned};
pub use sequence::HistorySequencer;
pub use store::EntityStore;
pub use types::{Affected, Delta, EntityType, KeySet, Listing, RecordState, SyncRequest, Tombstone};

#[cfg(test)]
pub(crate) use store::assert_bookkeeping;
