//! Sync data types
//!
//! Defines the vocabulary of the history-based sync protocol:
//! - Entity types and their table layout
//! - The record state tri-state that drives both liveness and buckets
//! - Tombstones, full listings and deltas

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Types of entities that carry their own history sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Contact,
    Body,
    File,
    Draft,
    Message,
}

impl EntityType {
    /// Table holding live and trashed rows
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact",
            EntityType::Body => "body",
            EntityType::File => "file",
            EntityType::Draft => "draft",
            EntityType::Message => "message",
        }
    }

    /// Table holding tombstones of hard-deleted rows
    pub fn tombstone_table(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact_deleted",
            EntityType::Body => "body_deleted",
            EntityType::File => "file_deleted",
            EntityType::Draft => "draft_deleted",
            EntityType::Message => "message_deleted",
        }
    }

    /// Single-row-per-user history counter table
    pub fn sequence_table(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact_history_seq",
            EntityType::Body => "body_history_seq",
            EntityType::File => "file_history_seq",
            EntityType::Draft => "draft_history_seq",
            EntityType::Message => "message_history_seq",
        }
    }

    /// Column holding the record's stable key
    pub fn key_column(&self) -> &'static str {
        match self {
            EntityType::Body | EntityType::File => "uri",
            _ => "id",
        }
    }

    /// Name of the record array in list responses
    pub fn plural(&self) -> &'static str {
        match self {
            EntityType::Contact => "contacts",
            EntityType::Body | EntityType::File => "blobs",
            EntityType::Draft => "drafts",
            EntityType::Message => "messages",
        }
    }
}

/// Last statement applied to a record (`last_stmt` column).
///
/// Active and updated records are live; trashed ones are hidden from list
/// and reject updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[repr(i64)]
pub enum RecordState {
    Active = 0,
    Updated = 1,
    Trashed = 2,
}

/// Durable marker of a hard deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Tombstone {
    /// Key (`id` or `uri`) of the deleted record
    pub id: String,
    #[serde(skip_serializing)]
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub history_id: i64,
    #[serde(skip_serializing)]
    pub device_id: Option<String>,
}

/// Full live record set, for cold start
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub entity: EntityType,
    pub last_history_id: i64,
    pub records: Vec<T>,
}

// The record array is keyed by the entity's plural name, e.g.
// `{"lastHistoryId": 7, "contacts": [...]}`.
impl<T: Serialize> Serialize for Listing<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("lastHistoryId", &self.last_history_id)?;
        map.serialize_entry(self.entity.plural(), &self.records)?;
        map.end()
    }
}

/// Changes since a client's last seen history id
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta<T> {
    pub last_history_id: i64,
    pub inserted: Vec<T>,
    pub updated: Vec<T>,
    pub trashed: Vec<T>,
    pub deleted: Vec<Tombstone>,
}

impl<T> Delta<T> {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.updated.is_empty()
            && self.trashed.is_empty()
            && self.deleted.is_empty()
    }
}

/// Sync request body
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(
        rename = "lastHistoryId",
        alias = "historyId",
        alias = "sinceHistoryId",
        default
    )]
    pub since: i64,
}

/// Key set for bulk trash, untrash and delete
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySet {
    #[serde(alias = "uris", default)]
    pub ids: Vec<String>,
}

/// Rows touched by a bulk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Affected {
    pub affected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_keyed_by_plural() {
        let listing = Listing {
            entity: EntityType::Contact,
            last_history_id: 7,
            records: vec!["a", "b"],
        };

        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["lastHistoryId"], 7);
        assert_eq!(json["contacts"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_sync_request_aliases() {
        let req: SyncRequest = serde_json::from_str(r#"{"lastHistoryId": 4}"#).unwrap();
        assert_eq!(req.since, 4);

        let req: SyncRequest = serde_json::from_str(r#"{"historyId": 5}"#).unwrap();
        assert_eq!(req.since, 5);

        let req: SyncRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.since, 0);
    }

    #[test]
    fn test_key_set_accepts_uris() {
        let keys: KeySet = serde_json::from_str(r#"{"uris": ["u1", "u2"]}"#).unwrap();
        assert_eq!(keys.ids, vec!["u1", "u2"]);
    }

    #[test]
    fn test_tombstone_hides_bookkeeping() {
        let tombstone = Tombstone {
            id: "c1".to_string(),
            user_id: 1,
            history_id: 9,
            device_id: Some("d1".to_string()),
        };

        let json = serde_json::to_value(&tombstone).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "c1" }));
    }
}
