//! Message bodies and attached files
//!
//! Both collections share the [`Blob`] record. The content itself lives in
//! [`crate::storage::BlobStorage`]; rows only point at it by hash and path.

use serde::Serialize;

use crate::sync::{Collection, EntityType, RecordState, SqliteQuery, Versioned};

/// Length of the preview stored for textual content
pub const SNIPPET_CHARS: usize = 200;

/// Metadata of a stored body or file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub uri: String,
    #[serde(skip_serializing)]
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub hash: String,
    pub name: String,
    pub snippet: String,
    #[serde(skip_serializing)]
    pub path: String,
    pub size: i64,
    pub content_type: String,
    pub created_at: String,
    pub modified_at: Option<String>,
    #[serde(skip_serializing)]
    pub history_id: i64,
    #[serde(skip_serializing)]
    pub last_stmt: RecordState,
    #[serde(skip_serializing)]
    pub device_id: Option<String>,
}

impl Versioned for Blob {
    fn key(&self) -> &str {
        &self.uri
    }

    fn history_id(&self) -> i64 {
        self.history_id
    }

    fn state(&self) -> RecordState {
        self.last_stmt
    }

    fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }
}

/// Metadata for freshly stored content
#[derive(Debug, Clone)]
pub struct NewBlob {
    pub hash: String,
    pub name: String,
    pub snippet: String,
    pub path: String,
    pub size: i64,
    pub content_type: String,
}

/// Replacement content for an existing blob
#[derive(Debug, Clone)]
pub struct BlobChanges {
    pub uri: String,
    pub hash: String,
    pub snippet: String,
    pub path: String,
    pub size: i64,
}

/// Preview text for a blob: the leading characters of textual content,
/// empty for everything else.
pub fn snippet(content_type: &str, data: &[u8]) -> String {
    if !content_type.starts_with("text/") {
        return String::new();
    }

    String::from_utf8_lossy(data)
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}

const BLOB_COLUMNS: &[&str] = &[
    "uri",
    "user_id",
    "hash",
    "name",
    "snippet",
    "path",
    "size",
    "content_type",
    "created_at",
    "modified_at",
    "history_id",
    "last_stmt",
    "device_id",
];

const BLOB_INSERT_COLUMNS: &[&str] = &["hash", "name", "snippet", "path", "size", "content_type"];

const BLOB_UPDATE_COLUMNS: &[&str] = &["hash", "snippet", "path", "size"];

fn bind_blob<'q>(query: SqliteQuery<'q>, new: &'q NewBlob) -> SqliteQuery<'q> {
    query
        .bind(&new.hash)
        .bind(&new.name)
        .bind(&new.snippet)
        .bind(&new.path)
        .bind(new.size)
        .bind(&new.content_type)
}

fn bind_blob_changes<'q>(query: SqliteQuery<'q>, changes: &'q BlobChanges) -> SqliteQuery<'q> {
    query
        .bind(&changes.hash)
        .bind(&changes.snippet)
        .bind(&changes.path)
        .bind(changes.size)
}

/// Message bodies
pub struct Bodies;

impl Collection for Bodies {
    type Record = Blob;
    type New = NewBlob;
    type Changes = BlobChanges;

    const ENTITY: EntityType = EntityType::Body;
    const COLUMNS: &'static [&'static str] = BLOB_COLUMNS;
    const INSERT_COLUMNS: &'static [&'static str] = BLOB_INSERT_COLUMNS;
    const UPDATE_COLUMNS: &'static [&'static str] = BLOB_UPDATE_COLUMNS;
    const LIST_ORDERED: bool = false;
    const DUPLICATE: &'static str = "Body already exists";

    fn bind_new<'q>(query: SqliteQuery<'q>, new: &'q NewBlob) -> SqliteQuery<'q> {
        bind_blob(query, new)
    }

    fn bind_changes<'q>(query: SqliteQuery<'q>, changes: &'q BlobChanges) -> SqliteQuery<'q> {
        bind_blob_changes(query, changes)
    }

    fn changes_key(changes: &BlobChanges) -> &str {
        &changes.uri
    }
}

/// Attached files
pub struct Files;

impl Collection for Files {
    type Record = Blob;
    type New = NewBlob;
    type Changes = BlobChanges;

    const ENTITY: EntityType = EntityType::File;
    const COLUMNS: &'static [&'static str] = BLOB_COLUMNS;
    const INSERT_COLUMNS: &'static [&'static str] = BLOB_INSERT_COLUMNS;
    const UPDATE_COLUMNS: &'static [&'static str] = BLOB_UPDATE_COLUMNS;
    const LIST_ORDERED: bool = false;
    const DUPLICATE: &'static str = "File already exists";

    fn bind_new<'q>(query: SqliteQuery<'q>, new: &'q NewBlob) -> SqliteQuery<'q> {
        bind_blob(query, new)
    }

    fn bind_changes<'q>(query: SqliteQuery<'q>, changes: &'q BlobChanges) -> SqliteQuery<'q> {
        bind_blob_changes(query, changes)
    }

    fn changes_key(changes: &BlobChanges) -> &str {
        &changes.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::config::TimeoutConfig;
    use crate::db::create_memory_pool;
    use crate::sync::EntityStore;

    fn text_blob(text: &str) -> NewBlob {
        NewBlob {
            hash: "ab12".to_string(),
            name: "body.txt".to_string(),
            snippet: snippet("text/plain", text.as_bytes()),
            path: "ab/ab12".to_string(),
            size: text.len() as i64,
            content_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn test_snippet_truncates_text() {
        let long = "x".repeat(500);
        assert_eq!(snippet("text/plain", long.as_bytes()).chars().count(), 200);
        assert_eq!(snippet("text/html", b"<p>hi</p>"), "<p>hi</p>");
        assert_eq!(snippet("application/pdf", b"%PDF-1.4"), "");
    }

    #[test]
    fn test_snippet_counts_characters() {
        let text = "é".repeat(300);
        let preview = snippet("text/plain", text.as_bytes());
        assert_eq!(preview.chars().count(), 200);
    }

    #[tokio::test]
    async fn test_bodies_and_files_are_separate() {
        let pool = create_memory_pool().await.unwrap();
        let bodies = EntityStore::<Bodies>::new(&pool, TimeoutConfig::default());
        let files = EntityStore::<Files>::new(&pool, TimeoutConfig::default());
        let user = AuthUser::new(1, None);

        bodies.create(&user, &text_blob("hello")).await.unwrap();
        bodies.create(&user, &text_blob("again")).await.unwrap();
        let file = files.create(&user, &text_blob("attachment")).await.unwrap();

        assert_eq!(file.history_id, 1);
        assert_eq!(bodies.list(&user).await.unwrap().records.len(), 2);
        assert_eq!(files.list(&user).await.unwrap().last_history_id, 1);
    }

    #[tokio::test]
    async fn test_blob_trash_then_delete() {
        let pool = create_memory_pool().await.unwrap();
        let bodies = EntityStore::<Bodies>::new(&pool, TimeoutConfig::default());
        let user = AuthUser::new(1, Some("phone"));
        let other = AuthUser::new(1, Some("laptop"));

        let body = bodies.create(&user, &text_blob("hello")).await.unwrap();
        let keys = vec![body.uri.clone()];

        assert_eq!(bodies.trash(&user, &keys).await.unwrap(), 1);
        let delta = bodies.sync(&other, 0).await.unwrap();
        assert_eq!(delta.trashed.len(), 1);

        assert_eq!(bodies.delete(&user, &keys).await.unwrap(), 1);
        let delta = bodies.sync(&other, 0).await.unwrap();
        assert!(delta.trashed.is_empty());
        assert_eq!(delta.deleted.len(), 1);
        assert_eq!(delta.deleted[0].id, body.uri);
        assert_eq!(delta.last_history_id, 3);

        assert!(bodies.list(&user).await.unwrap().records.is_empty());
        assert!(bodies.get(&user, &body.uri).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_blob_content() {
        let pool = create_memory_pool().await.unwrap();
        let files = EntityStore::<Files>::new(&pool, TimeoutConfig::default());
        let user = AuthUser::new(1, None);

        let file = files.create(&user, &text_blob("v1")).await.unwrap();
        let changes = BlobChanges {
            uri: file.uri.clone(),
            hash: "cd34".to_string(),
            snippet: "v2".to_string(),
            path: "cd/cd34".to_string(),
            size: 2,
        };

        let updated = files.update(&user, &changes).await.unwrap();
        assert_eq!(updated.hash, "cd34");
        assert_eq!(updated.name, "body.txt");
        assert_eq!(updated.last_stmt, RecordState::Updated);

        let json = serde_json::to_value(&updated).unwrap();
        assert!(json.get("hash").is_none());
        assert!(json.get("path").is_none());
        assert_eq!(json["contentType"], "text/plain");
    }
}
