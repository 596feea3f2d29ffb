//! Drafts and messages
//!
//! Both collections share the [`Message`] record. Drafts are composed on a
//! device and get fresh message and thread uids from the server; messages
//! are imported with whatever uids the delivery path assigned and afterwards
//! only see flag changes.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::sync::{Collection, EntityType, RecordState, SqliteQuery, Versioned};

/// MIME part tree of a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<MessageHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MessagePartBody>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// Content of a leaf part: inline data, or a reference to a stored body or file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePartBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A stored draft or message
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub message_uid: String,
    pub parent_uid: Option<String>,
    pub thread_uid: String,
    pub unread: bool,
    pub starred: bool,
    pub payload: Option<Json<MessagePart>>,
    pub label_ids: Option<String>,
    pub created_at: String,
    pub modified_at: Option<String>,
    #[serde(skip_serializing)]
    pub history_id: i64,
    #[serde(skip_serializing)]
    pub last_stmt: RecordState,
    #[serde(skip_serializing)]
    pub device_id: Option<String>,
}

impl Versioned for Message {
    fn key(&self) -> &str {
        &self.id
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

const MESSAGE_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "message_uid",
    "parent_uid",
    "thread_uid",
    "unread",
    "starred",
    "payload",
    "label_ids",
    "created_at",
    "modified_at",
    "history_id",
    "last_stmt",
    "device_id",
];

const MESSAGE_INSERT_COLUMNS: &[&str] = &[
    "message_uid",
    "parent_uid",
    "thread_uid",
    "unread",
    "starred",
    "payload",
    "label_ids",
];

/// Request body for creating a draft
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDraft {
    #[serde(default)]
    pub parent_uid: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
    #[serde(default)]
    pub label_ids: Option<String>,
}

/// Request body for updating a draft
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftChanges {
    pub id: String,
    #[serde(default)]
    pub payload: Option<MessagePart>,
    #[serde(default)]
    pub label_ids: Option<String>,
}

pub struct Drafts;

impl Collection for Drafts {
    type Record = Message;
    type New = NewDraft;
    type Changes = DraftChanges;

    const ENTITY: EntityType = EntityType::Draft;
    const COLUMNS: &'static [&'static str] = MESSAGE_COLUMNS;
    const INSERT_COLUMNS: &'static [&'static str] = MESSAGE_INSERT_COLUMNS;
    const UPDATE_COLUMNS: &'static [&'static str] = &["payload", "label_ids"];
    const DUPLICATE: &'static str = "A draft with this message uid already exists";

    fn bind_new<'q>(query: SqliteQuery<'q>, new: &'q NewDraft) -> SqliteQuery<'q> {
        query
            .bind(Uuid::new_v4().to_string())
            .bind(&new.parent_uid)
            .bind(Uuid::new_v4().to_string())
            .bind(false)
            .bind(false)
            .bind(new.payload.as_ref().map(Json))
            .bind(&new.label_ids)
    }

    fn bind_changes<'q>(query: SqliteQuery<'q>, changes: &'q DraftChanges) -> SqliteQuery<'q> {
        query
            .bind(changes.payload.as_ref().map(Json))
            .bind(&changes.label_ids)
    }

    fn changes_key(changes: &DraftChanges) -> &str {
        &changes.id
    }
}

/// Request body for importing a delivered message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(default)]
    pub message_uid: Option<String>,
    #[serde(default)]
    pub parent_uid: Option<String>,
    #[serde(default)]
    pub thread_uid: Option<String>,
    #[serde(default = "default_unread")]
    pub unread: bool,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub payload: Option<MessagePart>,
    #[serde(default)]
    pub label_ids: Option<String>,
}

fn default_unread() -> bool {
    true
}

/// Request body for changing message flags
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageChanges {
    pub id: String,
    pub unread: bool,
    pub starred: bool,
    #[serde(default)]
    pub label_ids: Option<String>,
}

pub struct Messages;

impl Collection for Messages {
    type Record = Message;
    type New = NewMessage;
    type Changes = MessageChanges;

    const ENTITY: EntityType = EntityType::Message;
    const COLUMNS: &'static [&'static str] = MESSAGE_COLUMNS;
    const INSERT_COLUMNS: &'static [&'static str] = MESSAGE_INSERT_COLUMNS;
    const UPDATE_COLUMNS: &'static [&'static str] = &["unread", "starred", "label_ids"];
    const DUPLICATE: &'static str = "A message with this message uid already exists";

    fn bind_new<'q>(query: SqliteQuery<'q>, new: &'q NewMessage) -> SqliteQuery<'q> {
        let message_uid = new
            .message_uid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let thread_uid = new
            .thread_uid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        query
            .bind(message_uid)
            .bind(&new.parent_uid)
            .bind(thread_uid)
            .bind(new.unread)
            .bind(new.starred)
            .bind(new.payload.as_ref().map(Json))
            .bind(&new.label_ids)
    }

    fn bind_changes<'q>(query: SqliteQuery<'q>, changes: &'q MessageChanges) -> SqliteQuery<'q> {
        query
            .bind(changes.unread)
            .bind(changes.starred)
            .bind(&changes.label_ids)
    }

    fn changes_key(changes: &MessageChanges) -> &str {
        &changes.id
    }
}
