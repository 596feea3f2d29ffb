//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

// Every syncable entity type gets three tables:
//   <type>              live and trashed rows
//   <type>_deleted      tombstones of hard-deleted rows
//   <type>_history_seq  one counter row per user
const SCHEMA_SQL: &str = r#"
-- Contacts
CREATE TABLE IF NOT EXISTS contact (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    email_address TEXT,
    firstname TEXT,
    lastname TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT,
    history_id INTEGER NOT NULL,
    last_stmt INTEGER NOT NULL DEFAULT 0,
    device_id TEXT,

    UNIQUE(user_id, email_address, firstname, lastname)
);

CREATE INDEX IF NOT EXISTS idx_contact_user_history ON contact(user_id, history_id);

CREATE TABLE IF NOT EXISTS contact_deleted (
    id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    history_id INTEGER NOT NULL,
    device_id TEXT,

    PRIMARY KEY (user_id, id)
);

CREATE TABLE IF NOT EXISTS contact_history_seq (
    user_id INTEGER PRIMARY KEY,
    last_history_id INTEGER NOT NULL DEFAULT 0
);

-- Message bodies
CREATE TABLE IF NOT EXISTS body (
    uri TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    hash TEXT NOT NULL,
    name TEXT NOT NULL,
    snippet TEXT NOT NULL DEFAULT '',
    path TEXT NOT NULL,
    size INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT,
    history_id INTEGER NOT NULL,
    last_stmt INTEGER NOT NULL DEFAULT 0,
    device_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_body_user_history ON body(user_id, history_id);

CREATE TABLE IF NOT EXISTS body_deleted (
    uri TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    history_id INTEGER NOT NULL,
    device_id TEXT,

    PRIMARY KEY (user_id, uri)
);

CREATE TABLE IF NOT EXISTS body_history_seq (
    user_id INTEGER PRIMARY KEY,
    last_history_id INTEGER NOT NULL DEFAULT 0
);

-- Attached files
CREATE TABLE IF NOT EXISTS file (
    uri TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    hash TEXT NOT NULL,
    name TEXT NOT NULL,
    snippet TEXT NOT NULL DEFAULT '',
    path TEXT NOT NULL,
    size INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    modified_at TEXT,
    history_id INTEGER NOT NULL,
    last_stmt INTEGER NOT NULL DEFAULT 0,
    device_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_file_user_history ON file(user_id, history_id);

CREATE TABLE IF NOT EXISTS file_deleted (
    uri TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    history_id INTEGER NOT NULL,
    device_id TEXT,

    PRIMARY KEY (user_id, uri)
);

CREATE TABLE IF NOT EXISTS file_history_seq (
    user_id INTEGER PRIMARY KEY,
    last_history_id INTEGER NOT NULL DEFAULT 0
);

-- Drafts
CREATE TABLE IF NOT EXISTS draft (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    message_uid TEXT NOT NULL,
    parent_uid TEXT,
    thread_uid TEXT NOT NULL,
    unread INTEGER NOT NULL DEFAULT 0,
    starred INTEGER NOT NULL DEFAULT 0,
    payload TEXT,
    label_ids TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT,
    history_id INTEGER NOT NULL,
    last_stmt INTEGER NOT NULL DEFAULT 0,
    device_id TEXT,

    UNIQUE(user_id, message_uid)
);

CREATE INDEX IF NOT EXISTS idx_draft_user_history ON draft(user_id, history_id);

CREATE TABLE IF NOT EXISTS draft_deleted (
    id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    history_id INTEGER NOT NULL,
    device_id TEXT,

    PRIMARY KEY (user_id, id)
);

CREATE TABLE IF NOT EXISTS draft_history_seq (
    user_id INTEGER PRIMARY KEY,
    last_history_id INTEGER NOT NULL DEFAULT 0
);

-- Messages
CREATE TABLE IF NOT EXISTS message (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    message_uid TEXT NOT NULL,
    parent_uid TEXT,
    thread_uid TEXT NOT NULL,
    unread INTEGER NOT NULL DEFAULT 1,
    starred INTEGER NOT NULL DEFAULT 0,
    payload TEXT,
    label_ids TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT,
    history_id INTEGER NOT NULL,
    last_stmt INTEGER NOT NULL DEFAULT 0,
    device_id TEXT,

    UNIQUE(user_id, message_uid)
);

CREATE INDEX IF NOT EXISTS idx_message_user_history ON message(user_id, history_id);
CREATE INDEX IF NOT EXISTS idx_message_thread ON message(user_id, thread_uid);

CREATE TABLE IF NOT EXISTS message_deleted (
    id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    history_id INTEGER NOT NULL,
    device_id TEXT,

    PRIMARY KEY (user_id, id)
);

CREATE TABLE IF NOT EXISTS message_history_seq (
    user_id INTEGER PRIMARY KEY,
    last_history_id INTEGER NOT NULL DEFAULT 0
);

-- Sessions issued by the authentication subsystem
CREATE TABLE IF NOT EXISTS session (
    token TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    device_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_user ON session(user_id);
"#;
