//! Address book contacts

use serde::{Deserialize, Serialize};

use crate::sync::{Collection, EntityType, RecordState, SqliteQuery, Versioned};

/// A stored contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub email_address: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub created_at: String,
    pub modified_at: Option<String>,
    #[serde(skip_serializing)]
    pub history_id: i64,
    #[serde(skip_serializing)]
    pub last_stmt: RecordState,
    #[serde(skip_serializing)]
    pub device_id: Option<String>,
}

impl Versioned for Contact {
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

/// Request body for creating a contact
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    #[serde(alias = "email_address")]
    pub email_address: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

/// Request body for updating a contact
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactChanges {
    pub id: String,
    #[serde(alias = "email_address")]
    pub email_address: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

pub struct Contacts;

impl Collection for Contacts {
    type Record = Contact;
    type New = NewContact;
    type Changes = ContactChanges;

    const ENTITY: EntityType = EntityType::Contact;

    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "email_address",
        "firstname",
        "lastname",
        "created_at",
        "modified_at",
        "history_id",
        "last_stmt",
        "device_id",
    ];

    const INSERT_COLUMNS: &'static [&'static str] = &["email_address", "firstname", "lastname"];

    const UPDATE_COLUMNS: &'static [&'static str] = &["email_address", "firstname", "lastname"];

    const DUPLICATE: &'static str = "A contact with this email address and name already exists";

    fn bind_new<'q>(query: SqliteQuery<'q>, new: &'q NewContact) -> SqliteQuery<'q> {
        query
            .bind(&new.email_address)
            .bind(&new.firstname)
            .bind(&new.lastname)
    }

    fn bind_changes<'q>(query: SqliteQuery<'q>, changes: &'q ContactChanges) -> SqliteQuery<'q> {
        query
            .bind(&changes.email_address)
            .bind(&changes.firstname)
            .bind(&changes.lastname)
    }

    fn changes_key(changes: &ContactChanges) -> &str {
        &changes.id
    }
}
