//! Syncable entity types
//!
//! Each submodule defines the stored record, its request bodies and the
//! [`crate::sync::Collection`] impl that maps them onto SQLite columns.

mod blobs;
mod contacts;
mod messages;

pub use blobs::{snippet, Blob, BlobChanges, Bodies, Files, NewBlob, SNIPPET_CHARS};
pub use contacts::{Contact, ContactChanges, Contacts, NewContact};
pub use messages::{
    DraftChanges, Drafts, Message, MessageChanges, MessageHeader, MessagePart, MessagePartBody,
    Messages, NewDraft, NewMessage,
};
