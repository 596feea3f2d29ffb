//! Cargomail Server Library
//!
//! History-based multi-device sync for an email backend. Contacts, message
//! bodies, attached files, drafts and messages each keep a per-user history
//! sequence; devices pull everything once and afterwards only the changes
//! made by other devices.
//!
//! # Modules
//!
//! - `sync`: history sequencer, generic entity store, list and sync engines
//! - `entities`: the concrete collections and their records
//! - `routes`: the authenticated HTTP API
//! - `storage`: content-addressed blob store for uploads

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod sync;
