//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::{Config, TimeoutConfig};
use crate::storage::BlobStorage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    blobs: BlobStorage,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool, blobs: BlobStorage) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, db, blobs }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the blob content store
    pub fn blobs(&self) -> &BlobStorage {
        &self.inner.blobs
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        self.inner.config.timeouts
    }
}
