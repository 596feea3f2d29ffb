//! Content-addressed blob storage
//!
//! Uploaded bodies and files are stored once per distinct content under
//! `<base>/<first two hash chars>/<sha256 hex>`. Database rows keep the
//! relative path, so the base directory can move between deployments.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Location of stored content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Lowercase hex sha256 of the content
    pub hash: String,
    /// Path relative to the storage base
    pub path: String,
    pub size: i64,
}

/// Local filesystem blob store
#[derive(Debug, Clone)]
pub struct BlobStorage {
    base_path: PathBuf,
}

impl BlobStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Hex sha256 digest of `data`
    pub fn hash(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Store content, reusing the existing file when the same bytes were
    /// stored before.
    pub async fn put(&self, data: &[u8]) -> Result<StoredBlob> {
        let hash = Self::hash(data);
        let path = format!("{}/{}", &hash[..2], hash);
        let target = self.base_path.join(&path);

        if !tokio::fs::try_exists(&target).await? {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Write under a temporary name first so readers never see a
            // partially written blob.
            let staging = target.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
            tokio::fs::write(&staging, data).await?;
            tokio::fs::rename(&staging, &target).await?;

            tracing::debug!(hash = %hash, size = data.len(), "Stored blob content");
        }

        Ok(StoredBlob {
            hash,
            path,
            size: data.len() as i64,
        })
    }

    /// Read content by its relative path
    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;

        match tokio::fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound(
                format!("Blob content missing: {}", path),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if !contained {
            return Err(AppError::Internal(format!("Invalid blob path: {}", path)));
        }

        Ok(self.base_path.join(relative))
    }
}
