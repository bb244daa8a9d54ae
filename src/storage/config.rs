//! Blob store selection.

use std::path::PathBuf;
use std::sync::Arc;

use super::{LocalStorage, S3Config, S3Storage, StorageBackend};

/// Where LFS objects are read from
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Directory on the local filesystem
    Local(PathBuf),
    /// S3-compatible bucket (AWS S3, MinIO, R2, etc.)
    S3(S3Config),
}

impl StorageConfig {
    /// Build the backend this config names
    pub async fn build(&self) -> Arc<dyn StorageBackend> {
        match self {
            StorageConfig::Local(path) => {
                if let Err(e) = std::fs::create_dir_all(path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to create blob directory");
                }
                tracing::info!("Using local blob store at {}", path.display());
                Arc::new(LocalStorage::new(path.clone()))
            }
            StorageConfig::S3(config) => {
                tracing::info!(bucket = %config.bucket, endpoint = ?config.endpoint, "Using S3 blob store");
                Arc::new(S3Storage::new(config.clone()).await)
            }
        }
    }
}
