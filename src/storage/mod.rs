//! Blob store abstraction.
//!
//! LFS objects live in a content-addressed blob store that can be backed by:
//! - Local filesystem (default)
//! - S3-compatible object storage (AWS S3, MinIO, R2, etc.)
//!
//! Mirror progress is measured by stat-ing objects here, so `exists` is the
//! hot path.

mod backend;
mod config;
mod local;
mod s3;

pub use backend::{lfs_relative_path, namespaces, StorageBackend, StorageError, StorageResult};
pub use config::StorageConfig;
pub use local::LocalStorage;
pub use s3::{S3Config, S3Storage};
