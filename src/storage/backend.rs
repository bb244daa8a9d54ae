//! Blob store trait definition.
//!
//! The replication core only reads from the blob store: it checks whether
//! LFS objects have landed and hands out presigned download URLs. Writes
//! exist so other parts of the hub (and tests) can populate it.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Storage error types
#[derive(Debug)]
pub enum StorageError {
    /// Object not found ("no such key")
    NotFound(String),
    /// IO error
    Io(std::io::Error),
    /// Other error
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "Object not found: {}", key),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Blob store backend.
///
/// Keys are organized by namespace (e.g. "lfs") so different object kinds
/// can live side by side in one bucket or directory.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Put an object by namespace and key
    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()>;

    /// Check if an object exists (stat).
    ///
    /// A missing object is `Ok(false)`; implementations may also surface it
    /// as `StorageError::NotFound`, which callers treat the same way.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Generate a time-limited download URL for an object
    async fn presigned_url(&self, namespace: &str, key: &str, expires_in: Duration) -> StorageResult<String>;
}

/// Storage namespaces
pub mod namespaces {
    /// LFS objects, keyed by `lfs_relative_path(oid)`
    pub const LFS: &str = "lfs";
}

/// Relative key of an LFS object: `<oid[0:2]>/<oid[2:4]>/<oid[4:]>`.
///
/// Returns `None` for oids too short to shard.
pub fn lfs_relative_path(oid: &str) -> Option<String> {
    if oid.len() <= 4 || !oid.is_ascii() {
        return None;
    }
    Some(format!("{}/{}/{}", &oid[..2], &oid[2..4], &oid[4..]))
}
