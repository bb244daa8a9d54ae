//! Local filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::backend::{StorageBackend, StorageError, StorageResult};

/// Local filesystem storage backend.
///
/// Stores objects in a directory structure mirroring the key:
/// ```text
/// {base_path}/
///   {namespace}/
///     {key segments...}   # "e3/b0/c442..." becomes e3/b0/c442...
/// ```
/// Sharding is already part of the LFS key layout, so keys are used as-is.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the full path for a key
    fn key_path(&self, namespace: &str, key: &str) -> PathBuf {
        let mut path = self.base_path.join(namespace);
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(namespace, key);
        self.ensure_parent(&path).await?;
        fs::write(&path, &data).await?;
        Ok(())
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let path = self.key_path(namespace, key);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn presigned_url(&self, namespace: &str, key: &str, _expires_in: Duration) -> StorageResult<String> {
        let path = self.key_path(namespace, key);
        if !self.exists(namespace, key).await? {
            return Err(StorageError::NotFound(format!("{}/{}", namespace, key)));
        }
        // Local files never expire; hand back a file URL
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_basic() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        storage.put("lfs", "ab/c1/23def456", Bytes::from("hello world")).await.unwrap();

        assert!(storage.exists("lfs", "ab/c1/23def456").await.unwrap());
        assert!(!storage.exists("lfs", "ab/c1/nonexistent").await.unwrap());
        // A shard directory is not an object
        assert!(!storage.exists("lfs", "ab/c1").await.unwrap());

        let on_disk = std::fs::read(temp_dir.path().join("lfs/ab/c1/23def456")).unwrap();
        assert_eq!(on_disk, b"hello world");
    }

    #[tokio::test]
    async fn test_local_storage_presigned_url() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        storage.put("lfs", "aa/bb/cc", Bytes::from("x")).await.unwrap();
        let url = storage
            .presigned_url("lfs", "aa/bb/cc", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("lfs/aa/bb/cc"));

        let err = storage
            .presigned_url("lfs", "aa/bb/missing", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_key_path_ignores_parent_segments() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        let path = storage.key_path("lfs", "../../etc/passwd");
        assert!(path.starts_with(temp_dir.path().join("lfs")));
    }
}
