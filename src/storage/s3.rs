//! S3-compatible blob store.
//!
//! Works against AWS S3, MinIO, R2 and anything else speaking the S3 API.
//! Existence checks are HEAD requests; a not-found response means the
//! object has not landed yet, any other failure is `StorageError::Other`.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::Region,
    error::{ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use std::time::Duration;

use super::backend::{StorageBackend, StorageError, StorageResult};

const MINIO_REGION: &str = "us-east-1";

#[derive(Clone, Debug)]
pub struct S3Config {
    pub bucket: String,
    /// Prepended to every key, e.g. "hub/"
    pub prefix: Option<String>,
    pub region: String,
    /// Custom endpoint for MinIO, R2, etc.
    pub endpoint: Option<String>,
    /// Path-style addressing, required by MinIO
    pub force_path_style: bool,
}

impl S3Config {
    pub fn aws(bucket: String, region: String) -> Self {
        Self {
            bucket,
            prefix: None,
            region,
            endpoint: None,
            force_path_style: false,
        }
    }

    /// S3-compatible store reachable at `endpoint`
    pub fn minio(bucket: String, endpoint: String) -> Self {
        Self {
            bucket,
            prefix: None,
            region: MINIO_REGION.to_string(),
            endpoint: Some(endpoint),
            force_path_style: true,
        }
    }

    pub fn with_prefix(mut self, prefix: String) -> Self {
        self.prefix = Some(prefix);
        self
    }

    fn object_key(&self, namespace: &str, key: &str) -> String {
        format!("{}{}/{}", self.prefix.as_deref().unwrap_or(""), namespace, key)
    }
}

pub struct S3Storage {
    client: Client,
    config: S3Config,
}

fn other<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Other(e.to_string())
}

impl S3Storage {
    /// Connect using credentials from the environment
    pub async fn new(config: S3Config) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            config,
        }
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(self.config.object_key(namespace, key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(other)?;
        Ok(())
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let head = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(self.config.object_key(namespace, key))
            .send()
            .await;

        match head {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(false),
            Err(e) if e.code() == Some("NoSuchKey") => Ok(false),
            Err(e) => Err(other(e)),
        }
    }

    async fn presigned_url(&self, namespace: &str, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign = PresigningConfig::expires_in(expires_in).map_err(other)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(self.config.object_key(namespace, key))
            .presigned(presign)
            .await
            .map_err(other)?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let cfg = S3Config::minio("bucket".to_string(), "http://localhost:9000".to_string())
            .with_prefix("hub/".to_string());
        assert!(cfg.force_path_style);
        assert_eq!(cfg.region, MINIO_REGION);
        assert_eq!(cfg.object_key("lfs", "aa/bb/cc"), "hub/lfs/aa/bb/cc");

        let cfg = S3Config::aws("bucket".to_string(), "eu-west-1".to_string());
        assert!(!cfg.force_path_style);
        assert!(cfg.endpoint.is_none());
        assert_eq!(cfg.object_key("lfs", "aa/bb/cc"), "lfs/aa/bb/cc");
    }
}
