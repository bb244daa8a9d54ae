//! Service configuration, read from `HUB_*` environment variables.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, ServerError};
use crate::storage::{S3Config, StorageConfig};

/// Namespace mirrored repositories land in when no mapping matches
pub const DEFAULT_FALLBACK_NAMESPACE: &str = "AIWizards";

#[derive(Debug, Clone)]
pub struct GitServerConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Use the SaaS mirror backend instead of the on-premise one
    pub saas: bool,
    pub server_url: String,
    pub server_token: String,
    /// Owner of mirror repositories on the mirror backend
    pub namespace: String,
    /// Source namespace -> local target namespace
    pub namespace_mapping: HashMap<String, String>,
    pub fallback_namespace: String,
    pub push_mirror_interval: String,
    pub check_interval: Duration,
}

impl MirrorConfig {
    /// Local namespace a source namespace is mirrored into
    pub fn target_namespace(&self, source_namespace: &str) -> &str {
        match self.namespace_mapping.get(source_namespace) {
            Some(target) if !target.is_empty() => target,
            _ => &self.fallback_namespace,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            saas: false,
            server_url: "http://localhost:3000".to_string(),
            server_token: String::new(),
            namespace: "root".to_string(),
            namespace_mapping: HashMap::new(),
            fallback_namespace: DEFAULT_FALLBACK_NAMESPACE.to_string(),
            push_mirror_interval: "8h0m0s".to_string(),
            check_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultiSyncConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub token: String,
    /// Prepended to peer namespaces so synced repos never collide with local ones
    pub namespace_prefix: String,
    pub interval: Duration,
}

impl Default for MultiSyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://hub.opencsg.com".to_string(),
            token: String::new(),
            namespace_prefix: "CSG_".to_string(),
            interval: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub storage_path: PathBuf,
    pub database_url: String,
    pub storage: StorageConfig,
    pub git_server: GitServerConfig,
    pub mirror: MirrorConfig,
    pub multi_sync: MultiSyncConfig,
    /// Worker count for batch file indexing
    pub index_concurrency: usize,
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ServerError::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("FALSE") | Some("no") => Ok(false),
        Some(other) => Err(ServerError::Config(format!("{}={:?} is not a boolean", key, other))),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage_path = lookup("HUB_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("hub-replication"));

        let database_url = lookup("HUB_DATABASE_URL")
            .unwrap_or_else(|| crate::db::sqlite_url(&storage_path.join("hub.db")));

        let storage = match lookup("HUB_S3_BUCKET") {
            Some(bucket) => {
                let mut s3 = match lookup("HUB_S3_ENDPOINT") {
                    Some(endpoint) => S3Config::minio(bucket, endpoint),
                    None => S3Config::aws(bucket, var("HUB_S3_REGION", "us-east-1")),
                };
                if let Some(prefix) = lookup("HUB_S3_PREFIX") {
                    s3 = s3.with_prefix(prefix);
                }
                StorageConfig::S3(s3)
            }
            None => StorageConfig::Local(storage_path.join("blobs")),
        };

        let namespace_mapping = match lookup("HUB_MIRROR_NAMESPACE_MAPPING") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<HashMap<String, String>>(&raw)
                .map_err(|e| ServerError::Config(format!("HUB_MIRROR_NAMESPACE_MAPPING: {}", e)))?,
            _ => HashMap::new(),
        };

        let mirror_defaults = MirrorConfig::default();
        let mirror = MirrorConfig {
            saas: parse_bool(&lookup, "HUB_SAAS")?,
            server_url: var("HUB_MIRROR_SERVER_URL", &mirror_defaults.server_url),
            server_token: var("HUB_MIRROR_SERVER_TOKEN", ""),
            namespace: var("HUB_MIRROR_NAMESPACE", &mirror_defaults.namespace),
            namespace_mapping,
            fallback_namespace: var("HUB_MIRROR_FALLBACK_NAMESPACE", DEFAULT_FALLBACK_NAMESPACE),
            push_mirror_interval: var("HUB_PUSH_MIRROR_INTERVAL", &mirror_defaults.push_mirror_interval),
            check_interval: Duration::from_secs(parse_var(&lookup, "HUB_MIRROR_CHECK_INTERVAL_SECS", 60u64)?),
        };

        let sync_defaults = MultiSyncConfig::default();
        let multi_sync = MultiSyncConfig {
            enabled: parse_bool(&lookup, "HUB_MULTI_SYNC_ENABLED")?,
            endpoint: var("HUB_MULTI_SYNC_ENDPOINT", &sync_defaults.endpoint),
            token: var("HUB_MULTI_SYNC_TOKEN", ""),
            namespace_prefix: var("HUB_MULTI_SYNC_NAMESPACE_PREFIX", &sync_defaults.namespace_prefix),
            interval: Duration::from_secs(parse_var(&lookup, "HUB_MULTI_SYNC_INTERVAL_SECS", 600u64)?),
        };

        let index_concurrency = parse_var(&lookup, "HUB_INDEX_CONCURRENCY", 10usize)?;
        if index_concurrency == 0 {
            return Err(ServerError::Config("HUB_INDEX_CONCURRENCY must be at least 1".to_string()));
        }

        Ok(Config {
            listen_addr: parse_var(&lookup, "HUB_LISTEN_ADDR", SocketAddr::from(([127, 0, 0, 1], 8080)))?,
            storage_path,
            database_url,
            storage,
            git_server: GitServerConfig {
                url: var("HUB_GIT_SERVER_URL", "http://localhost:3000"),
                token: var("HUB_GIT_SERVER_TOKEN", ""),
            },
            mirror,
            multi_sync,
            index_concurrency,
        })
    }
}
