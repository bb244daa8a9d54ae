//! Wire types of the multi-sync peer protocol.

use serde::{Deserialize, Serialize};

use crate::db::entities::sync_version;

/// One entry of a peer's change stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncVersion {
    pub version: i64,
    #[serde(default)]
    pub source_id: i64,
    pub repo_path: String,
    /// Kept as a string so an unknown type skips one entry instead of the page
    pub repo_type: String,
    #[serde(rename = "last_modify_time", default)]
    pub last_modified_at: String,
    #[serde(default)]
    pub change_log: String,
}

impl From<sync_version::Model> for SyncVersion {
    fn from(v: sync_version::Model) -> Self {
        Self {
            version: v.version,
            source_id: v.source_id,
            repo_path: v.repo_path,
            repo_type: v.repo_type,
            last_modified_at: v.last_modified_at,
            change_log: v.change_log,
        }
    }
}

/// A page of versions after a cursor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncVersionPage {
    #[serde(default)]
    pub versions: Vec<SyncVersion>,
    #[serde(default)]
    pub has_more: bool,
}

/// Every peer response is wrapped in `{"msg": ..., "data": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerResponse<T> {
    #[serde(default)]
    pub msg: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUser {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTag {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub built_in: bool,
    #[serde(default)]
    pub show_name: String,
}

/// Model, dataset or code metadata as served by a peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRepo {
    /// `namespace/name` on the peer
    pub path: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default)]
    pub user: PeerUser,
    #[serde(default)]
    pub tags: Vec<PeerTag>,
    /// Only set for models
    #[serde(default)]
    pub base_model: Option<String>,
    /// Filled from the separate README call
    #[serde(default)]
    pub readme: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCommit {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub committer_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerFile {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub commit: PeerCommit,
}

impl PeerFile {
    /// Directory holding the file, "" for top-level files
    pub fn parent_path(&self) -> &str {
        self.path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }
}
