//! Domain enums shared by the replication components.
//!
//! Enum-valued columns are stored as lowercase strings; `as_str` /
//! `from_str` convert in both directions.

use serde::{Deserialize, Serialize};

/// Kind of repository hosted on the hub
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    Model,
    Dataset,
    Code,
}

impl RepoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::Model => "model",
            RepoType::Dataset => "dataset",
            RepoType::Code => "code",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "model" => Some(RepoType::Model),
            "dataset" => Some(RepoType::Dataset),
            "code" => Some(RepoType::Code),
            _ => None,
        }
    }

    /// Owner prefix used on the git server, e.g. `models_alice`
    pub fn git_owner(&self, namespace: &str) -> String {
        format!("{}s_{}", self.as_str(), namespace)
    }
}

impl std::fmt::Display for RepoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a local mirror row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStatus {
    Waiting,
    Running,
    Finished,
    Failed,
    Incomplete,
}

impl MirrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorStatus::Waiting => "waiting",
            MirrorStatus::Running => "running",
            MirrorStatus::Finished => "finished",
            MirrorStatus::Failed => "failed",
            MirrorStatus::Incomplete => "incomplete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(MirrorStatus::Waiting),
            "running" => Some(MirrorStatus::Running),
            "finished" => Some(MirrorStatus::Finished),
            "failed" => Some(MirrorStatus::Failed),
            "incomplete" => Some(MirrorStatus::Incomplete),
            _ => None,
        }
    }

    /// Statuses the progress tracker keeps polling
    pub fn pollable() -> [MirrorStatus; 3] {
        [MirrorStatus::Waiting, MirrorStatus::Running, MirrorStatus::Incomplete]
    }
}

/// Sync status shown on the owning repository
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "in_progress" => Some(SyncStatus::InProgress),
            "completed" => Some(SyncStatus::Completed),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// Where a repository came from
pub mod repo_source {
    pub const LOCAL: &str = "local";
    pub const MIRROR: &str = "mirror";
    pub const MULTI_SYNC: &str = "multi_sync";
}

/// Priority handed to the mirror backend for newly requested mirrors
pub const ASAP_MIRROR_PRIORITY: i32 = 3;
