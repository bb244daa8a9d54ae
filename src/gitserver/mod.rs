//! Git server interface.
//!
//! The replication core only needs three things from the git server: list
//! one directory level of a tree, read a repository's clone URLs, and create
//! an empty repository. Recursion over directories is the caller's job.

mod gitea;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::RepoType;

pub use gitea::GiteaClient;

pub const ENTRY_TYPE_DIR: &str = "dir";
pub const ENTRY_TYPE_FILE: &str = "file";

/// One directory level of a repository tree
#[derive(Debug, Clone)]
pub struct TreeRequest {
    pub repo_type: RepoType,
    pub namespace: String,
    pub name: String,
    pub git_ref: String,
    /// Directory to list; empty for the root
    pub path: String,
}

/// An entry returned by a tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    /// "dir" or "file"
    #[serde(rename = "type")]
    pub entry_type: String,
    pub size: i64,
    pub sha: String,
    /// `<oid[0:2]>/<oid[2:4]>/<oid[4:]>` for LFS pointers, empty otherwise
    #[serde(default)]
    pub lfs_relative_path: String,
}

impl TreeEntry {
    pub fn is_dir(&self) -> bool {
        self.entry_type == ENTRY_TYPE_DIR
    }

    pub fn is_lfs(&self) -> bool {
        !self.lfs_relative_path.is_empty()
    }
}

/// Clone URLs and defaults of a repository on the git server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitRepoInfo {
    pub http_clone_url: String,
    pub ssh_clone_url: String,
    pub default_branch: String,
}

#[derive(Debug, Clone)]
pub struct CreateGitRepoRequest {
    pub repo_type: RepoType,
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub private: bool,
    pub default_branch: String,
}

#[async_trait]
pub trait GitServer: Send + Sync {
    /// List a single directory level
    async fn get_repo_file_tree(&self, req: &TreeRequest) -> Result<Vec<TreeEntry>>;

    async fn get_repo_info(&self, repo_type: RepoType, namespace: &str, name: &str) -> Result<GitRepoInfo>;

    async fn create_repo(&self, req: &CreateGitRepoRequest) -> Result<GitRepoInfo>;
}
