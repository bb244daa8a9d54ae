//! Gitea-flavoured REST client for the git server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CreateGitRepoRequest, GitRepoInfo, GitServer, TreeEntry, TreeRequest, ENTRY_TYPE_DIR, ENTRY_TYPE_FILE};
use crate::error::{Result, ServerError};
use crate::http::{expect_success, join_url};
use crate::storage::lfs_relative_path;
use crate::types::RepoType;

/// Entry of `GET /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    lfs_relative_path: Option<String>,
    /// Sent by servers that expose the LFS pointer but not the storage key
    #[serde(default)]
    lfs_oid: Option<String>,
}

impl From<ContentEntry> for TreeEntry {
    fn from(entry: ContentEntry) -> Self {
        // symlinks and submodules are leaves as far as indexing goes
        let entry_type = if entry.kind == ENTRY_TYPE_DIR || entry.kind == "tree" {
            ENTRY_TYPE_DIR
        } else {
            ENTRY_TYPE_FILE
        };
        TreeEntry {
            name: entry.name,
            path: entry.path.trim_start_matches('/').to_string(),
            entry_type: entry_type.to_string(),
            size: entry.size,
            sha: entry.sha,
            lfs_relative_path: entry
                .lfs_relative_path
                .filter(|p| !p.is_empty())
                .or_else(|| entry.lfs_oid.as_deref().and_then(lfs_relative_path))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    #[serde(default)]
    clone_url: String,
    #[serde(default)]
    ssh_url: String,
    #[serde(default)]
    default_branch: String,
}

impl From<RepoResponse> for GitRepoInfo {
    fn from(repo: RepoResponse) -> Self {
        GitRepoInfo {
            http_clone_url: repo.clone_url,
            ssh_clone_url: repo.ssh_url,
            default_branch: repo.default_branch,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRepoBody<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    default_branch: &'a str,
}

pub struct GiteaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GiteaClient {
    pub fn new(http: reqwest::Client, base_url: String, token: String) -> Self {
        Self { http, base_url, token }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.header("Authorization", format!("token {}", self.token))
        }
    }
}

#[async_trait]
impl GitServer for GiteaClient {
    async fn get_repo_file_tree(&self, req: &TreeRequest) -> Result<Vec<TreeEntry>> {
        let owner = req.repo_type.git_owner(&req.namespace);
        let path = req.path.trim_matches('/');
        let url = if path.is_empty() {
            self.url(&format!("api/v1/repos/{}/{}/contents", owner, req.name))
        } else {
            self.url(&format!("api/v1/repos/{}/{}/contents/{}", owner, req.name, path))
        };

        let resp = self
            .authorize(self.http.get(&url).query(&[("ref", req.git_ref.as_str())]))
            .send()
            .await?;
        let resp = expect_success(resp, "list repo tree")
            .await
            .map_err(ServerError::GitServer)?;

        let entries: Vec<ContentEntry> = resp.json().await?;
        Ok(entries.into_iter().map(TreeEntry::from).collect())
    }

    async fn get_repo_info(&self, repo_type: RepoType, namespace: &str, name: &str) -> Result<GitRepoInfo> {
        let owner = repo_type.git_owner(namespace);
        let url = self.url(&format!("api/v1/repos/{}/{}", owner, name));

        let resp = self.authorize(self.http.get(&url)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServerError::RepoNotFound(format!("{}/{}", owner, name)));
        }
        let resp = expect_success(resp, "get repo info")
            .await
            .map_err(ServerError::GitServer)?;

        let repo: RepoResponse = resp.json().await?;
        Ok(repo.into())
    }

    async fn create_repo(&self, req: &CreateGitRepoRequest) -> Result<GitRepoInfo> {
        let owner = req.repo_type.git_owner(&req.namespace);
        let url = self.url(&format!("api/v1/orgs/{}/repos", owner));
        let body = CreateRepoBody {
            name: &req.name,
            description: &req.description,
            private: req.private,
            default_branch: &req.default_branch,
        };

        let resp = self.authorize(self.http.post(&url).json(&body)).send().await?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(ServerError::DuplicateRepo(format!("{}/{}", owner, req.name)));
        }
        let resp = expect_success(resp, "create repo")
            .await
            .map_err(ServerError::GitServer)?;

        let repo: RepoResponse = resp.json().await?;
        Ok(repo.into())
    }
}
