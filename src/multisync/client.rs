//! Pull side of the multi-sync protocol.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::types::{PeerFile, PeerRepo, PeerResponse, SyncVersion, SyncVersionPage};
use crate::error::{Result, ServerError};
use crate::http::{expect_success, join_url};

/// A remote hub instance this one replicates from
#[async_trait]
pub trait SyncPeer: Send + Sync {
    /// Versions strictly after `cursor`, oldest first
    async fn latest(&self, cursor: i64) -> Result<SyncVersionPage>;

    async fn model_info(&self, v: &SyncVersion) -> Result<PeerRepo>;

    async fn dataset_info(&self, v: &SyncVersion) -> Result<PeerRepo>;

    async fn code_info(&self, v: &SyncVersion) -> Result<PeerRepo>;

    async fn read_me_data(&self, v: &SyncVersion) -> Result<String>;

    async fn file_list(&self, v: &SyncVersion) -> Result<Vec<PeerFile>>;
}

/// `SyncPeer` over the peer's REST API with bearer-token auth
pub struct HttpSyncPeer {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpSyncPeer {
    pub fn new(http: reqwest::Client, endpoint: String, token: String) -> Self {
        Self { http, endpoint, token }
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let url = join_url(&self.endpoint, path);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = expect_success(resp, what).await.map_err(ServerError::Peer)?;
        let body: PeerResponse<T> = resp
            .json()
            .await
            .map_err(|e| ServerError::Peer(format!("{}: malformed response: {}", what, e)))?;
        Ok(body.data)
    }
}

/// Split a peer repo path into the namespace and name parts of a URL
fn repo_segments(v: &SyncVersion) -> (&str, &str) {
    v.repo_path.split_once('/').unwrap_or((v.repo_path.as_str(), ""))
}

#[async_trait]
impl SyncPeer for HttpSyncPeer {
    async fn latest(&self, cursor: i64) -> Result<SyncVersionPage> {
        self.get_data(&format!("api/v1/sync/version/latest?cur={}", cursor), "get latest versions")
            .await
    }

    async fn model_info(&self, v: &SyncVersion) -> Result<PeerRepo> {
        let (namespace, name) = repo_segments(v);
        self.get_data(&format!("api/v1/models/{}/{}", namespace, name), "get model info")
            .await
    }

    async fn dataset_info(&self, v: &SyncVersion) -> Result<PeerRepo> {
        let (namespace, name) = repo_segments(v);
        self.get_data(&format!("api/v1/datasets/{}/{}", namespace, name), "get dataset info")
            .await
    }

    async fn code_info(&self, v: &SyncVersion) -> Result<PeerRepo> {
        let (namespace, name) = repo_segments(v);
        self.get_data(&format!("api/v1/codes/{}/{}", namespace, name), "get code info")
            .await
    }

    async fn read_me_data(&self, v: &SyncVersion) -> Result<String> {
        let (namespace, name) = repo_segments(v);
        self.get_data(
            &format!("api/v1/{}s/{}/{}/raw/README.md", v.repo_type, namespace, name),
            "get readme",
        )
        .await
    }

    async fn file_list(&self, v: &SyncVersion) -> Result<Vec<PeerFile>> {
        let (namespace, name) = repo_segments(v);
        self.get_data(
            &format!("api/v1/{}s/{}/{}/all_files", v.repo_type, namespace, name),
            "get file list",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_segments() {
        let v = SyncVersion {
            version: 1,
            source_id: 1,
            repo_path: "THUDM/chatglm3-6b".to_string(),
            repo_type: "model".to_string(),
            last_modified_at: String::new(),
            change_log: String::new(),
        };
        assert_eq!(repo_segments(&v), ("THUDM", "chatglm3-6b"));

        let bare = SyncVersion {
            repo_path: "orphan".to_string(),
            ..v
        };
        assert_eq!(repo_segments(&bare), ("orphan", ""));
    }
}
