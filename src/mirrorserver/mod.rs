//! Mirror backend interface.
//!
//! Two backends exist: the on-premise Gitea task API and the SaaS mirror
//! service. They speak different wire formats but report the same four task
//! states, so everything above this module sees one `MirrorServer`.

mod gitea;
mod saas;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::MirrorConfig;
use crate::error::Result;

pub use gitea::GiteaMirrorServer;
pub use saas::SaasMirrorServer;

/// State of an inbound mirror task on the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorTaskStatus {
    Queued,
    Running,
    Failed,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTaskInfo {
    pub status: MirrorTaskStatus,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CreateMirrorRequest {
    pub namespace: String,
    pub name: String,
    pub clone_url: String,
    pub private: bool,
    pub sync_lfs: bool,
}

#[derive(Debug, Clone)]
pub struct CreatePushMirrorRequest {
    pub name: String,
    pub push_url: String,
    pub username: String,
    pub access_token: String,
    /// Go-style duration string, e.g. "8h0m0s"
    pub interval: String,
}

#[async_trait]
pub trait MirrorServer: Send + Sync {
    /// Start an inbound mirror, returning the backend task id
    async fn create_mirror_repo(&self, req: &CreateMirrorRequest) -> Result<i64>;

    async fn get_mirror_task_info(&self, task_id: i64) -> Result<MirrorTaskInfo>;

    async fn create_push_mirror(&self, req: &CreatePushMirrorRequest) -> Result<()>;
}

/// Pick the backend named by the `saas` flag
pub fn from_config(http: reqwest::Client, config: &MirrorConfig) -> Arc<dyn MirrorServer> {
    if config.saas {
        tracing::info!("Using SaaS mirror backend at {}", config.server_url);
        Arc::new(SaasMirrorServer::new(http, config.server_url.clone(), config.server_token.clone()))
    } else {
        tracing::info!("Using Gitea mirror backend at {}", config.server_url);
        Arc::new(GiteaMirrorServer::new(
            http,
            config.server_url.clone(),
            config.server_token.clone(),
            config.namespace.clone(),
        ))
    }
}
