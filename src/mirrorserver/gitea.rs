//! On-premise mirror backend: Gitea migrations tracked as numbered tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CreateMirrorRequest, CreatePushMirrorRequest, MirrorServer, MirrorTaskInfo, MirrorTaskStatus};
use crate::error::{Result, ServerError};
use crate::http::{expect_success, join_url};

/// Gitea's integer task states
fn task_status_from_code(code: i32) -> MirrorTaskStatus {
    match code {
        0 => MirrorTaskStatus::Queued,
        1 => MirrorTaskStatus::Running,
        4 => MirrorTaskStatus::Finished,
        // 2 = stopped, 3 = failed, anything unknown is not going to finish
        _ => MirrorTaskStatus::Failed,
    }
}

#[derive(Debug, Serialize)]
struct MigrateBody<'a> {
    clone_addr: &'a str,
    repo_owner: &'a str,
    repo_name: &'a str,
    mirror: bool,
    private: bool,
    lfs: bool,
    service: &'a str,
}

#[derive(Debug, Deserialize)]
struct MigrateResponse {
    mirror_task_id: i64,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    status: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct PushMirrorBody<'a> {
    remote_address: &'a str,
    remote_username: &'a str,
    remote_password: &'a str,
    interval: &'a str,
    sync_on_commit: bool,
}

pub struct GiteaMirrorServer {
    http: reqwest::Client,
    base_url: String,
    token: String,
    /// Owner of every mirror repository on the backend
    owner: String,
}

impl GiteaMirrorServer {
    pub fn new(http: reqwest::Client, base_url: String, token: String, owner: String) -> Self {
        Self {
            http,
            base_url,
            token,
            owner,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("token {}", self.token))
    }
}

#[async_trait]
impl MirrorServer for GiteaMirrorServer {
    async fn create_mirror_repo(&self, req: &CreateMirrorRequest) -> Result<i64> {
        let url = join_url(&self.base_url, "api/v1/repos/migrate");
        let body = MigrateBody {
            clone_addr: &req.clone_url,
            repo_owner: &req.namespace,
            repo_name: &req.name,
            mirror: true,
            private: req.private,
            lfs: req.sync_lfs,
            service: "git",
        };

        let resp = self.authorize(self.http.post(&url).json(&body)).send().await?;
        let resp = expect_success(resp, "create mirror repo")
            .await
            .map_err(ServerError::MirrorBackend)?;

        let migrated: MigrateResponse = resp.json().await?;
        Ok(migrated.mirror_task_id)
    }

    async fn get_mirror_task_info(&self, task_id: i64) -> Result<MirrorTaskInfo> {
        let url = join_url(&self.base_url, &format!("api/v1/tasks/{}", task_id));

        let resp = self.authorize(self.http.get(&url)).send().await?;
        let resp = expect_success(resp, "get mirror task")
            .await
            .map_err(ServerError::MirrorBackend)?;

        let task: TaskResponse = resp.json().await?;
        Ok(MirrorTaskInfo {
            status: task_status_from_code(task.status),
            message: task.message,
        })
    }

    async fn create_push_mirror(&self, req: &CreatePushMirrorRequest) -> Result<()> {
        let url = join_url(
            &self.base_url,
            &format!("api/v1/repos/{}/{}/push_mirrors", self.owner, req.name),
        );
        let body = PushMirrorBody {
            remote_address: &req.push_url,
            remote_username: &req.username,
            remote_password: &req.access_token,
            interval: &req.interval,
            sync_on_commit: false,
        };

        let resp = self.authorize(self.http.post(&url).json(&body)).send().await?;
        expect_success(resp, "create push mirror")
            .await
            .map_err(ServerError::MirrorBackend)?;
        Ok(())
    }
}
