//! SaaS mirror backend: the hosted mirror service with string task states.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CreateMirrorRequest, CreatePushMirrorRequest, MirrorServer, MirrorTaskInfo, MirrorTaskStatus};
use crate::error::{Result, ServerError};
use crate::http::{expect_success, join_url};

fn task_status_from_str(status: &str) -> Option<MirrorTaskStatus> {
    match status {
        "queued" | "waiting" => Some(MirrorTaskStatus::Queued),
        "running" => Some(MirrorTaskStatus::Running),
        "failed" | "fatal" | "cancelled" => Some(MirrorTaskStatus::Failed),
        "finished" => Some(MirrorTaskStatus::Finished),
        _ => None,
    }
}

/// Every SaaS response is wrapped in `{"msg": ..., "data": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct CreateMirrorBody<'a> {
    namespace: &'a str,
    name: &'a str,
    source_url: &'a str,
    private: bool,
    sync_lfs: bool,
}

#[derive(Debug, Deserialize)]
struct CreateMirrorData {
    task_id: i64,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct PushMirrorBody<'a> {
    name: &'a str,
    push_url: &'a str,
    username: &'a str,
    access_token: &'a str,
    interval: &'a str,
}

pub struct SaasMirrorServer {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SaasMirrorServer {
    pub fn new(http: reqwest::Client, base_url: String, token: String) -> Self {
        Self { http, base_url, token }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.token)
    }
}

#[async_trait]
impl MirrorServer for SaasMirrorServer {
    async fn create_mirror_repo(&self, req: &CreateMirrorRequest) -> Result<i64> {
        let url = join_url(&self.base_url, "api/v1/mirror/repos");
        let body = CreateMirrorBody {
            namespace: &req.namespace,
            name: &req.name,
            source_url: &req.clone_url,
            private: req.private,
            sync_lfs: req.sync_lfs,
        };

        let resp = self.authorize(self.http.post(&url).json(&body)).send().await?;
        let resp = expect_success(resp, "create mirror repo")
            .await
            .map_err(ServerError::MirrorBackend)?;

        let created: Envelope<CreateMirrorData> = resp.json().await?;
        Ok(created.data.task_id)
    }

    async fn get_mirror_task_info(&self, task_id: i64) -> Result<MirrorTaskInfo> {
        let url = join_url(&self.base_url, &format!("api/v1/mirror/tasks/{}", task_id));

        let resp = self.authorize(self.http.get(&url)).send().await?;
        let resp = expect_success(resp, "get mirror task")
            .await
            .map_err(ServerError::MirrorBackend)?;

        let task: Envelope<TaskData> = resp.json().await?;
        let status = task_status_from_str(&task.data.status).ok_or_else(|| {
            ServerError::MirrorBackend(format!("unknown mirror task status {:?}", task.data.status))
        })?;
        Ok(MirrorTaskInfo {
            status,
            message: task.data.message,
        })
    }

    async fn create_push_mirror(&self, req: &CreatePushMirrorRequest) -> Result<()> {
        let url = join_url(&self.base_url, "api/v1/mirror/push_mirrors");
        let body = PushMirrorBody {
            name: &req.name,
            push_url: &req.push_url,
            username: &req.username,
            access_token: &req.access_token,
            interval: &req.interval,
        };

        let resp = self.authorize(self.http.post(&url).json(&body)).send().await?;
        expect_success(resp, "create push mirror")
            .await
            .map_err(ServerError::MirrorBackend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_strings() {
        assert_eq!(task_status_from_str("queued"), Some(MirrorTaskStatus::Queued));
        assert_eq!(task_status_from_str("running"), Some(MirrorTaskStatus::Running));
        assert_eq!(task_status_from_str("fatal"), Some(MirrorTaskStatus::Failed));
        assert_eq!(task_status_from_str("finished"), Some(MirrorTaskStatus::Finished));
        assert_eq!(task_status_from_str("exploded"), None);
    }

    #[test]
    fn test_envelope_parsing() {
        let json = r#"{"msg": "OK", "data": {"status": "running", "message": "lfs 3/4"}}"#;
        let task: Envelope<TaskData> = serde_json::from_str(json).unwrap();
        assert_eq!(task.data.status, "running");
        assert_eq!(task.data.message, "lfs 3/4");
    }
}
