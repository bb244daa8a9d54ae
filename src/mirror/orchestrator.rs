use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use super::MirrorComponent;
use crate::db::entities::{git_server_access_token, mirror, mirror_source};
use crate::db::store::{self, find_repo_by_path, find_user, NewRepository};
use crate::error::{Result, ServerError};
use crate::gitserver::CreateGitRepoRequest;
use crate::mirrorserver::CreateMirrorRequest;
use crate::types::{repo_source, MirrorStatus, RepoType, SyncStatus, ASAP_MIRROR_PRIORITY};

fn default_branch() -> String {
    "main".to_string()
}

fn default_sync_lfs() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMirrorRepoRequest {
    pub source_namespace: String,
    pub source_name: String,
    pub repo_type: RepoType,
    pub source_git_clone_url: String,
    pub mirror_source_id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_sync_lfs")]
    pub sync_lfs: bool,
}

impl CreateMirrorRepoRequest {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("source_namespace", &self.source_namespace),
            ("source_name", &self.source_name),
            ("source_git_clone_url", &self.source_git_clone_url),
        ] {
            if value.trim().is_empty() {
                return Err(ServerError::InvalidRequest(format!("{} is required", field)));
            }
        }
        if self.source_namespace.contains('/') || self.source_name.contains('/') {
            return Err(ServerError::InvalidRequest(
                "source namespace and name must not contain '/'".to_string(),
            ));
        }
        Ok(())
    }
}

impl MirrorComponent {
    /// Pick a free local name: the source name, then `{namespace}_{name}`
    async fn available_name(&self, req: &CreateMirrorRepoRequest, namespace: &str) -> Result<String> {
        let candidates = [
            req.source_name.clone(),
            format!("{}_{}", req.source_namespace, req.source_name),
        ];
        for candidate in candidates {
            if find_repo_by_path(&self.db, req.repo_type, namespace, &candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(ServerError::DuplicateRepo(format!(
            "{} {}/{} already mirrored into {} as {}_{}",
            req.repo_type, req.source_namespace, req.source_name, namespace, req.source_namespace, req.source_name
        )))
    }

    /// Create a private shadow repository and start an inbound mirror task
    /// for it.
    ///
    /// The mirror row is written only once the backend has accepted the
    /// task, so every persisted mirror has a task id.
    pub async fn create_mirror_repo(&self, req: CreateMirrorRepoRequest) -> Result<mirror::Model> {
        req.validate()?;

        let namespace = self.config.target_namespace(&req.source_namespace).to_string();
        let name = self.available_name(&req, &namespace).await?;

        let owner = find_user(&self.db, &namespace)
            .await?
            .ok_or_else(|| ServerError::NamespaceNotFound(namespace.clone()))?;

        let source = mirror_source::Entity::find_by_id(req.mirror_source_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServerError::InvalidRequest(format!("mirror source {} does not exist", req.mirror_source_id))
            })?;

        let git_repo = self
            .git
            .create_repo(&CreateGitRepoRequest {
                repo_type: req.repo_type,
                namespace: namespace.clone(),
                name: name.clone(),
                description: req.description.clone(),
                private: true,
                default_branch: req.default_branch.clone(),
            })
            .await?;

        let repo = store::create_repository(
            &self.db,
            NewRepository {
                description: req.description.clone(),
                private: true,
                license: req.license.clone(),
                default_branch: req.default_branch.clone(),
                source: repo_source::MIRROR.to_string(),
                sync_status: SyncStatus::Pending,
                ..NewRepository::new(owner.id, req.repo_type, &namespace, &name)
            },
        )
        .await?;
        tracing::info!(repo_id = repo.id, path = %repo.path, "Created mirror shadow repository");

        store::create_typed_entity(&self.db, req.repo_type, repo.id, None).await?;

        let token = git_server_access_token::Entity::find()
            .filter(git_server_access_token::Column::TokenType.eq(git_server_access_token::TOKEN_TYPE_GIT))
            .order_by_desc(git_server_access_token::Column::Id)
            .one(self.db.as_ref())
            .await?
            .ok_or(ServerError::MissingPushToken)?;

        let local_repo_path = format!(
            "{}_{}_{}_{}",
            source.source_name, req.repo_type, req.source_namespace, req.source_name
        );

        let task_id = self
            .backend
            .create_mirror_repo(&CreateMirrorRequest {
                namespace: self.config.namespace.clone(),
                name: local_repo_path.clone(),
                clone_url: req.source_git_clone_url.clone(),
                private: true,
                sync_lfs: req.sync_lfs,
            })
            .await?;

        let now = store::now_secs();
        let created = mirror::ActiveModel {
            repository_id: Set(repo.id),
            mirror_source_id: Set(source.id),
            source_url: Set(req.source_git_clone_url),
            push_url: Set(git_repo.http_clone_url),
            username: Set(req.source_namespace.clone()),
            push_username: Set(token.username),
            push_access_token: Set(token.token),
            local_repo_path: Set(local_repo_path),
            source_repo_path: Set(format!("{}/{}", req.source_namespace, req.source_name)),
            mirror_task_id: Set(task_id),
            priority: Set(ASAP_MIRROR_PRIORITY),
            status: Set(MirrorStatus::Waiting.as_str().to_string()),
            progress: Set(0),
            last_message: Set(String::new()),
            push_mirror_created: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        tracing::info!(
            mirror_id = created.id,
            task_id,
            source = %created.source_repo_path,
            target = %repo.path,
            "Created mirror"
        );
        Ok(created)
    }
}
