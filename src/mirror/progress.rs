use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set};

use super::status::{map_task_status, progress_percent};
use super::MirrorComponent;
use crate::db::entities::{mirror, repository};
use crate::db::store::now_secs;
use crate::error::{Result, ServerError};
use crate::indexer::list_repo_files;
use crate::mirrorserver::MirrorTaskStatus;
use crate::storage::{namespaces, StorageError};
use crate::types::{MirrorStatus, RepoType};

impl MirrorComponent {
    /// Poll every non-terminal mirror once and record its status and
    /// progress. A mirror that fails to update is logged and skipped.
    pub async fn check_mirror_progress(&self) -> Result<()> {
        let pollable: Vec<&str> = MirrorStatus::pollable().iter().map(|s| s.as_str()).collect();
        let mirrors = mirror::Entity::find()
            .filter(mirror::Column::Status.is_in(pollable))
            .order_by_asc(mirror::Column::Id)
            .all(self.db.as_ref())
            .await?;

        tracing::debug!(count = mirrors.len(), "Checking mirror progress");
        for m in mirrors {
            if let Err(e) = self.check_one_mirror(m.clone()).await {
                tracing::error!(
                    mirror_id = m.id,
                    task_id = m.mirror_task_id,
                    error = %e,
                    "Failed to update mirror progress"
                );
            }
        }
        Ok(())
    }

    async fn check_one_mirror(&self, m: mirror::Model) -> Result<()> {
        let task = self.backend.get_mirror_task_info(m.mirror_task_id).await?;

        let repo = repository::Entity::find_by_id(m.repository_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServerError::RepoNotFound(format!("repository {}", m.repository_id)))?;

        let progress = match task.status {
            MirrorTaskStatus::Running | MirrorTaskStatus::Finished => self.count_mirror_progress(&repo).await?,
            MirrorTaskStatus::Queued | MirrorTaskStatus::Failed => m.progress,
        };
        let (mirror_status, sync_status) = map_task_status(task.status, progress);

        let mirror_id = m.id;
        let mut active = m.into_active_model();
        active.status = Set(mirror_status.as_str().to_string());
        active.progress = Set(progress);
        active.last_message = Set(task.message);
        active.updated_at = Set(now_secs());
        active.update(self.db.as_ref()).await?;

        let backfill = task.status == MirrorTaskStatus::Finished && repo.http_clone_url.is_empty();
        let clone_urls = if backfill {
            let repo_type = RepoType::from_str(&repo.repository_type).ok_or_else(|| {
                ServerError::Internal(format!("repository {} has unknown type {}", repo.id, repo.repository_type))
            })?;
            let (namespace, name) = repo.namespace_and_name();
            Some(self.git.get_repo_info(repo_type, namespace, name).await?)
        } else {
            None
        };

        let repo_id = repo.id;
        let mut repo_active = repo.into_active_model();
        if let Some(info) = clone_urls {
            repo_active.http_clone_url = Set(info.http_clone_url);
            repo_active.ssh_clone_url = Set(info.ssh_clone_url);
        }
        repo_active.sync_status = Set(sync_status.as_str().to_string());
        repo_active.updated_at = Set(now_secs());
        repo_active.update(self.db.as_ref()).await?;

        tracing::debug!(
            mirror_id,
            repo_id,
            status = mirror_status.as_str(),
            progress,
            "Updated mirror progress"
        );
        Ok(())
    }

    /// Percentage of a repository's LFS objects present in the blob store.
    ///
    /// A repository without LFS files is complete as soon as the git
    /// content has been pushed.
    pub async fn count_mirror_progress(&self, repo: &repository::Model) -> Result<i32> {
        let repo_type = RepoType::from_str(&repo.repository_type).ok_or_else(|| {
            ServerError::Internal(format!("repository {} has unknown type {}", repo.id, repo.repository_type))
        })?;
        let (namespace, name) = repo.namespace_and_name();

        let files = list_repo_files(self.git.as_ref(), repo_type, namespace, name, &repo.default_branch).await?;
        let lfs_files: Vec<_> = files.into_iter().filter(|f| f.is_lfs()).collect();
        if lfs_files.is_empty() {
            return Ok(100);
        }

        let mut present = 0;
        for file in &lfs_files {
            match self.storage.exists(namespaces::LFS, &file.lfs_relative_path).await {
                Ok(true) => present += 1,
                // Not synced yet
                Ok(false) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(progress_percent(present, lfs_files.len()))
    }
}
