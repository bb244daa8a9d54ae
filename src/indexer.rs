//! Repository file-tree indexing.
//!
//! Walks a repository tree one directory level at a time through the git
//! server and records every file in `repository_files`. Indexing is
//! additive: existing rows are skipped and rows for files deleted upstream
//! are left in place.

use std::collections::HashSet;
use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::db::entities::{repository, repository_file};
use crate::db::store::{find_repo_by_path, now_secs};
use crate::error::{Result, ServerError};
use crate::gitserver::{GitServer, TreeEntry, TreeRequest};
use crate::types::RepoType;

/// Repositories fetched per page in batch mode
pub const INDEX_BATCH_SIZE: u64 = 10;

/// Flatten a repository tree into its non-directory entries.
///
/// Uses an explicit worklist rather than recursion; the order of the
/// returned files is unspecified.
pub async fn list_repo_files(
    git: &dyn GitServer,
    repo_type: RepoType,
    namespace: &str,
    name: &str,
    git_ref: &str,
) -> Result<Vec<TreeEntry>> {
    let mut pending = vec![String::new()];
    let mut visited = HashSet::new();
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let entries = git
            .get_repo_file_tree(&TreeRequest {
                repo_type,
                namespace: namespace.to_string(),
                name: name.to_string(),
                git_ref: git_ref.to_string(),
                path: dir,
            })
            .await?;

        for entry in entries {
            if entry.is_dir() {
                pending.push(entry.path);
            } else {
                files.push(entry);
            }
        }
    }

    Ok(files)
}

pub struct RepoFileIndexer {
    db: Arc<DatabaseConnection>,
    git: Arc<dyn GitServer>,
}

impl RepoFileIndexer {
    pub fn new(db: Arc<DatabaseConnection>, git: Arc<dyn GitServer>) -> Self {
        Self { db, git }
    }

    /// Index a single repository, returning how many rows were inserted
    pub async fn index_one(&self, repo_type: RepoType, namespace: &str, name: &str) -> Result<usize> {
        let repo = find_repo_by_path(&self.db, repo_type, namespace, name)
            .await?
            .ok_or_else(|| ServerError::RepoNotFound(format!("{}/{}/{}", repo_type, namespace, name)))?;
        self.index_repository(&repo).await
    }

    async fn index_repository(&self, repo: &repository::Model) -> Result<usize> {
        let repo_type = RepoType::from_str(&repo.repository_type).ok_or_else(|| {
            ServerError::Internal(format!("repository {} has unknown type {}", repo.id, repo.repository_type))
        })?;
        let (namespace, name) = repo.namespace_and_name();

        let files = list_repo_files(self.git.as_ref(), repo_type, namespace, name, &repo.default_branch).await?;

        let mut inserted = 0;
        for file in files {
            let existing = repository_file::Entity::find()
                .filter(repository_file::Column::RepositoryId.eq(repo.id))
                .filter(repository_file::Column::Path.eq(file.path.as_str()))
                .filter(repository_file::Column::FileType.eq(file.entry_type.as_str()))
                .filter(repository_file::Column::Branch.eq(repo.default_branch.as_str()))
                .one(self.db.as_ref())
                .await;

            match existing {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(repo_id = repo.id, path = %file.path, error = %e, "failed to check repository file, skipping");
                    continue;
                }
            }

            repository_file::ActiveModel {
                repository_id: Set(repo.id),
                path: Set(file.path),
                file_type: Set(file.entry_type),
                size: Set(file.size),
                commit_sha: Set(file.sha),
                lfs_relative_path: Set(file.lfs_relative_path),
                branch: Set(repo.default_branch.clone()),
                created_at: Set(now_secs()),
                ..Default::default()
            }
            .insert(self.db.as_ref())
            .await?;
            inserted += 1;
        }

        tracing::debug!(repo_id = repo.id, path = %repo.path, inserted, "indexed repository files");
        Ok(inserted)
    }

    /// Index every repository of a type with an id above `last_repo_id`.
    ///
    /// At most `concurrency` repositories are indexed at once. A repository
    /// that fails to index is logged and skipped.
    pub async fn index_batch(self: &Arc<Self>, repo_type: RepoType, last_repo_id: i64, concurrency: usize) -> Result<()> {
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut cursor = last_repo_id;

        loop {
            let page = repository::Entity::find()
                .filter(repository::Column::RepositoryType.eq(repo_type.as_str()))
                .filter(repository::Column::Id.gt(cursor))
                .order_by_asc(repository::Column::Id)
                .limit(INDEX_BATCH_SIZE)
                .all(self.db.as_ref())
                .await?;

            let page_len = page.len() as u64;
            if let Some(last) = page.last() {
                cursor = last.id;
            }

            let mut workers = JoinSet::new();
            for repo in page {
                let permit = Arc::clone(&permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| ServerError::Internal(format!("index worker pool closed: {}", e)))?;
                let indexer = Arc::clone(self);
                workers.spawn(async move {
                    if let Err(e) = indexer.index_repository(&repo).await {
                        tracing::error!(repo_id = repo.id, path = %repo.path, error = %e, "failed to index repository");
                    }
                    drop(permit);
                });
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "index worker panicked");
                }
            }

            tracing::info!(repo_type = %repo_type, cursor, page_len, "indexed repository page");
            if page_len < INDEX_BATCH_SIZE {
                break;
            }
        }

        Ok(())
    }
}
