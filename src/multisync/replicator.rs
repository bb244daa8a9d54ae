//! Version-cursor replication of a peer's catalog.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use sha2::{Digest, Sha256};

use super::client::SyncPeer;
use super::types::{PeerFile, PeerRepo, SyncVersion, SyncVersionPage};
use crate::config::MultiSyncConfig;
use crate::db::entities::{file, sync_version, tag};
use crate::db::store::{
    self, add_repository_tag, find_or_create_tag, find_or_create_user, find_repo_by_path, is_unique_violation,
    NewRepository,
};
use crate::error::{Result, ServerError};
use crate::types::{repo_source, RepoType, SyncStatus};

const PAGE_PULL_TIMEOUT: Duration = Duration::from_secs(60);
const INFO_TIMEOUT: Duration = Duration::from_secs(10);
const CREATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest page served to downstream peers
pub const MAX_PAGE_LIMIT: u64 = 100;

async fn with_timeout<T>(limit: Duration, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ServerError::Peer(format!("{} timed out after {:?}", what, limit)))?
}

/// Opaque stand-in for a synced user's email; never a deliverable address
fn synthetic_email(username: &str, peer_email: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}", username, peer_email).as_bytes());
    format!("{:x}", digest)
}

pub struct MultiSyncComponent {
    db: Arc<DatabaseConnection>,
    config: MultiSyncConfig,
}

impl MultiSyncComponent {
    pub fn new(db: Arc<DatabaseConnection>, config: MultiSyncConfig) -> Self {
        Self { db, config }
    }

    /// Highest version stored locally, 0 if none
    pub async fn current_version(&self) -> Result<i64> {
        let latest = sync_version::Entity::find()
            .order_by_desc(sync_version::Column::Version)
            .one(self.db.as_ref())
            .await?;
        Ok(latest.map(|v| v.version).unwrap_or(0))
    }

    /// Stored versions strictly after `cursor`, oldest first
    pub async fn more(&self, cursor: i64, limit: u64) -> Result<Vec<SyncVersion>> {
        let rows = sync_version::Entity::find()
            .filter(sync_version::Column::Version.gt(cursor))
            .order_by_asc(sync_version::Column::Version)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(SyncVersion::from).collect())
    }

    /// A page for downstream peers, with `has_more` set when versions
    /// remain past the page
    pub async fn latest_page(&self, cursor: i64, limit: u64) -> Result<SyncVersionPage> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let mut versions = self.more(cursor, limit + 1).await?;
        let has_more = versions.len() as u64 > limit;
        versions.truncate(limit as usize);
        Ok(SyncVersionPage { versions, has_more })
    }

    /// Pull every version after the local cursor from `peer`, then
    /// materialize the repositories named by every version not yet
    /// completed, including ones left over from earlier runs.
    ///
    /// A failed page pull or version write aborts the sync without moving
    /// the cursor past it. Failures on individual versions are logged and retried on the
    /// next sync.
    pub async fn sync_as_client(&self, peer: &dyn SyncPeer) -> Result<()> {
        if !self.config.enabled {
            tracing::debug!("Multi-sync disabled, skipping");
            return Ok(());
        }

        let mut cursor = self.current_version().await?;
        tracing::info!(cursor, "Starting multi-sync");

        loop {
            let page = with_timeout(PAGE_PULL_TIMEOUT, "pull versions", peer.latest(cursor))
                .await
                .map_err(|e| {
                    tracing::error!(cursor, error = %e, "Failed to pull versions from peer");
                    e
                })?;

            for v in &page.versions {
                self.record_version(v).await.map_err(|e| {
                    tracing::error!(version = v.version, error = %e, "Failed to record sync version");
                    e
                })?;
            }

            match page.versions.last() {
                Some(last) => cursor = last.version,
                None => {
                    if page.has_more {
                        tracing::warn!(cursor, "Peer reported more versions but sent none");
                    }
                    break;
                }
            }
            if !page.has_more {
                break;
            }
        }

        self.complete_pending(peer).await?;
        tracing::info!(cursor, "Finished multi-sync");
        Ok(())
    }

    /// Materialize every not-completed version, oldest first. Each
    /// repository is attempted once per pass; success completes all of its
    /// pending versions.
    async fn complete_pending(&self, peer: &dyn SyncPeer) -> Result<()> {
        let pending = sync_version::Entity::find()
            .filter(sync_version::Column::Completed.eq(false))
            .order_by_asc(sync_version::Column::Version)
            .all(self.db.as_ref())
            .await?;
        if pending.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = pending.len(), "Materializing pending sync versions");

        let mut attempted = HashSet::new();
        for row in pending {
            if !attempted.insert((row.repo_type.clone(), row.repo_path.clone())) {
                continue;
            }
            let v = SyncVersion::from(row);
            match self.materialize(peer, &v).await {
                Ok(created) => {
                    if created {
                        tracing::info!(version = v.version, path = %v.repo_path, "Synced repository");
                    } else {
                        tracing::debug!(version = v.version, path = %v.repo_path, "Repository already synced");
                    }
                    if let Err(e) = self.mark_completed(&v).await {
                        tracing::error!(version = v.version, error = %e, "Failed to complete sync version");
                    }
                }
                Err(e) => tracing::error!(
                    version = v.version,
                    path = %v.repo_path,
                    repo_type = %v.repo_type,
                    error = %e,
                    "Failed to materialize sync version"
                ),
            }
        }
        Ok(())
    }

    async fn mark_completed(&self, v: &SyncVersion) -> Result<()> {
        sync_version::Entity::update_many()
            .col_expr(sync_version::Column::Completed, Expr::value(true))
            .filter(sync_version::Column::Completed.eq(false))
            .filter(sync_version::Column::RepoType.eq(v.repo_type.as_str()))
            .filter(sync_version::Column::RepoPath.eq(v.repo_path.as_str()))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn record_version(&self, v: &SyncVersion) -> Result<()> {
        let existing = sync_version::Entity::find()
            .filter(sync_version::Column::Version.eq(v.version))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let inserted = sync_version::ActiveModel {
            version: Set(v.version),
            source_id: Set(v.source_id),
            repo_path: Set(v.repo_path.clone()),
            repo_type: Set(v.repo_type.clone()),
            last_modified_at: Set(v.last_modified_at.clone()),
            change_log: Set(v.change_log.clone()),
            completed: Set(false),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Local `(namespace, name)` for a peer path
    fn local_path(&self, peer_path: &str) -> Result<(String, String)> {
        match peer_path.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((format!("{}{}", self.config.namespace_prefix, namespace), name.to_string()))
            }
            _ => Err(ServerError::InvalidRequest(format!("malformed peer repository path {:?}", peer_path))),
        }
    }

    /// Create the local copy of one version's repository. Returns false
    /// when it already existed.
    async fn materialize(&self, peer: &dyn SyncPeer, v: &SyncVersion) -> Result<bool> {
        let repo_type = RepoType::from_str(&v.repo_type)
            .ok_or_else(|| ServerError::InvalidRequest(format!("unsupported repository type {:?}", v.repo_type)))?;

        let mut info = with_timeout(INFO_TIMEOUT, "fetch repository info", async {
            match repo_type {
                RepoType::Model => peer.model_info(v).await,
                RepoType::Dataset => peer.dataset_info(v).await,
                RepoType::Code => peer.code_info(v).await,
            }
        })
        .await?;

        let (namespace, name) = self.local_path(&info.path)?;
        if let Some(existing) = find_repo_by_path(&self.db, repo_type, &namespace, &name).await? {
            // Heal a repository left without its typed row by an earlier crash
            store::create_typed_entity(&self.db, repo_type, existing.id, info.base_model.clone()).await?;
            return Ok(false);
        }

        match with_timeout(INFO_TIMEOUT, "fetch readme", peer.read_me_data(v)).await {
            Ok(readme) => info.readme = readme,
            Err(e) => tracing::warn!(version = v.version, error = %e, "Failed to fetch README from peer"),
        }
        let files = match with_timeout(INFO_TIMEOUT, "fetch file list", peer.file_list(v)).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(version = v.version, error = %e, "Failed to fetch file list from peer");
                Vec::new()
            }
        };

        with_timeout(
            CREATE_TIMEOUT,
            "create local repository",
            self.create_local_repo(repo_type, &namespace, &name, info, files),
        )
        .await?;
        Ok(true)
    }

    /// Local writes only; everything fetched from the peer is passed in
    async fn create_local_repo(
        &self,
        repo_type: RepoType,
        namespace: &str,
        name: &str,
        info: PeerRepo,
        files: Vec<PeerFile>,
    ) -> Result<()> {
        // Synced namespaces always become users, whatever they are on the peer
        let user = find_or_create_user(
            &self.db,
            namespace,
            &info.user.nickname,
            &synthetic_email(namespace, &info.user.email),
        )
        .await?;

        let nickname = if info.nickname.is_empty() {
            name.to_string()
        } else {
            info.nickname.clone()
        };
        let default_branch = if info.default_branch.is_empty() {
            "main".to_string()
        } else {
            info.default_branch.clone()
        };

        let repo = store::create_repository(
            &self.db,
            NewRepository {
                nickname,
                description: info.description.clone(),
                private: info.private,
                readme: info.readme.clone(),
                license: info.license.clone(),
                default_branch,
                source: repo_source::MULTI_SYNC.to_string(),
                sync_status: SyncStatus::Pending,
                ..NewRepository::new(user.id, repo_type, namespace, name)
            },
        )
        .await?;
        store::create_typed_entity(&self.db, repo_type, repo.id, info.base_model.clone()).await?;

        for peer_tag in &info.tags {
            let wanted = tag::Model {
                id: 0,
                name: peer_tag.name.clone(),
                category: peer_tag.category.clone(),
                group_name: peer_tag.group.clone(),
                built_in: peer_tag.built_in,
                show_name: peer_tag.show_name.clone(),
                scope: repo_type.as_str().to_string(),
            };
            let linked = match find_or_create_tag(&self.db, wanted).await {
                Ok(t) => add_repository_tag(&self.db, repo.id, t.id).await,
                Err(e) => Err(e),
            };
            if let Err(e) = linked {
                tracing::warn!(repo_id = repo.id, tag = %peer_tag.name, error = %e, "Failed to tag synced repository");
            }
        }

        self.record_files(repo.id, files).await;
        Ok(())
    }

    async fn record_files(&self, repository_id: i64, files: Vec<PeerFile>) {
        if files.is_empty() {
            return;
        }
        let rows: Vec<file::ActiveModel> = files
            .iter()
            .map(|f| file::ActiveModel {
                repository_id: Set(repository_id),
                name: Set(f.name.clone()),
                path: Set(f.path.clone()),
                parent_path: Set(f.parent_path().to_string()),
                size: Set(f.size),
                last_commit_message: Set(f.commit.message.clone()),
                last_commit_date: Set(f.commit.committer_date.clone()),
                ..Default::default()
            })
            .collect();

        if let Err(e) = file::Entity::insert_many(rows).exec(self.db.as_ref()).await {
            tracing::warn!(repository_id, error = %e, "Failed to record synced file list");
        }
    }
}
