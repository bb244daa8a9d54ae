//! Inbound mirroring of external repositories.
//!
//! `MirrorComponent` owns the mirror lifecycle: creating the shadow
//! repository and backend task, polling the task and measuring LFS progress,
//! and promoting finished mirrors to push mirrors.

mod orchestrator;
mod progress;
mod push;
mod status;

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Serialize;

use crate::config::MirrorConfig;
use crate::db::entities::{mirror, mirror_source, repository};
use crate::db::store::now_secs;
use crate::error::{Result, ServerError};
use crate::gitserver::GitServer;
use crate::mirrorserver::MirrorServer;
use crate::storage::StorageBackend;

pub use orchestrator::CreateMirrorRepoRequest;
pub use status::{map_task_status, progress_percent};

/// A mirror as listed by `index`
#[derive(Debug, Clone, Serialize)]
pub struct MirrorView {
    pub id: i64,
    pub repository_id: i64,
    pub path: String,
    pub repo_type: String,
    pub source_url: String,
    pub local_repo_path: String,
    pub status: String,
    pub progress: i32,
    pub sync_status: String,
    pub last_message: String,
    pub push_mirror_created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorStatusCount {
    pub status: String,
    pub count: i64,
}

pub struct MirrorComponent {
    db: Arc<DatabaseConnection>,
    git: Arc<dyn GitServer>,
    backend: Arc<dyn MirrorServer>,
    storage: Arc<dyn StorageBackend>,
    config: MirrorConfig,
}

impl MirrorComponent {
    pub fn new(
        db: Arc<DatabaseConnection>,
        git: Arc<dyn GitServer>,
        backend: Arc<dyn MirrorServer>,
        storage: Arc<dyn StorageBackend>,
        config: MirrorConfig,
    ) -> Self {
        Self {
            db,
            git,
            backend,
            storage,
            config,
        }
    }

    /// Page through mirrors, newest first. `page` starts at 1.
    ///
    /// `search` matches against the source URL and the backend key.
    pub async fn index(&self, per: u64, page: u64, search: &str) -> Result<(Vec<MirrorView>, u64)> {
        if per == 0 || page == 0 {
            return Err(ServerError::InvalidRequest("per and page must be positive".to_string()));
        }

        let mut query = mirror::Entity::find().find_also_related(repository::Entity);
        if !search.is_empty() {
            query = query.filter(
                Condition::any()
                    .add(mirror::Column::SourceUrl.contains(search))
                    .add(mirror::Column::LocalRepoPath.contains(search)),
            );
        }

        let paginator = query.order_by_desc(mirror::Column::Id).paginate(self.db.as_ref(), per);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        let views = rows
            .into_iter()
            .map(|(m, repo)| {
                let (path, repo_type, sync_status) = repo
                    .map(|r| (r.path, r.repository_type, r.sync_status))
                    .unwrap_or_default();
                MirrorView {
                    id: m.id,
                    repository_id: m.repository_id,
                    path,
                    repo_type,
                    source_url: m.source_url,
                    local_repo_path: m.local_repo_path,
                    status: m.status,
                    progress: m.progress,
                    sync_status,
                    last_message: m.last_message,
                    push_mirror_created: m.push_mirror_created,
                }
            })
            .collect();

        Ok((views, total))
    }

    /// Number of mirrors in each status
    pub async fn statistics(&self) -> Result<Vec<MirrorStatusCount>> {
        let rows: Vec<(String, i64)> = mirror::Entity::find()
            .select_only()
            .column(mirror::Column::Status)
            .column_as(mirror::Column::Id.count(), "count")
            .group_by(mirror::Column::Status)
            .order_by_asc(mirror::Column::Status)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(status, count)| MirrorStatusCount { status, count })
            .collect())
    }

    /// Register an upstream platform mirrors can be pulled from
    pub async fn create_mirror_source(&self, source_name: &str, info: &str) -> Result<mirror_source::Model> {
        if source_name.is_empty() || source_name.contains('/') {
            return Err(ServerError::InvalidRequest(format!("invalid mirror source name {:?}", source_name)));
        }
        let existing = mirror_source::Entity::find()
            .filter(mirror_source::Column::SourceName.eq(source_name))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServerError::InvalidRequest(format!("mirror source {} already exists", source_name)));
        }

        let source = mirror_source::ActiveModel {
            source_name: Set(source_name.to_string()),
            info: Set(info.to_string()),
            created_at: Set(now_secs()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;
        tracing::info!(id = source.id, source_name, "Created mirror source");
        Ok(source)
    }

    pub async fn mirror_sources(&self) -> Result<Vec<mirror_source::Model>> {
        Ok(mirror_source::Entity::find()
            .order_by_asc(mirror_source::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::store::create_user;
    use crate::db::entities::git_server_access_token;
    use crate::testutil::{memory_db, MemoryStorage, MockGitServer, MockMirrorServer};
    use crate::types::RepoType;

    pub(crate) struct Fixture {
        pub db: Arc<DatabaseConnection>,
        pub git: Arc<MockGitServer>,
        pub backend: Arc<MockMirrorServer>,
        pub storage: Arc<MemoryStorage>,
        pub component: MirrorComponent,
        pub source_id: i64,
    }

    /// Component with a `hf` mirror source, a git push token and an
    /// `AIWizards` namespace
    pub(crate) async fn fixture() -> Fixture {
        let db = Arc::new(memory_db().await);
        let git = Arc::new(MockGitServer::new());
        let backend = Arc::new(MockMirrorServer::new());
        let storage = Arc::new(MemoryStorage::new());

        let mut config = MirrorConfig::default();
        config.namespace_mapping.insert("meta-llama".to_string(), "Meta".to_string());

        let component = MirrorComponent::new(db.clone(), git.clone(), backend.clone(), storage.clone(), config);
        let source = component.create_mirror_source("hf", "Hugging Face").await.unwrap();

        create_user(&db, "AIWizards", "AI Wizards", "").await.unwrap();
        create_user(&db, "Meta", "Meta", "").await.unwrap();
        git_server_access_token::ActiveModel {
            token: Set("push-secret".to_string()),
            username: Set("mirror-bot".to_string()),
            token_type: Set(git_server_access_token::TOKEN_TYPE_GIT.to_string()),
            created_at: Set(now_secs()),
            ..Default::default()
        }
        .insert(db.as_ref())
        .await
        .unwrap();

        Fixture {
            db,
            git,
            backend,
            storage,
            component,
            source_id: source.id,
        }
    }

    pub(crate) fn request(source_id: i64, namespace: &str, name: &str) -> CreateMirrorRepoRequest {
        CreateMirrorRepoRequest {
            source_namespace: namespace.to_string(),
            source_name: name.to_string(),
            repo_type: RepoType::Model,
            source_git_clone_url: format!("https://huggingface.co/{}/{}.git", namespace, name),
            mirror_source_id: source_id,
            description: String::new(),
            license: "apache-2.0".to_string(),
            default_branch: "main".to_string(),
            sync_lfs: true,
        }
    }

    #[tokio::test]
    async fn test_index_and_statistics() {
        let fx = fixture().await;
        for name in ["a", "b", "c"] {
            fx.component
                .create_mirror_repo(request(fx.source_id, "someone", name))
                .await
                .unwrap();
        }

        let (page1, total) = fx.component.index(2, 1, "").await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].path, "AIWizards/c");
        assert_eq!(page1[0].status, "waiting");
        assert_eq!(page1[0].sync_status, "pending");

        let (page2, _) = fx.component.index(2, 2, "").await.unwrap();
        assert_eq!(page2.len(), 1);

        let (found, total) = fx.component.index(10, 1, "someone/b.git").await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].path, "AIWizards/b");

        assert!(fx.component.index(0, 1, "").await.is_err());

        let stats = fx.component.statistics().await.unwrap();
        assert_eq!(
            stats,
            vec![MirrorStatusCount {
                status: "waiting".to_string(),
                count: 3
            }]
        );
    }

    #[tokio::test]
    async fn test_mirror_sources() {
        let fx = fixture().await;
        assert!(fx.component.create_mirror_source("hf", "again").await.is_err());
        assert!(fx.component.create_mirror_source("bad/name", "").await.is_err());
        fx.component.create_mirror_source("ms", "ModelScope").await.unwrap();

        let names: Vec<String> = fx
            .component
            .mirror_sources()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.source_name)
            .collect();
        assert_eq!(names, vec!["hf", "ms"]);
    }
}
