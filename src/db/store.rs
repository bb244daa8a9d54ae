//! Query helpers shared by the replication components.
//!
//! These are the creation primitives both the mirror orchestrator and the
//! multi-sync replicator build on. None of them open transactions: a crash
//! between creating a repository and its typed row leaves the repository
//! behind, and callers rely on existence checks to converge on retry.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
};

use super::entities::{code, dataset, model, repository, repository_tag, tag, user};
use crate::types::{RepoType, SyncStatus};

/// Current unix time in seconds
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// True when the error is a unique-constraint violation
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub async fn find_user(db: &DatabaseConnection, username: &str) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
}

pub async fn create_user(
    db: &DatabaseConnection,
    username: &str,
    nickname: &str,
    email: &str,
) -> Result<user::Model, DbErr> {
    user::ActiveModel {
        username: Set(username.to_string()),
        nickname: Set(nickname.to_string()),
        email: Set(email.to_string()),
        uuid: Set(uuid::Uuid::new_v4().to_string()),
        created_at: Set(now_secs()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Resolve a user, creating it when missing.
///
/// Two writers racing on the same username is fine: the loser hits the
/// unique index and picks up the winner's row.
pub async fn find_or_create_user(
    db: &DatabaseConnection,
    username: &str,
    nickname: &str,
    email: &str,
) -> Result<user::Model, DbErr> {
    if let Some(existing) = find_user(db, username).await? {
        return Ok(existing);
    }

    match create_user(db, username, nickname, email).await {
        Ok(created) => Ok(created),
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(username, "user created concurrently, reusing it");
            find_user(db, username)
                .await?
                .ok_or_else(|| DbErr::RecordNotFound(format!("user {}", username)))
        }
        Err(e) => Err(e),
    }
}

pub async fn find_repo_by_path(
    db: &DatabaseConnection,
    repo_type: RepoType,
    namespace: &str,
    name: &str,
) -> Result<Option<repository::Model>, DbErr> {
    repository::Entity::find()
        .filter(repository::Column::RepositoryType.eq(repo_type.as_str()))
        .filter(repository::Column::Path.eq(format!("{}/{}", namespace, name)))
        .one(db)
        .await
}

/// Fields of a repository row about to be created
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub user_id: i64,
    pub repo_type: RepoType,
    pub namespace: String,
    pub name: String,
    pub nickname: String,
    pub description: String,
    pub private: bool,
    pub readme: String,
    pub license: String,
    pub default_branch: String,
    pub source: String,
    pub sync_status: SyncStatus,
    pub http_clone_url: String,
    pub ssh_clone_url: String,
}

impl NewRepository {
    pub fn new(user_id: i64, repo_type: RepoType, namespace: &str, name: &str) -> Self {
        Self {
            user_id,
            repo_type,
            namespace: namespace.to_string(),
            name: name.to_string(),
            nickname: name.to_string(),
            description: String::new(),
            private: false,
            readme: String::new(),
            license: String::new(),
            default_branch: "main".to_string(),
            source: crate::types::repo_source::LOCAL.to_string(),
            sync_status: SyncStatus::Pending,
            http_clone_url: String::new(),
            ssh_clone_url: String::new(),
        }
    }
}

pub async fn create_repository(db: &DatabaseConnection, new: NewRepository) -> Result<repository::Model, DbErr> {
    let now = now_secs();
    repository::ActiveModel {
        user_id: Set(new.user_id),
        path: Set(format!("{}/{}", new.namespace, new.name)),
        git_path: Set(format!("{}/{}", new.repo_type.git_owner(&new.namespace), new.name)),
        name: Set(new.name),
        nickname: Set(new.nickname),
        description: Set(new.description),
        private: Set(new.private),
        readme: Set(new.readme),
        license: Set(new.license),
        default_branch: Set(new.default_branch),
        repository_type: Set(new.repo_type.as_str().to_string()),
        source: Set(new.source),
        sync_status: Set(new.sync_status.as_str().to_string()),
        http_clone_url: Set(new.http_clone_url),
        ssh_clone_url: Set(new.ssh_clone_url),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Create the Model/Dataset/Code row for a repository unless it exists.
pub async fn create_typed_entity(
    db: &DatabaseConnection,
    repo_type: RepoType,
    repository_id: i64,
    base_model: Option<String>,
) -> Result<(), DbErr> {
    let now = now_secs();
    match repo_type {
        RepoType::Model => {
            let existing = model::Entity::find()
                .filter(model::Column::RepositoryId.eq(repository_id))
                .one(db)
                .await?;
            if existing.is_none() {
                model::ActiveModel {
                    repository_id: Set(repository_id),
                    base_model: Set(base_model),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }
        RepoType::Dataset => {
            let existing = dataset::Entity::find()
                .filter(dataset::Column::RepositoryId.eq(repository_id))
                .one(db)
                .await?;
            if existing.is_none() {
                dataset::ActiveModel {
                    repository_id: Set(repository_id),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }
        RepoType::Code => {
            let existing = code::Entity::find()
                .filter(code::Column::RepositoryId.eq(repository_id))
                .one(db)
                .await?;
            if existing.is_none() {
                code::ActiveModel {
                    repository_id: Set(repository_id),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?;
            }
        }
    }
    Ok(())
}

/// Resolve a tag by (name, category, scope), creating it when missing
pub async fn find_or_create_tag(db: &DatabaseConnection, new: tag::Model) -> Result<tag::Model, DbErr> {
    let find = || {
        tag::Entity::find()
            .filter(tag::Column::Name.eq(new.name.as_str()))
            .filter(tag::Column::Category.eq(new.category.as_str()))
            .filter(tag::Column::Scope.eq(new.scope.as_str()))
            .one(db)
    };
    if let Some(existing) = find().await? {
        return Ok(existing);
    }

    let created = tag::ActiveModel {
        name: Set(new.name.clone()),
        category: Set(new.category.clone()),
        group_name: Set(new.group_name.clone()),
        built_in: Set(new.built_in),
        show_name: Set(new.show_name.clone()),
        scope: Set(new.scope.clone()),
        ..Default::default()
    }
    .insert(db)
    .await;

    match created {
        Ok(tag) => Ok(tag),
        Err(e) if is_unique_violation(&e) => find()
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("tag {}", new.name))),
        Err(e) => Err(e),
    }
}

/// Link a tag to a repository; linking twice is a no-op
pub async fn add_repository_tag(db: &DatabaseConnection, repository_id: i64, tag_id: i64) -> Result<(), DbErr> {
    let existing = repository_tag::Entity::find()
        .filter(repository_tag::Column::RepositoryId.eq(repository_id))
        .filter(repository_tag::Column::TagId.eq(tag_id))
        .one(db)
        .await?;
    if existing.is_none() {
        repository_tag::ActiveModel {
            repository_id: Set(repository_id),
            tag_id: Set(tag_id),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}
