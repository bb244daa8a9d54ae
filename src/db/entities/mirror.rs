//! Mirror entity: one row per locally mirrored repository.

use sea_orm::entity::prelude::*;

use crate::types::MirrorStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "mirrors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub repository_id: i64,
    pub mirror_source_id: i64,
    pub source_url: String,
    pub push_url: String,
    /// Source namespace
    pub username: String,
    pub push_username: String,
    pub push_access_token: String,
    /// Key of the mirror on the mirror backend
    pub local_repo_path: String,
    pub source_repo_path: String,
    pub mirror_task_id: i64,
    pub priority: i32,
    pub status: String,
    /// 0..=100
    pub progress: i32,
    pub last_message: String,
    pub push_mirror_created: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Model {
    pub fn mirror_status(&self) -> Option<MirrorStatus> {
        MirrorStatus::from_str(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::repository::Entity",
        from = "Column::RepositoryId",
        to = "super::repository::Column::Id"
    )]
    Repository,
    #[sea_orm(
        belongs_to = "super::mirror_source::Entity",
        from = "Column::MirrorSourceId",
        to = "super::mirror_source::Column::Id"
    )]
    MirrorSource,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl Related<super::mirror_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MirrorSource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
