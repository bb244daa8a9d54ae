//! Repository entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    /// `namespace/name`
    pub path: String,
    /// Path on the git server, `{type}s_{namespace}/{name}`
    pub git_path: String,
    pub name: String,
    pub nickname: String,
    pub description: String,
    pub private: bool,
    pub readme: String,
    pub license: String,
    pub default_branch: String,
    pub repository_type: String,
    pub source: String,
    pub sync_status: String,
    pub http_clone_url: String,
    pub ssh_clone_url: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Model {
    /// Split `path` into `(namespace, name)`
    pub fn namespace_and_name(&self) -> (&str, &str) {
        self.path.split_once('/').unwrap_or(("", self.path.as_str()))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    Owner,
    #[sea_orm(has_many = "super::repository_file::Entity")]
    Files,
    #[sea_orm(has_one = "super::mirror::Entity")]
    Mirror,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::repository_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Files.def()
    }
}

impl Related<super::mirror::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mirror.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
