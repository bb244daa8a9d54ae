//! Sync version entity: append-only changelog received from a peer.
//!
//! The highest stored `version` is the pull cursor for the next sync.
//! `completed` is set once the version's repository exists locally.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub version: i64,
    pub source_id: i64,
    pub repo_path: String,
    pub repo_type: String,
    pub last_modified_at: String,
    pub change_log: String,
    pub completed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
