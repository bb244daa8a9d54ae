//! Service-account tokens for talking to the git server.
//!
//! Tokens of type `git` carry the credentials push mirrors use to write
//! into freshly mirrored repositories.

use sea_orm::entity::prelude::*;

pub const TOKEN_TYPE_GIT: &str = "git";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "git_server_access_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub token: String,
    /// Account the token belongs to
    pub username: String,
    pub token_type: String,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
