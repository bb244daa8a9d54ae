//! Database entities

pub mod code;
pub mod dataset;
pub mod file;
pub mod git_server_access_token;
pub mod mirror;
pub mod mirror_source;
pub mod model;
pub mod repository;
pub mod repository_file;
pub mod repository_tag;
pub mod sync_version;
pub mod tag;
pub mod user;
