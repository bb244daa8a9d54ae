use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Repository already exists: {0}")]
    DuplicateRepo(String),

    #[error("Namespace does not exist: {0}")]
    NamespaceNotFound(String),

    #[error("No git server access token of type git configured")]
    MissingPushToken,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Mirror server error: {0}")]
    MirrorBackend(String),

    #[error("Git server error: {0}")]
    GitServer(String),

    #[error("Sync peer error: {0}")]
    Peer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::RepoNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::NamespaceNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::DuplicateRepo(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::MissingPushToken => (StatusCode::PRECONDITION_FAILED, self.to_string()),
            ServerError::MirrorBackend(_)
            | ServerError::GitServer(_)
            | ServerError::Peer(_)
            | ServerError::Http(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ServerError::Config(_)
            | ServerError::Internal(_)
            | ServerError::Database(_)
            | ServerError::Storage(_)
            | ServerError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp = ServerError::DuplicateRepo("models/a/b".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = ServerError::Internal("boom".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = ServerError::MirrorBackend("down".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
