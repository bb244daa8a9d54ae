pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

pub use handlers::AppState;

/// Replication API routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/mirrors", post(handlers::create_mirror).get(handlers::list_mirrors))
        .route("/api/v1/mirrors/statistics", get(handlers::mirror_statistics))
        .route(
            "/api/v1/mirror_sources",
            post(handlers::create_mirror_source).get(handlers::list_mirror_sources),
        )
        .route("/api/v1/repos/:repo_type/:namespace/:name/index", post(handlers::index_repo))
        .route("/api/v1/sync/version/latest", get(handlers::latest_versions))
}
