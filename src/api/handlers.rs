use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::entities::mirror;
use crate::error::{Result, ServerError};
use crate::indexer::RepoFileIndexer;
use crate::mirror::{CreateMirrorRepoRequest, MirrorComponent};
use crate::multisync::{MultiSyncComponent, PeerResponse};
use crate::types::RepoType;

/// Application state shared across handlers
pub struct AppState {
    pub mirrors: Arc<MirrorComponent>,
    pub multi_sync: Arc<MultiSyncComponent>,
    pub indexer: Arc<RepoFileIndexer>,
}

/// Mirror as returned over HTTP; push credentials stay server-side
fn mirror_json(m: &mirror::Model) -> serde_json::Value {
    json!({
        "id": m.id,
        "repository_id": m.repository_id,
        "mirror_source_id": m.mirror_source_id,
        "source_url": m.source_url,
        "push_url": m.push_url,
        "local_repo_path": m.local_repo_path,
        "source_repo_path": m.source_repo_path,
        "mirror_task_id": m.mirror_task_id,
        "priority": m.priority,
        "status": m.status,
        "progress": m.progress,
        "push_mirror_created": m.push_mirror_created,
    })
}

/// GET /health
pub async fn health() -> Response {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
    .into_response()
}

/// POST /api/v1/mirrors - Mirror an external repository
pub async fn create_mirror(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMirrorRepoRequest>,
) -> Result<Response> {
    let created = state.mirrors.create_mirror_repo(req).await?;
    Ok((StatusCode::CREATED, Json(mirror_json(&created))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListMirrorsQuery {
    #[serde(default = "default_per")]
    pub per: u64,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default)]
    pub search: String,
}

fn default_per() -> u64 {
    50
}

fn default_page() -> u64 {
    1
}

/// GET /api/v1/mirrors
pub async fn list_mirrors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMirrorsQuery>,
) -> Result<Response> {
    let (mirrors, total) = state.mirrors.index(query.per, query.page, &query.search).await?;
    Ok(Json(json!({ "data": mirrors, "total": total })).into_response())
}

/// GET /api/v1/mirrors/statistics
pub async fn mirror_statistics(State(state): State<Arc<AppState>>) -> Result<Response> {
    let stats = state.mirrors.statistics().await?;
    Ok(Json(json!({ "data": stats })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateMirrorSourceRequest {
    pub source_name: String,
    #[serde(default)]
    pub info: String,
}

/// POST /api/v1/mirror_sources
pub async fn create_mirror_source(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMirrorSourceRequest>,
) -> Result<Response> {
    let source = state.mirrors.create_mirror_source(&req.source_name, &req.info).await?;
    let body = json!({
        "id": source.id,
        "source_name": source.source_name,
        "info": source.info,
    });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// GET /api/v1/mirror_sources
pub async fn list_mirror_sources(State(state): State<Arc<AppState>>) -> Result<Response> {
    let sources: Vec<_> = state
        .mirrors
        .mirror_sources()
        .await?
        .into_iter()
        .map(|s| json!({ "id": s.id, "source_name": s.source_name, "info": s.info }))
        .collect();
    Ok(Json(json!({ "data": sources })).into_response())
}

/// POST /api/v1/repos/:repo_type/:namespace/:name/index - Re-index one repository's files
pub async fn index_repo(
    State(state): State<Arc<AppState>>,
    Path((repo_type, namespace, name)): Path<(String, String, String)>,
) -> Result<Response> {
    let repo_type = RepoType::from_str(&repo_type)
        .ok_or_else(|| ServerError::InvalidRequest(format!("unknown repository type {}", repo_type)))?;
    let inserted = state.indexer.index_one(repo_type, &namespace, &name).await?;
    Ok(Json(json!({ "inserted": inserted })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct LatestVersionsQuery {
    #[serde(default)]
    pub cur: i64,
    #[serde(default = "default_version_limit")]
    pub limit: u64,
}

fn default_version_limit() -> u64 {
    crate::multisync::MAX_PAGE_LIMIT
}

/// GET /api/v1/sync/version/latest?cur=N - Serve versions to downstream peers
pub async fn latest_versions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LatestVersionsQuery>,
) -> Result<Response> {
    let page = state.multi_sync.latest_page(query.cur, query.limit).await?;
    Ok(Json(PeerResponse {
        msg: "OK".to_string(),
        data: page,
    })
    .into_response())
}
