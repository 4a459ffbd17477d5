//! Index API route: the HTTP front door to
//! [`codetriever_indexing::IndexingPipeline`].
//!
//! # API Overview
//!
//! - `POST /index` - run a full incremental build for a scope rooted under
//!   the server's workspace.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    pub scope_id: String,
    /// Path relative to the server's workspace root; defaults to the root itself.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IndexError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexResponse {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_stored: usize,
    pub chunks_updated: usize,
    pub chunks_skipped: usize,
    pub error_count: usize,
    pub duration_ms: u64,
    pub errors: Vec<IndexError>,
}

impl From<codetriever_indexing::IndexingStats> for IndexResponse {
    fn from(stats: codetriever_indexing::IndexingStats) -> Self {
        Self {
            files_discovered: stats.files_discovered,
            files_processed: stats.files_processed,
            files_skipped: stats.files_skipped,
            chunks_stored: stats.chunks_stored,
            chunks_updated: stats.chunks_updated,
            chunks_skipped: stats.chunks_skipped,
            error_count: stats.error_count,
            duration_ms: stats.duration_ms,
            errors: stats
                .errors
                .into_iter()
                .map(|e| IndexError { path: e.path, message: e.message })
                .collect(),
        }
    }
}

/// `POST /index`
#[utoipa::path(
    post,
    path = "/index",
    request_body = IndexRequest,
    responses((status = 200, description = "Scope indexed", body = IndexResponse)),
)]
pub async fn index_handler(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexResponse>> {
    let root = match &req.path {
        Some(rel) => state.workspace_root.join(rel),
        None => state.workspace_root.clone(),
    };
    let stats = state.indexing_pipeline.run(&req.scope_id, &root, &req.exclude).await?;
    Ok(Json(stats.into()))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/index", post(index_handler))
}
