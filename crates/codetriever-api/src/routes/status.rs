//! Status API route: per-scope manifest introspection.
//!
//! # API Overview
//!
//! - `GET /status/{scope_id}` - the last-built manifest's stats for a scope,
//!   or a `404`-shaped "not indexed yet" response if no manifest exists.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use codetriever_meta_data::ManifestStore;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStatsBody {
    pub total_chunks: usize,
    pub total_files: usize,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub index_time_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub scope_id: String,
    pub index_revision: String,
    pub built_at: chrono::DateTime<chrono::Utc>,
    pub engine_config_hash: String,
    pub stats: ManifestStatsBody,
}

/// `GET /status/{scope_id}`
#[utoipa::path(
    get,
    path = "/status/{scope_id}",
    params(("scope_id" = String, Path, description = "Scope identifier")),
    responses(
        (status = 200, description = "Scope has a manifest", body = StatusResponse),
        (status = 404, description = "Scope has never been indexed"),
    ),
)]
pub async fn status_handler(
    State(state): State<AppState>,
    Path(scope_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    let store = ManifestStore::new(state.workspace_root.clone());
    let manifest = store
        .load_manifest(&scope_id)
        .await
        .map_err(|e| ApiError::Other(e.to_string()))?
        .ok_or_else(|| ApiError::ScopeNotFound(format!("scope '{scope_id}' has never been indexed")))?;

    Ok(Json(StatusResponse {
        scope_id,
        index_revision: manifest.index_revision,
        built_at: manifest.built_at,
        engine_config_hash: manifest.engine_config_hash,
        stats: ManifestStatsBody {
            total_chunks: manifest.stats.total_chunks,
            total_files: manifest.stats.total_files,
            embedding_model: manifest.stats.embedding_model,
            embedding_dimension: manifest.stats.embedding_dimension,
            index_time_ms: manifest.stats.index_time_ms,
        },
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/status/{scope_id}", get(status_handler))
}
