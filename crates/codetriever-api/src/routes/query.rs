//! Query API route: the HTTP front door to [`codetriever_search::Orchestrator`].
//!
//! # API Overview
//!
//! - `POST /query` - answer a natural-language question against an indexed
//!   scope, returning the spec's `AgentResponse` wire shape (or
//!   `AgentErrorResponse` on failure).

use axum::{Json, Router, extract::State, routing::post};
use codetriever_search::{OrchestratorResponse, QueryContext, QueryMode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// `meta{schemaVersion, requestId, mode, timingMs, cached, indexVersion?}`
/// (spec §6), shared by `AgentResponse` and `AgentErrorResponse`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub schema_version: &'static str,
    pub request_id: String,
    pub mode: String,
    pub timing_ms: u64,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_version: Option<String>,
}

impl ResponseMeta {
    /// A meta block for a request that failed before a mode/timing was
    /// established (e.g. an unparseable request body).
    #[must_use]
    pub fn error() -> Self {
        Self {
            schema_version: "agent-response-v1",
            request_id: Uuid::new_v4().to_string(),
            mode: String::new(),
            timing_ms: 0,
            cached: false,
            index_version: None,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub scope_id: String,
    pub query: String,
    pub mode: String,
    pub index_revision: String,
    pub engine_config_hash: String,
    #[serde(default)]
    pub sources_digest: Option<String>,
}

/// Mirrors [`codetriever_vector_data::ChunkKind`] for the wire shape — kept
/// local so this crate doesn't need to pull `utoipa` into `codetriever-vector-data`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKindBody {
    Code,
    Docs,
    Adr,
    Config,
    Test,
    Other,
}

impl From<codetriever_vector_data::ChunkKind> for ChunkKindBody {
    fn from(kind: codetriever_vector_data::ChunkKind) -> Self {
        match kind {
            codetriever_vector_data::ChunkKind::Code => Self::Code,
            codetriever_vector_data::ChunkKind::Docs => Self::Docs,
            codetriever_vector_data::ChunkKind::Adr => Self::Adr,
            codetriever_vector_data::ChunkKind::Config => Self::Config,
            codetriever_vector_data::ChunkKind::Test => Self::Test,
            codetriever_vector_data::ChunkKind::Other => Self::Other,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SourceEntry {
    pub file: String,
    pub lines: [usize; 2],
    pub snippet: String,
    pub relevance: f32,
    pub kind: ChunkKindBody,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourcesSummaryBody {
    pub code: usize,
    pub docs: usize,
    pub external: usize,
}

/// `AgentResponse` (spec §6).
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub answer: String,
    pub sources: Vec<SourceEntry>,
    pub confidence: f64,
    pub complete: bool,
    pub sources_summary: SourcesSummaryBody,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub meta: ResponseMeta,
}

impl From<OrchestratorResponse> for AgentResponse {
    fn from(resp: OrchestratorResponse) -> Self {
        let meta = ResponseMeta {
            schema_version: "agent-response-v1",
            request_id: Uuid::new_v4().to_string(),
            mode: resp.mode.as_str().to_string(),
            timing_ms: resp.timing_ms,
            cached: resp.cached,
            index_version: Some(resp.index_revision),
        };
        Self {
            answer: resp.answer,
            sources: resp
                .sources
                .into_iter()
                .map(|s| SourceEntry {
                    file: s.file,
                    lines: [s.start_line, s.end_line],
                    snippet: s.snippet,
                    relevance: s.relevance,
                    kind: s.kind.into(),
                })
                .collect(),
            confidence: resp.confidence,
            complete: resp.complete,
            sources_summary: SourcesSummaryBody {
                code: resp.sources_summary.code,
                docs: resp.sources_summary.docs,
                external: resp.sources_summary.external,
            },
            warnings: resp.warnings,
            suggestions: resp.suggestions,
            meta,
        }
    }
}

fn parse_mode(raw: &str) -> Result<QueryMode> {
    match raw {
        "instant" => Ok(QueryMode::Instant),
        "auto" => Ok(QueryMode::Auto),
        "thinking" => Ok(QueryMode::Thinking),
        other => Err(ApiError::InvalidRequest(format!(
            "unknown query mode '{other}' (expected instant, auto, or thinking)"
        ))),
    }
}

/// `POST /query`
#[utoipa::path(
    post,
    path = "/query",
    request_body = QueryRequest,
    responses((status = 200, description = "Query answered", body = AgentResponse)),
)]
pub async fn query_handler(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<AgentResponse>> {
    let mode = parse_mode(&req.mode)?;

    // Keep the overlay partition current with local git changes since the
    // base index's recorded revision before reading through it (spec §4.5).
    let base_revision = state
        .manifest_store
        .load_manifest(&req.scope_id)
        .await
        .ok()
        .flatten()
        .and_then(|m| m.git_revision);
    if let Err(error) = state
        .overlay_manager
        .refresh(&req.scope_id, &state.workspace_root, base_revision.as_deref())
        .await
    {
        tracing::warn!(%error, scope_id = %req.scope_id, "overlay refresh failed, querying base index only");
    }

    let ctx = QueryContext {
        scope_id: req.scope_id.clone(),
        index_revision: req.index_revision,
        engine_config_hash: req.engine_config_hash,
        sources_digest: req.sources_digest,
    };
    let response = state.orchestrator.query(&req.scope_id, &req.query, mode, &ctx).await?;
    Ok(Json(response.into()))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/query", post(query_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_mode() {
        assert!(parse_mode("bogus").is_err());
        assert!(parse_mode("instant").is_ok());
    }
}
