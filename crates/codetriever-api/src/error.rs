//! Error handling for the Codetriever API.
//!
//! The API is a thin transport shim: every failure it surfaces originates in
//! either the query engine ([`SearchError`]) or the indexing pipeline
//! ([`IndexerError`]). [`ApiError`] wraps both and renders them into the
//! `AgentErrorResponse` wire shape (spec §6) when returned from a handler.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use codetriever_common::CommonError;
use codetriever_indexing::IndexerError;
use codetriever_search::SearchError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("query engine error: {0}")]
    Search(#[from] SearchError),

    #[error("indexing error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("scope not found: {0}")]
    ScopeNotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ApiError {
    /// External error code surfaced on `AgentErrorResponse` (spec §6).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Search(e) => e.code(),
            Self::InvalidRequest(_) => "KNOWLEDGE_QUERY_INVALID",
            Self::ScopeNotFound(_) => "INDEX_NOT_FOUND",
            Self::Indexer(IndexerError::TooManyErrors(_) | IndexerError::File { .. }) => {
                "ENGINE_ERROR"
            }
            Self::Indexer(_) | Self::Io(_) | Self::Configuration(_) | Self::Other(_) => {
                "ENGINE_ERROR"
            }
        }
    }

    #[must_use]
    pub fn recoverable(&self) -> bool {
        match self {
            Self::Search(e) => e.recoverable(),
            Self::InvalidRequest(_) => false,
            Self::ScopeNotFound(_) => true,
            Self::Indexer(IndexerError::TooManyErrors(_)) => true,
            Self::Indexer(_) | Self::Io(_) | Self::Configuration(_) | Self::Other(_) => true,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.code() {
            "KNOWLEDGE_QUERY_INVALID" => StatusCode::BAD_REQUEST,
            "INDEX_NOT_FOUND" => StatusCode::NOT_FOUND,
            "TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl CommonError for ApiError {
    fn io_error(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    fn parse_error(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    fn other_error(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// `AgentErrorResponse` (spec §6): `error{code, message, recoverable}, meta`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub recoverable: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AgentErrorResponse {
    pub error: ErrorBody,
    pub meta: crate::routes::query::ResponseMeta,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = AgentErrorResponse {
            error: ErrorBody { code: self.code(), message: self.to_string(), recoverable: self.recoverable() },
            meta: crate::routes::query::ResponseMeta::error(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
