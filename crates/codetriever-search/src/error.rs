use codetriever_common::{CommonError, CorrelationId};
use thiserror::Error;

/// Search-specific error types with correlation ID support
#[derive(Error, Debug)]
pub enum SearchError {
    /// A query-engine operation (LLM/embedding/vector) tripped its timeout.
    /// Maps to error code `TIMEOUT`, recoverable.
    #[error("{operation} timed out after {timeout_ms}ms (correlation: {correlation_id})")]
    Timeout {
        operation: String,
        timeout_ms: u64,
        correlation_id: CorrelationId,
    },

    /// The request's `(index_revision, engine_config_hash, sources_digest)`
    /// did not match what the gatherer's retrieval telemetry observed.
    /// Maps to error code `INDEX_NOT_FOUND` / `INDEX_CONTEXT_MISMATCH`,
    /// recoverable: the caller should retry with a refreshed manifest.
    #[error("index context mismatch for scope '{scope_id}': {reason}")]
    ContextMismatch { scope_id: String, reason: String },

    /// A malformed or empty query. Maps to error code
    /// `KNOWLEDGE_QUERY_INVALID`, non-recoverable.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// An LLM collaborator call failed, or its output could not be parsed
    /// by the tolerant JSON extractor. Maps to error code `LLM_ERROR`.
    #[error("LLM error: {0}")]
    LlmError(#[from] crate::llm::LlmError),

    /// Internal invariant violation. Maps to error code `ENGINE_ERROR`,
    /// fatal for the current request.
    #[error("engine error: {0}")]
    Engine(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(#[from] codetriever_embeddings::EmbeddingError),

    #[error("Vector storage error: {0}")]
    VectorDataError(#[from] codetriever_vector_data::VectorDataError),

    #[error("Metadata error: {0}")]
    MetaDataError(#[from] codetriever_meta_data::MetaDataError),

    #[error("Parsing error: {0}")]
    ParsingError(#[from] codetriever_parsing::ParsingError),
}

impl SearchError {
    /// External error code surfaced on `AgentErrorResponse` (spec §6).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::LlmError(_) => "LLM_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ContextMismatch { .. } => "INDEX_NOT_FOUND",
            Self::InvalidQuery(_) => "KNOWLEDGE_QUERY_INVALID",
            Self::EmbeddingError(_)
            | Self::VectorDataError(_)
            | Self::MetaDataError(_)
            | Self::ParsingError(_)
            | Self::Engine(_) => "ENGINE_ERROR",
        }
    }

    /// Whether the caller can usefully retry the same request (spec §7
    /// taxonomy: I/O, rate-limit, and context-mismatch errors are
    /// recoverable; validation and internal-invariant errors are not).
    #[must_use]
    pub fn recoverable(&self) -> bool {
        match self {
            Self::InvalidQuery(_) | Self::Engine(_) => false,
            Self::ContextMismatch { .. }
            | Self::Timeout { .. }
            | Self::LlmError(_)
            | Self::EmbeddingError(_)
            | Self::VectorDataError(_)
            | Self::MetaDataError(_)
            | Self::ParsingError(_) => true,
        }
    }
}

/// Crate-wide result alias; `searching::search::SearchResult` is the same
/// type kept for call-site compatibility with existing callers.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

impl CommonError for SearchError {
    fn io_error(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    fn config_error(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    fn parse_error(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    fn other_error(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }
}
