//! Error types for the indexing pipeline (C8: Discovery/Filtering/Chunking/Embedding/Storage)

use codetriever_common::CommonError;
use thiserror::Error;

/// Result type alias for indexing operations
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Errors raised while discovering, chunking, embedding, or storing files
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Reading a source file from disk failed
    #[error("IO error: {0}")]
    Io(String),

    /// A file-level error, attributed to a specific path, that did not abort the run
    #[error("{path}: {message}")]
    File { path: String, message: String },

    /// The per-run error budget (`IndexingConfig::max_errors`) was exceeded
    #[error("indexing aborted: {0} file errors exceeded the configured budget")]
    TooManyErrors(usize),

    /// The chunker registry or a specific chunker failed
    #[error("parsing error: {0}")]
    Parsing(#[from] codetriever_parsing::ParsingError),

    /// The embedding backend failed for a batch that could not be recovered
    #[error("embedding error: {0}")]
    Embedding(#[from] codetriever_embeddings::EmbeddingError),

    /// The vector store rejected a write
    #[error("storage error: {0}")]
    Storage(#[from] codetriever_vector_data::VectorDataError),

    /// The metadata layer (manifest/overlay/git) failed
    #[error("metadata error: {0}")]
    MetaData(#[from] codetriever_meta_data::MetaDataError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic/other error
    #[error("other error: {0}")]
    Other(String),
}

impl CommonError for IndexerError {
    fn io_error(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    fn parse_error(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    fn other_error(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<std::io::Error> for IndexerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
