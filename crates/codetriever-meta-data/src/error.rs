//! Error types for the metadata layer (manifests, overlay state, git detection)

use codetriever_common::CommonError;
use thiserror::Error;

/// Result type alias for metadata operations
pub type MetaDataResult<T> = Result<T, MetaDataError>;

/// Errors raised by manifest/overlay persistence and git change detection
#[derive(Debug, Error)]
pub enum MetaDataError {
    /// Reading or writing `manifest.json`/`overlay-state.json` failed
    #[error("IO error: {0}")]
    Io(String),

    /// A manifest/overlay file existed but failed to parse
    #[error("Parse error: {0}")]
    Parse(String),

    /// `manifest_version` major component didn't match the reader's
    #[error("Manifest version incompatible: found {found}, expected major {expected_major}")]
    IncompatibleVersion { found: String, expected_major: u64 },

    /// No manifest exists yet for this scope
    #[error("Index not found for scope '{0}'")]
    IndexNotFound(String),

    /// The git collaborator subprocess failed or the path isn't a repository
    #[error("Git error: {0}")]
    Git(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic/other error
    #[error("Other error: {0}")]
    Other(String),
}

impl CommonError for MetaDataError {
    fn io_error(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    fn other_error(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<std::io::Error> for MetaDataError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for MetaDataError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
