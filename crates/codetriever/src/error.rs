//! CLI error type: wraps every engine error the subcommands can surface and
//! renders a one-line, stack-trace-free message on exit (spec §7:
//! "never leaks raw stack traces").

use codetriever_indexing::IndexerError;
use codetriever_meta_data::MetaDataError;
use codetriever_search::SearchError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("indexing failed: {0}")]
    Indexing(#[from] IndexerError),

    #[error("query failed: {0}")]
    Search(#[from] SearchError),

    #[error("scope metadata error: {0}")]
    MetaData(#[from] MetaDataError),

    #[error("scope '{0}' has never been indexed; run `codetriever index` first")]
    ScopeNotIndexed(String),

    #[error(transparent)]
    Bootstrap(#[from] Box<dyn std::error::Error>),
}

pub type CliResult<T> = Result<T, CliError>;
