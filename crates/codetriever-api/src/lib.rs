//! Thin HTTP transport shim over the knowledge engine: routes `/index`,
//! `/query`, `/status/{scope_id}`, and `/health` to
//! [`codetriever_indexing::IndexingPipeline`] and
//! [`codetriever_search::Orchestrator`] respectively. Not part of the
//! engine's tested contract — just enough surface to make the crate a
//! runnable service.

pub mod bootstrap;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

#[cfg(test)]
pub mod test_utils;

pub use error::{ApiError, Result};
pub use state::AppState;
