//! Application state for Axum handlers
//!
//! Contains the shared services that are initialized once at startup and
//! passed to all handlers: the query [`Orchestrator`], indexing
//! [`IndexingPipeline`], the [`OverlayManager`] that keeps the orchestrator's
//! overlay partition fresh, and the workspace root they all operate over.

use std::path::PathBuf;
use std::sync::Arc;

use codetriever_indexing::{IndexingPipeline, OverlayManager};
use codetriever_meta_data::ManifestStore;
use codetriever_search::Orchestrator;

/// Shared services handed to every Axum handler.
///
/// Built once at startup by [`crate::bootstrap::initialize_app_state`] and
/// cloned (cheaply, via `Arc`) into each request.
#[derive(Clone)]
pub struct AppState {
    /// Query orchestrator (C9-C16): the single entry point for `/query`.
    /// Reads through the composed base+overlay `VectorStore`.
    pub orchestrator: Arc<Orchestrator>,
    /// Indexing pipeline (C8): the single entry point for `/index`, writing
    /// full/authoritative builds to the base partition.
    pub indexing_pipeline: Arc<IndexingPipeline>,
    /// Keeps the overlay partition current with local git changes since the
    /// base index's recorded revision (spec §4.5).
    pub overlay_manager: Arc<OverlayManager>,
    /// Resolves each scope's manifest, to read the base revision the
    /// overlay should diff against.
    pub manifest_store: Arc<ManifestStore>,
    /// Root of the workspace being indexed and queried.
    pub workspace_root: PathBuf,
}

impl AppState {
    #[must_use]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        indexing_pipeline: Arc<IndexingPipeline>,
        overlay_manager: Arc<OverlayManager>,
        manifest_store: Arc<ManifestStore>,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            orchestrator,
            indexing_pipeline,
            overlay_manager,
            manifest_store,
            workspace_root,
        }
    }
}
