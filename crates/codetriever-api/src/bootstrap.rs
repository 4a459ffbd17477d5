//! Application bootstrap and service initialization
//!
//! Separates configuration and initialization logic from the main entry
//! point: builds the embedding provider, vector store, optional LLM
//! collaborator, query orchestrator, and indexing pipeline from a single
//! [`EngineConfig`], then assembles [`AppState`].

use std::path::PathBuf;
use std::sync::Arc;

use codetriever_config::EngineConfig;
use codetriever_embeddings::{DefaultEmbeddingProvider, EmbeddingProvider};
use codetriever_indexing::{IndexingPipeline, OverlayManager};
use codetriever_meta_data::ManifestStore;
use codetriever_search::{HttpLlmProvider, LlmProvider, Orchestrator};
use codetriever_vector_data::{LocalFlatStore, OverlayStore, VectorDataResult, VectorStore, build_store};
use tracing::info;

use crate::state::AppState;

/// Bootstrap result type
pub type BootstrapResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Build the embedding provider configured by `config.embedding` and warm it
/// up before the server starts accepting requests.
///
/// # Errors
/// Returns an error if the embedding backend fails to become ready.
pub async fn setup_embedding_provider(
    config: &EngineConfig,
) -> BootstrapResult<Arc<dyn EmbeddingProvider>> {
    info!("Initializing embedding provider...");
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(DefaultEmbeddingProvider::new(config.embedding.clone()));

    info!("Warming up embedding model (downloading if needed)...");
    provider.ensure_ready().await?;
    info!("Embedding model ready");

    Ok(provider)
}

/// Build the configured vector store backend (local flat file or Qdrant).
///
/// # Errors
/// Propagates connection errors from the backend.
pub async fn setup_vector_store(
    config: &EngineConfig,
) -> VectorDataResult<Arc<dyn VectorStore>> {
    info!("Initializing vector store...");
    build_store(&config.vector_storage).await
}

/// Build an optional LLM collaborator from environment variables. The
/// orchestrator degrades gracefully (heuristic completeness, extractive
/// synthesis) when no LLM is configured, so this is `None` by default.
#[must_use]
pub fn setup_llm_provider() -> Option<Arc<dyn LlmProvider>> {
    let base_url = std::env::var("CODETRIEVER_LLM_BASE_URL").ok()?;
    let model = std::env::var("CODETRIEVER_LLM_MODEL")
        .unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let api_key = std::env::var("CODETRIEVER_LLM_API_KEY").ok();
    info!(%base_url, %model, "LLM collaborator configured");
    Some(Arc::new(HttpLlmProvider::new(base_url, model, api_key)) as Arc<dyn LlmProvider>)
}

/// Root of the workspace to index and query, from `CODETRIEVER_WORKSPACE_ROOT`
/// or the current working directory.
#[must_use]
pub fn workspace_root() -> PathBuf {
    std::env::var("CODETRIEVER_WORKSPACE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Initialize all services and create application state.
///
/// # Errors
/// Returns an error if any service initialization fails.
pub async fn initialize_app_state(config: &EngineConfig) -> BootstrapResult<AppState> {
    let root = workspace_root();

    // 1. Embedding provider (needed by the orchestrator and the pipeline)
    let embedding_provider = setup_embedding_provider(config).await?;

    // 2. Vector store: a base partition (the configured backend, written by
    // full/authoritative IndexingPipeline runs) composed with a local
    // overlay partition (written only by OverlayManager) into the
    // OverlayStore the orchestrator actually reads through (spec §4.5).
    let base_store = setup_vector_store(config).await?;
    let overlay_inner: Arc<dyn VectorStore> = Arc::new(LocalFlatStore::new());
    let overlay_store = Arc::new(OverlayStore::new(Arc::clone(&base_store), overlay_inner));

    // 3. Optional LLM collaborator
    let llm_provider = setup_llm_provider();

    // 4. Query orchestrator reads through the composed base+overlay store
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&overlay_store) as Arc<dyn VectorStore>,
        Arc::clone(&embedding_provider),
        llm_provider,
        config.clone(),
    ));

    // 5. Indexing pipeline writes full/authoritative builds to the base
    let indexing_pipeline = Arc::new(IndexingPipeline::new(
        config.clone(),
        Arc::clone(&embedding_provider),
        base_store,
        root.clone(),
    ));

    // 6. Overlay manager keeps the overlay partition current with local git
    // changes since the base index's recorded revision
    let overlay_manager = Arc::new(OverlayManager::new(
        config.clone(),
        embedding_provider,
        overlay_store,
        root.clone(),
    ));
    let manifest_store = Arc::new(ManifestStore::new(root.clone()));

    info!("Application state initialized successfully");
    Ok(AppState::new(orchestrator, indexing_pipeline, overlay_manager, manifest_store, root))
}
