//! Service construction shared by every subcommand: the embedding provider,
//! vector store, optional LLM collaborator, and the two engine entry points
//! ([`IndexingPipeline`] and [`Orchestrator`]) built from one [`EngineConfig`].
//! Mirrors `codetriever-api`'s `bootstrap` module — the CLI and the HTTP
//! server are separate outer surfaces over the same engine, so they wire it
//! up the same way rather than one depending on the other.

use std::path::PathBuf;
use std::sync::Arc;

use codetriever_config::EngineConfig;
use codetriever_embeddings::{DefaultEmbeddingProvider, EmbeddingProvider};
use codetriever_indexing::{IndexingPipeline, OverlayManager};
use codetriever_search::{HttpLlmProvider, LlmProvider, Orchestrator};
use codetriever_vector_data::{LocalFlatStore, OverlayStore, VectorDataResult, VectorStore, build_store};
use tracing::info;

pub type BootstrapResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Everything a subcommand needs: the engine's two entry points plus the
/// workspace root they operate against.
pub struct Engine {
    /// Reads through the composed base+overlay `VectorStore`.
    pub orchestrator: Arc<Orchestrator>,
    /// Writes full/authoritative builds to the base partition.
    pub indexing_pipeline: Arc<IndexingPipeline>,
    /// Keeps the overlay partition current with local git changes since the
    /// base index's recorded revision (spec §4.5).
    pub overlay_manager: Arc<OverlayManager>,
    pub workspace_root: PathBuf,
}

async fn setup_embedding_provider(config: &EngineConfig) -> BootstrapResult<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(DefaultEmbeddingProvider::new(config.embedding.clone()));
    info!("warming up embedding model (downloading if needed)");
    provider.ensure_ready().await?;
    Ok(provider)
}

async fn setup_vector_store(config: &EngineConfig) -> VectorDataResult<Arc<dyn VectorStore>> {
    build_store(&config.vector_storage).await
}

/// An optional LLM collaborator from `CODETRIEVER_LLM_*` env vars. The
/// orchestrator degrades gracefully (heuristic completeness, extractive
/// synthesis) when this is `None`.
fn setup_llm_provider() -> Option<Arc<dyn LlmProvider>> {
    let base_url = std::env::var("CODETRIEVER_LLM_BASE_URL").ok()?;
    let model = std::env::var("CODETRIEVER_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let api_key = std::env::var("CODETRIEVER_LLM_API_KEY").ok();
    info!(%base_url, %model, "LLM collaborator configured");
    Some(Arc::new(HttpLlmProvider::new(base_url, model, api_key)) as Arc<dyn LlmProvider>)
}

/// Build the engine against `workspace_root`.
///
/// # Errors
/// Returns an error if the embedding backend fails to warm up or the
/// configured vector store backend fails to connect.
pub async fn build_engine(config: &EngineConfig, workspace_root: PathBuf) -> BootstrapResult<Engine> {
    let embedding_provider = setup_embedding_provider(config).await?;
    let base_store = setup_vector_store(config).await?;
    let overlay_inner: Arc<dyn VectorStore> = Arc::new(LocalFlatStore::new());
    let overlay_store = Arc::new(OverlayStore::new(Arc::clone(&base_store), overlay_inner));
    let llm_provider = setup_llm_provider();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&overlay_store) as Arc<dyn VectorStore>,
        Arc::clone(&embedding_provider),
        llm_provider,
        config.clone(),
    ));

    let indexing_pipeline = Arc::new(IndexingPipeline::new(
        config.clone(),
        Arc::clone(&embedding_provider),
        base_store,
        workspace_root.clone(),
    ));

    let overlay_manager = Arc::new(OverlayManager::new(
        config.clone(),
        embedding_provider,
        overlay_store,
        workspace_root.clone(),
    ));

    Ok(Engine {
        orchestrator,
        indexing_pipeline,
        overlay_manager,
        workspace_root,
    })
}
