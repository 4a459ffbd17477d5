//! Integration test utilities: builds a full [`AppState`] around an
//! in-memory [`LocalFlatStore`] and a deterministic stub embedding provider,
//! so route tests exercise the real `Orchestrator`/`IndexingPipeline` wiring
//! without a model download or an external vector database.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use codetriever_api::AppState;
use codetriever_config::EngineConfig;
use codetriever_embeddings::{EmbeddingProvider, EmbeddingResult};
use codetriever_indexing::{IndexingPipeline, OverlayManager};
use codetriever_meta_data::ManifestStore;
use codetriever_search::Orchestrator;
use codetriever_vector_data::{LocalFlatStore, OverlayStore, VectorStore};
use tempfile::TempDir;

const STUB_DIMENSION: usize = 8;

/// Deterministic embedding stub: every text maps to the same vector, which
/// is enough for [`LocalFlatStore`]'s cosine search to return *something*
/// without needing semantically meaningful vectors.
struct StubEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.1_f32; STUB_DIMENSION]).collect())
    }

    fn embedding_dimension(&self) -> usize {
        STUB_DIMENSION
    }

    fn max_tokens(&self) -> usize {
        8192
    }

    fn model_name(&self) -> &str {
        "stub-embedding-model"
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn ensure_ready(&self) -> EmbeddingResult<()> {
        Ok(())
    }
}

/// Owns the workspace tempdir so it outlives the returned [`AppState`] —
/// dropping it would delete the fixture files mid-test.
pub struct TestApp {
    pub state: AppState,
    pub workspace: TempDir,
}

impl TestApp {
    pub fn workspace_path(&self) -> PathBuf {
        self.workspace.path().to_path_buf()
    }
}

/// Build a fresh [`AppState`] rooted at a new temp workspace.
pub fn build_test_app() -> TestApp {
    let workspace = TempDir::new().expect("create temp workspace");
    let config = EngineConfig::from_env();

    let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbeddingProvider);
    let base_store = Arc::new(LocalFlatStore::new());
    let overlay_inner: Arc<dyn VectorStore> = Arc::new(LocalFlatStore::new());
    let overlay_store = Arc::new(OverlayStore::new(base_store.clone(), overlay_inner));

    let orchestrator = Arc::new(Orchestrator::new(
        overlay_store.clone() as Arc<dyn VectorStore>,
        embedding_provider.clone(),
        None,
        config.clone(),
    ));
    let indexing_pipeline = Arc::new(IndexingPipeline::new(
        config.clone(),
        embedding_provider.clone(),
        base_store,
        workspace.path(),
    ));
    let overlay_manager = Arc::new(OverlayManager::new(
        config,
        embedding_provider,
        overlay_store,
        workspace.path(),
    ));
    let manifest_store = Arc::new(ManifestStore::new(workspace.path()));

    TestApp {
        state: AppState::new(
            orchestrator,
            indexing_pipeline,
            overlay_manager,
            manifest_store,
            workspace.path().to_path_buf(),
        ),
        workspace,
    }
}

/// Write a small, realistic fixture workspace (one source file, one doc)
/// that chunks and indexes cleanly.
pub fn write_fixture_files(root: &std::path::Path) {
    std::fs::write(
        root.join("lib.rs"),
        "/// Adds two numbers.\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
    )
    .expect("write lib.rs");
    std::fs::write(
        root.join("README.md"),
        "# Demo\n\nThis workspace exposes an `add` function for integration tests.\n",
    )
    .expect("write README.md");
}
