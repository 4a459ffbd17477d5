//! Scoped chunk storage: the unit-of-retrieval data model plus pluggable
//! backends (in-process flat store, external Qdrant service, and the
//! overlay composition that sits in front of either for live edits).

pub mod chunk;
pub mod error;
pub mod storage;

pub use chunk::{Chunk, ChunkKind, ChunkMetadata, Span, generate_chunk_id, hash_content};
pub use error::{VectorDataError, VectorDataResult};
pub use storage::{
    LocalFlatStore, MockStorage, OverlayMasks, OverlayStore, QdrantStore, ScoredChunk,
    SearchFilters, StorageStats, VectorStore,
};

pub use codetriever_config::{VectorBackend, VectorStorageConfig};

/// Construct the configured `VectorStore` backend.
///
/// # Errors
/// Propagates connection errors from [`QdrantStore::connect`].
pub async fn build_store(
    config: &VectorStorageConfig,
) -> VectorDataResult<std::sync::Arc<dyn VectorStore>> {
    match config.backend {
        VectorBackend::Local => Ok(std::sync::Arc::new(LocalFlatStore::new())),
        VectorBackend::Qdrant => {
            let store = QdrantStore::connect(
                &config.url,
                config.collection_name.clone(),
                config.vector_dimension as u64,
            )
            .await?;
            Ok(std::sync::Arc::new(store))
        }
    }
}
