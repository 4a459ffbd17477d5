//! In-memory `VectorStore` with failure injection, for unit tests that need
//! to exercise error paths `LocalFlatStore` can't produce on demand.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::chunk::Chunk;
use crate::error::{VectorDataError, VectorDataResult};
use crate::storage::traits::{ScoredChunk, SearchFilters, StorageStats, VectorStore};

/// Mock storage backend for testing failure handling in callers.
#[derive(Clone, Default)]
pub struct MockStorage {
    chunks: Arc<Mutex<Vec<Chunk>>>,
    fail_on_store: bool,
    fail_on_search: bool,
}

impl MockStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_store_failure(mut self) -> Self {
        self.fail_on_store = true;
        self
    }

    #[must_use]
    pub fn with_search_failure(mut self) -> Self {
        self.fail_on_search = true;
        self
    }

    /// Snapshot of everything currently stored, for test assertions.
    #[must_use]
    pub fn get_chunks(&self) -> Vec<Chunk> {
        self.chunks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl VectorStore for MockStorage {
    async fn replace_scope(&self, _scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        if self.fail_on_store {
            return Err(VectorDataError::Storage("mock storage configured to fail".into()));
        }
        *self.chunks.lock().unwrap_or_else(|e| e.into_inner()) = chunks;
        Ok(())
    }

    async fn upsert_chunks(&self, _scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        if self.fail_on_store {
            return Err(VectorDataError::Storage("mock storage configured to fail".into()));
        }
        let mut stored = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        for chunk in chunks {
            if let Some(existing) = stored.iter_mut().find(|c| c.chunk_id == chunk.chunk_id) {
                *existing = chunk;
            } else {
                stored.push(chunk);
            }
        }
        Ok(())
    }

    async fn update_scope(
        &self,
        scope_id: &str,
        chunks: Vec<Chunk>,
        deleted_paths: &[String],
    ) -> VectorDataResult<()> {
        {
            let mut stored = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
            stored.retain(|c| !deleted_paths.contains(&c.path));
        }
        self.upsert_chunks(scope_id, chunks).await
    }

    async fn delete_scope(&self, _scope_id: &str) -> VectorDataResult<()> {
        self.chunks.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    async fn scope_exists(&self, _scope_id: &str) -> VectorDataResult<bool> {
        Ok(!self.chunks.lock().unwrap_or_else(|e| e.into_inner()).is_empty())
    }

    async fn get_all_chunks(
        &self,
        _scope_id: &str,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<Chunk>> {
        Ok(self
            .chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| filters.matches(c))
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        _scope_id: &str,
        _vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<ScoredChunk>> {
        if self.fail_on_search {
            return Err(VectorDataError::Storage("mock storage configured to fail".into()));
        }
        let stored = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(stored
            .iter()
            .filter(|c| filters.matches(c))
            .take(limit)
            .enumerate()
            .map(|(i, chunk)| ScoredChunk {
                chunk: chunk.clone(),
                score: 1.0 - (i as f32 * 0.1),
            })
            .collect())
    }

    async fn stats(&self, _scope_id: &str) -> VectorDataResult<StorageStats> {
        let stored = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        let file_count = stored
            .iter()
            .map(|c| c.source_id.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        Ok(StorageStats {
            chunk_count: stored.len(),
            file_count,
            storage_type: "mock".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, ChunkMetadata, Span};
    use chrono::Utc;

    fn make_chunk(id: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            scope_id: "s".to_string(),
            source_id: "test.rs".to_string(),
            path: "test.rs".to_string(),
            span: Span::new(1, 1),
            text: "fn main() {}".to_string(),
            score: 0.0,
            metadata: ChunkMetadata::new(
                ChunkKind::Code,
                Some("rust".to_string()),
                "hash".to_string(),
                Utc::now(),
                "rev-1".to_string(),
                Utc::now(),
            ),
            embedding: vec![0.1; 768],
        }
    }

    #[tokio::test]
    async fn basic_store_and_search_roundtrip() {
        let storage = MockStorage::new();
        storage.upsert_chunks("s", vec![make_chunk("a")]).await.unwrap();

        let results = storage.search("s", &[0.1; 768], 10, &SearchFilters::default()).await.unwrap();
        assert_eq!(results.len(), 1);

        let stats = storage.stats("s").await.unwrap();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.storage_type, "mock");
    }

    #[tokio::test]
    async fn failure_modes_return_errors() {
        let storage = MockStorage::new().with_store_failure();
        assert!(storage.upsert_chunks("s", vec![make_chunk("a")]).await.is_err());

        let storage = MockStorage::new().with_search_failure();
        assert!(storage.search("s", &[0.1; 768], 10, &SearchFilters::default()).await.is_err());
    }

    #[tokio::test]
    async fn delete_scope_clears_all_chunks() {
        let storage = MockStorage::new();
        storage.upsert_chunks("s", vec![make_chunk("a")]).await.unwrap();
        storage.delete_scope("s").await.unwrap();
        assert!(!storage.scope_exists("s").await.unwrap());
    }
}
