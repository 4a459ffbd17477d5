//! In-process flat vector store: the spec's default/local backend (§6 "local
//! flat / external service").
//!
//! Chunks are held in memory behind a per-scope `RwLock`, keyed by
//! `chunk_id`. Search is brute-force cosine similarity over the scope's
//! chunks; this is the "flat" in "local flat" — no ANN index. That's
//! appropriate for a single workspace's worth of chunks and keeps the
//! implementation free of an external service dependency.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::VectorDataResult;
use crate::chunk::Chunk;
use crate::storage::traits::{ScoredChunk, SearchFilters, StorageStats, VectorStore};

#[derive(Default)]
struct ScopePartition {
    chunks: HashMap<String, Chunk>,
}

/// In-memory `VectorStore` implementation. One [`ScopePartition`] per scope,
/// each behind its own lock so concurrent scopes don't contend.
#[derive(Clone, Default)]
pub struct LocalFlatStore {
    scopes: Arc<DashMap<String, Arc<RwLock<ScopePartition>>>>,
}

impl LocalFlatStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, scope_id: &str) -> Arc<RwLock<ScopePartition>> {
        self.scopes.entry(scope_id.to_string()).or_default().clone()
    }
}

/// Cosine similarity mapped into `[0, 1]` via `(cos + 1) / 2`, matching
/// spec §4.4's "cosine-similarity-like in `[0, 1]`, implementation-defined
/// monotone transform" requirement.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cos = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (cos + 1.0) / 2.0
}

#[async_trait]
impl VectorStore for LocalFlatStore {
    async fn replace_scope(&self, scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        let partition = self.partition(scope_id);
        let mut guard = partition.write().await;
        guard.chunks = chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();
        Ok(())
    }

    async fn upsert_chunks(&self, scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        let partition = self.partition(scope_id);
        let mut guard = partition.write().await;
        for chunk in chunks {
            guard.chunks.insert(chunk.chunk_id.clone(), chunk);
        }
        Ok(())
    }

    async fn update_scope(
        &self,
        scope_id: &str,
        chunks: Vec<Chunk>,
        deleted_paths: &[String],
    ) -> VectorDataResult<()> {
        let partition = self.partition(scope_id);
        let mut guard = partition.write().await;
        if !deleted_paths.is_empty() {
            guard.chunks.retain(|_, c| !deleted_paths.contains(&c.path));
        }
        for chunk in chunks {
            guard.chunks.insert(chunk.chunk_id.clone(), chunk);
        }
        Ok(())
    }

    async fn delete_scope(&self, scope_id: &str) -> VectorDataResult<()> {
        self.scopes.remove(scope_id);
        Ok(())
    }

    async fn scope_exists(&self, scope_id: &str) -> VectorDataResult<bool> {
        Ok(self.scopes.contains_key(scope_id))
    }

    async fn get_all_chunks(
        &self,
        scope_id: &str,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<Chunk>> {
        let Some(partition) = self.scopes.get(scope_id).map(|p| p.clone()) else {
            return Ok(Vec::new());
        };
        let guard = partition.read().await;
        Ok(guard.chunks.values().filter(|c| filters.matches(c)).cloned().collect())
    }

    async fn search(
        &self,
        scope_id: &str,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<ScoredChunk>> {
        let Some(partition) = self.scopes.get(scope_id).map(|p| p.clone()) else {
            return Ok(Vec::new());
        };
        let guard = partition.read().await;
        let mut results: Vec<ScoredChunk> = guard
            .chunks
            .values()
            .filter(|c| filters.matches(c))
            .map(|c| ScoredChunk {
                chunk: c.clone(),
                score: cosine_similarity(vector, &c.embedding),
            })
            .collect();

        // score desc, chunk_id asc (spec §5 ordering guarantee)
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn stats(&self, scope_id: &str) -> VectorDataResult<StorageStats> {
        let Some(partition) = self.scopes.get(scope_id).map(|p| p.clone()) else {
            return Ok(StorageStats {
                storage_type: "local_flat".to_string(),
                ..Default::default()
            });
        };
        let guard = partition.read().await;
        let file_count = guard
            .chunks
            .values()
            .map(|c| c.source_id.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        Ok(StorageStats {
            chunk_count: guard.chunks.len(),
            file_count,
            storage_type: "local_flat".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, ChunkMetadata, Span};
    use chrono::Utc;

    fn make_chunk(id: &str, path: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            scope_id: "s".to_string(),
            source_id: path.to_string(),
            path: path.to_string(),
            span: Span::new(1, 5),
            text: "fn x() {}".to_string(),
            score: 0.0,
            metadata: ChunkMetadata::new(
                ChunkKind::Code,
                Some("rust".to_string()),
                "hash".to_string(),
                Utc::now(),
                "rev-1".to_string(),
                Utc::now(),
            ),
            embedding,
        }
    }

    #[tokio::test]
    async fn search_orders_by_score_desc_then_chunk_id_asc() {
        let store = LocalFlatStore::new();
        let chunks = vec![
            make_chunk("b", "b.rs", vec![1.0, 0.0]),
            make_chunk("a", "a.rs", vec![1.0, 0.0]),
            make_chunk("c", "c.rs", vec![0.0, 1.0]),
        ];
        store.replace_scope("s", chunks).await.unwrap();

        let results = store.search("s", &[1.0, 0.0], 10, &SearchFilters::default()).await.unwrap();
        assert_eq!(results[0].chunk.chunk_id, "a");
        assert_eq!(results[1].chunk.chunk_id, "b");
        assert_eq!(results[2].chunk.chunk_id, "c");
    }

    #[tokio::test]
    async fn update_scope_removes_deleted_paths_and_upserts() {
        let store = LocalFlatStore::new();
        store
            .replace_scope("s", vec![make_chunk("a", "a.rs", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .update_scope("s", vec![make_chunk("b", "b.rs", vec![0.0, 1.0])], &["a.rs".to_string()])
            .await
            .unwrap();

        let all = store.get_all_chunks("s", &SearchFilters::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].chunk_id, "b");
    }

    #[tokio::test]
    async fn empty_scope_returns_empty_results() {
        let store = LocalFlatStore::new();
        assert!(!store.scope_exists("missing").await.unwrap());
        assert!(store.search("missing", &[1.0], 10, &SearchFilters::default()).await.unwrap().is_empty());
    }
}
