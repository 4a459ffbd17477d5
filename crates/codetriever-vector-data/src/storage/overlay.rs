//! `OverlayStore` (spec §4.5: "`MergedVectorStore`"): a read-only `base`
//! composed with a writable `overlay`, plus delete/modify masks.
//!
//! Spec §9 redesign flag: break the cyclic `OverlayManager` <-> `MergedStore`
//! reference by composing the merged view lazily at query time from stable
//! snapshots (`base` Arc, `overlay` Arc, masks) rather than holding
//! back-references. `OverlayStore` below does exactly that: it holds two
//! `Arc<dyn VectorStore>` and a `RwLock<OverlayMasks>`, nothing cyclic.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::VectorDataResult;
use crate::chunk::Chunk;
use crate::storage::traits::{ScoredChunk, SearchFilters, StorageStats, VectorStore};

/// Paths deleted or modified since the base index was built. Write access is
/// exclusive to [`OverlayManager`]; `OverlayStore` only reads.
#[derive(Debug, Clone, Default)]
pub struct OverlayMasks {
    pub deleted_paths: HashSet<String>,
    pub modified_paths: HashSet<String>,
}

/// Composes a read-only `base` with a writable `overlay`.
///
/// Search policy (spec §4.5):
/// 1. Fan out `search` to both, over-fetching from base (2x limit) to
///    survive filtering.
/// 2. Drop base results whose `path` is in `deleted ∪ modified ∪ (paths
///    appearing in overlay results)`.
/// 3. Merge; sort by score descending; return top `limit`.
///
/// Write policy: `replace_scope`/`upsert_chunks`/`update_scope`/`delete_scope`
/// target the overlay only — the base partition is never mutated through
/// this type.
pub struct OverlayStore {
    base: Arc<dyn VectorStore>,
    overlay: Arc<dyn VectorStore>,
    masks: Arc<RwLock<OverlayMasks>>,
}

impl OverlayStore {
    #[must_use]
    pub fn new(base: Arc<dyn VectorStore>, overlay: Arc<dyn VectorStore>) -> Self {
        Self {
            base,
            overlay,
            masks: Arc::new(RwLock::new(OverlayMasks::default())),
        }
    }

    /// Replace the delete/modify masks wholesale (called by `OverlayManager`
    /// after a rebuild).
    pub async fn set_masks(&self, masks: OverlayMasks) {
        *self.masks.write().await = masks;
    }

    #[must_use]
    pub fn masks_handle(&self) -> Arc<RwLock<OverlayMasks>> {
        self.masks.clone()
    }
}

#[async_trait]
impl VectorStore for OverlayStore {
    async fn replace_scope(&self, scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        self.overlay.replace_scope(scope_id, chunks).await
    }

    async fn upsert_chunks(&self, scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        self.overlay.upsert_chunks(scope_id, chunks).await
    }

    async fn update_scope(
        &self,
        scope_id: &str,
        chunks: Vec<Chunk>,
        deleted_paths: &[String],
    ) -> VectorDataResult<()> {
        self.overlay.update_scope(scope_id, chunks, deleted_paths).await
    }

    async fn delete_scope(&self, scope_id: &str) -> VectorDataResult<()> {
        self.overlay.delete_scope(scope_id).await
    }

    async fn scope_exists(&self, scope_id: &str) -> VectorDataResult<bool> {
        Ok(self.base.scope_exists(scope_id).await? || self.overlay.scope_exists(scope_id).await?)
    }

    async fn get_all_chunks(
        &self,
        scope_id: &str,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<Chunk>> {
        let masks = self.masks.read().await.clone();
        let overlay_chunks = self.overlay.get_all_chunks(scope_id, filters).await?;
        let overlay_paths: HashSet<&str> = overlay_chunks.iter().map(|c| c.path.as_str()).collect();

        let mut base_chunks = self.base.get_all_chunks(scope_id, filters).await?;
        base_chunks.retain(|c| {
            !masks.deleted_paths.contains(&c.path)
                && !masks.modified_paths.contains(&c.path)
                && !overlay_paths.contains(c.path.as_str())
        });

        base_chunks.extend(overlay_chunks);
        Ok(base_chunks)
    }

    async fn search(
        &self,
        scope_id: &str,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<ScoredChunk>> {
        let masks = self.masks.read().await.clone();

        let overlay_results = self.overlay.search(scope_id, vector, limit, filters).await?;
        let overlay_paths: HashSet<&str> =
            overlay_results.iter().map(|r| r.chunk.path.as_str()).collect();

        // Over-fetch from base so dropping masked/shadowed paths still leaves
        // enough candidates to fill `limit` after the merge.
        let base_results = self.base.search(scope_id, vector, limit * 2, filters).await?;

        let mut merged: Vec<ScoredChunk> = base_results
            .into_iter()
            .filter(|r| {
                !masks.deleted_paths.contains(&r.chunk.path)
                    && !masks.modified_paths.contains(&r.chunk.path)
                    && !overlay_paths.contains(r.chunk.path.as_str())
            })
            .collect();
        merged.extend(overlay_results);

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        merged.truncate(limit);
        Ok(merged)
    }

    async fn stats(&self, scope_id: &str) -> VectorDataResult<StorageStats> {
        let base_stats = self.base.stats(scope_id).await?;
        let overlay_stats = self.overlay.stats(scope_id).await?;
        Ok(StorageStats {
            chunk_count: base_stats.chunk_count + overlay_stats.chunk_count,
            file_count: base_stats.file_count.max(overlay_stats.file_count),
            storage_type: format!("overlay({}+{})", base_stats.storage_type, overlay_stats.storage_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, ChunkMetadata, Span};
    use crate::storage::local_flat::LocalFlatStore;
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
    async fn deleted_paths_never_appear_in_merged_search() {
        let base = Arc::new(LocalFlatStore::new());
        let overlay = Arc::new(LocalFlatStore::new());
        base.replace_scope("s", vec![make_chunk("a", "src/a.ts", vec![1.0, 0.0])]).await.unwrap();

        let merged = OverlayStore::new(base, overlay);
        merged
            .set_masks(OverlayMasks {
                deleted_paths: ["src/a.ts".to_string()].into_iter().collect(),
                modified_paths: HashSet::new(),
            })
            .await;

        let results = merged.search("s", &[1.0, 0.0], 10, &SearchFilters::default()).await.unwrap();
        assert!(results.iter().all(|r| r.chunk.path != "src/a.ts"));
    }

    #[tokio::test]
    async fn modified_paths_are_served_only_from_overlay() {
        let base = Arc::new(LocalFlatStore::new());
        let overlay = Arc::new(LocalFlatStore::new());
        base.replace_scope("s", vec![make_chunk("a-old", "src/a.ts", vec![1.0, 0.0])]).await.unwrap();
        overlay
            .replace_scope("s", vec![make_chunk("a-new", "src/a.ts", vec![1.0, 0.0])])
            .await
            .unwrap();

        let merged = OverlayStore::new(base, overlay);
        merged
            .set_masks(OverlayMasks {
                deleted_paths: HashSet::new(),
                modified_paths: ["src/a.ts".to_string()].into_iter().collect(),
            })
            .await;

        let results = merged.search("s", &[1.0, 0.0], 10, &SearchFilters::default()).await.unwrap();
        let a_results: Vec<_> = results.iter().filter(|r| r.chunk.path == "src/a.ts").collect();
        assert_eq!(a_results.len(), 1);
        assert_eq!(a_results[0].chunk.chunk_id, "a-new");
    }

    #[tokio::test]
    async fn writes_target_overlay_only() {
        let base = Arc::new(LocalFlatStore::new());
        let overlay = Arc::new(LocalFlatStore::new());
        let merged = OverlayStore::new(base.clone(), overlay.clone());

        merged.upsert_chunks("s", vec![make_chunk("a", "a.ts", vec![1.0])]).await.unwrap();

        assert!(!base.scope_exists("s").await.unwrap());
        assert!(overlay.scope_exists("s").await.unwrap());
    }
}
