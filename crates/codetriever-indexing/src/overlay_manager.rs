//! `OverlayManager` (spec §4.5): keeps an [`OverlayStore`]'s delete/modify
//! masks and overlay-partition content current with local git changes since
//! a base index's recorded revision, without ever touching the base
//! partition.
//!
//! Spec §9 redesign flag: rather than re-implementing Filtering → Parallel
//! Chunking → Embedding → Storage, this composes the same free functions
//! [`IndexingPipeline`](crate::pipeline::IndexingPipeline) uses, pointed at
//! the overlay-only subset of files `GitChangeDetector` reports touched.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use codetriever_config::EngineConfig;
use codetriever_embeddings::{EmbeddingProvider, RateLimiter};
use codetriever_meta_data::{GitChangeDetector, ManifestStore, OverlayState, StalenessLevel};
use codetriever_parsing::chunker::ChunkerRegistry;
use codetriever_vector_data::{OverlayMasks, OverlayStore};

use crate::chunking::chunk_files;
use crate::discovery::DiscoveredFile;
use crate::embedding::embed_chunks;
use crate::error::IndexerResult;
use crate::filtering::filter_files;
use crate::memory::{MemoryAwareQueue, MemoryMonitor};
use crate::storage::store_chunks;

/// Rebuilds the overlay partition of an [`OverlayStore`] on demand, keyed off
/// the base index's `git_revision` and an age-based TTL.
pub struct OverlayManager {
    config: EngineConfig,
    chunker_registry: Arc<ChunkerRegistry>,
    memory_monitor: Arc<MemoryMonitor>,
    rate_limiter: Arc<RateLimiter>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    overlay_store: Arc<OverlayStore>,
    manifest_store: ManifestStore,
}

impl OverlayManager {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        overlay_store: Arc<OverlayStore>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        let chunker_registry = Arc::new(ChunkerRegistry::new(
            config.embedding.max_tokens,
            config.chunking.overlap_lines,
            config.chunking.max_lines_code,
            config.chunking.max_lines_docs,
            config.chunking.overlap_lines,
        ));
        let memory_monitor = Arc::new(MemoryMonitor::from_config(&config.memory));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let manifest_store = ManifestStore::new(workspace_root);
        Self {
            config,
            chunker_registry,
            memory_monitor,
            rate_limiter,
            embedding_provider,
            overlay_store,
            manifest_store,
        }
    }

    /// Ensure `scope_id`'s overlay reflects local changes since
    /// `base_revision` (the base index's `git_revision`, if any), rebuilding
    /// it when stale, and return the current [`OverlayState`].
    ///
    /// "Stale" means either the recorded `base_revision` no longer matches
    /// the base index's, or the previous overlay has outlived
    /// `overlay.ttl_secs` (spec §4.5). A still-fresh prior state is returned
    /// without touching git or the overlay store at all.
    ///
    /// # Errors
    /// Propagates the first error any reused pipeline stage or the manifest
    /// store encounters. Git failures (no repository, unresolvable base
    /// revision) degrade to a hard-stale, empty-mask overlay rather than
    /// failing the query path — a query against a non-git workspace should
    /// still be answerable from the base index alone.
    pub async fn refresh(
        &self,
        scope_id: &str,
        root: &Path,
        base_revision: Option<&str>,
    ) -> IndexerResult<OverlayState> {
        let prior = self.manifest_store.load_overlay_state(scope_id).await?;

        let Some(base_revision) = base_revision else {
            return Ok(prior.unwrap_or_else(|| empty_state(String::new(), StalenessLevel::Fresh)));
        };

        if let Some(state) = &prior
            && state.base_revision == base_revision
            && !self.ttl_expired(state)
        {
            return Ok(state.clone());
        }

        let Ok(detector) = GitChangeDetector::discover(root).await else {
            self.overlay_store.set_masks(OverlayMasks::default()).await;
            let state = empty_state(base_revision.to_string(), StalenessLevel::Fresh);
            self.manifest_store.save_overlay_state(scope_id, &state).await?;
            return Ok(state);
        };

        let changes = match detector.enumerate_changes(base_revision).await {
            Ok(changes) => changes,
            Err(_) => {
                // Base revision unresolvable (rebased/force-pushed history):
                // keep serving the prior overlay, but mark it hard-stale
                // rather than failing the query path.
                let state = prior.map_or_else(
                    || empty_state(base_revision.to_string(), StalenessLevel::HardStale),
                    |mut s| {
                        s.staleness = StalenessLevel::HardStale;
                        s
                    },
                );
                self.manifest_store.save_overlay_state(scope_id, &state).await?;
                return Ok(state);
            }
        };

        let deleted_paths = changes.all_deleted_paths();
        let modified_paths = changes.all_touched_paths();

        self.overlay_store
            .set_masks(OverlayMasks {
                deleted_paths: deleted_paths.iter().cloned().collect(),
                modified_paths: modified_paths.iter().cloned().collect(),
            })
            .await;

        if modified_paths.is_empty() {
            let state = OverlayState {
                base_revision: base_revision.to_string(),
                built_at: Utc::now(),
                modified_paths,
                deleted_paths,
                chunk_count: 0,
                staleness: StalenessLevel::Fresh,
            };
            self.manifest_store.save_overlay_state(scope_id, &state).await?;
            return Ok(state);
        }

        let chunk_count = self.reindex_into_overlay(scope_id, root, &modified_paths, &deleted_paths).await?;

        let state = OverlayState {
            base_revision: base_revision.to_string(),
            built_at: Utc::now(),
            modified_paths,
            deleted_paths,
            chunk_count,
            staleness: StalenessLevel::Fresh,
        };
        self.manifest_store.save_overlay_state(scope_id, &state).await?;
        Ok(state)
    }

    /// Run the Filtering → Parallel Chunking → Embedding → Storage stages
    /// against exactly `modified_paths`, writing into `self.overlay_store`
    /// (which routes every write to its overlay partition, never the base).
    async fn reindex_into_overlay(
        &self,
        scope_id: &str,
        root: &Path,
        modified_paths: &[String],
        deleted_paths: &[String],
    ) -> IndexerResult<usize> {
        let discovered: Vec<DiscoveredFile> =
            modified_paths.iter().map(|p| DiscoveredFile { path: p.clone() }).collect();

        // An empty `known` map and empty `unchanged_paths` set force every
        // path GitChangeDetector reported through Filtering's content-hash
        // tier, regardless of what the base index's own manifest thinks.
        let (filtered, _skipped) =
            filter_files(root, &discovered, &HashMap::new(), &HashSet::new()).await?;

        let overlay_revision = format!("overlay-{}", uuid::Uuid::new_v4());
        let queue = MemoryAwareQueue::new(Arc::clone(&self.memory_monitor), &self.config.memory);
        let (chunks, _chunk_errors) = chunk_files(
            Arc::clone(&self.chunker_registry),
            queue,
            filtered,
            scope_id,
            &overlay_revision,
            self.config.indexing.max_errors,
        )
        .await?;

        let (embedded, _embed_errors) = embed_chunks(
            Arc::clone(&self.embedding_provider),
            Arc::clone(&self.rate_limiter),
            chunks,
            self.config.indexing.embed_batch_target_tokens,
            self.config.indexing.embed_max_concurrency,
            self.config.indexing.embed_max_retries,
            self.config.indexing.embed_retry_delay_ms,
        )
        .await?;
        let chunk_count = embedded.len();

        store_chunks(
            self.overlay_store.as_ref(),
            scope_id,
            embedded,
            deleted_paths,
            self.config.indexing.storage_batch_size,
        )
        .await?;

        Ok(chunk_count)
    }

    fn ttl_expired(&self, state: &OverlayState) -> bool {
        let age = Utc::now().signed_duration_since(state.built_at);
        age.num_seconds() >= i64::try_from(self.config.overlay.ttl_secs).unwrap_or(i64::MAX)
    }
}

fn empty_state(base_revision: String, staleness: StalenessLevel) -> OverlayState {
    OverlayState {
        base_revision,
        built_at: Utc::now(),
        modified_paths: Vec::new(),
        deleted_paths: Vec::new(),
        chunk_count: 0,
        staleness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codetriever_config::EngineConfig;
    use codetriever_vector_data::LocalFlatStore;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    struct StubProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed_batch(
            &self,
            texts: &[&str],
        ) -> codetriever_embeddings::EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1_f32; 8]).collect())
        }
        fn embedding_dimension(&self) -> usize {
            8
        }
        fn max_tokens(&self) -> usize {
            8192
        }
        fn model_name(&self) -> &str {
            "stub"
        }
        async fn is_ready(&self) -> bool {
            true
        }
        async fn ensure_ready(&self) -> codetriever_embeddings::EmbeddingResult<()> {
            Ok(())
        }
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) -> String {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "Test"]);
        fs::write(dir.join("a.rs"), "fn a() {}\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "base"]);
        let out = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(dir)
            .output()
            .unwrap();
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    fn make_manager(dir: &Path) -> OverlayManager {
        let config = EngineConfig::from_env();
        let base = Arc::new(LocalFlatStore::new());
        let overlay = Arc::new(LocalFlatStore::new());
        let store = Arc::new(OverlayStore::new(base, overlay));
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(StubProvider);
        OverlayManager::new(config, provider, store, dir)
    }

    #[tokio::test]
    async fn no_base_revision_returns_empty_fresh_state() {
        let dir = TempDir::new().unwrap();
        let manager = make_manager(dir.path());
        let state = manager.refresh("scope-1", dir.path(), None).await.unwrap();
        assert_eq!(state.staleness, StalenessLevel::Fresh);
        assert!(state.modified_paths.is_empty());
    }

    #[tokio::test]
    async fn outside_git_repo_clears_masks_and_is_fresh() {
        let dir = TempDir::new().unwrap();
        let manager = make_manager(dir.path());
        let state = manager.refresh("scope-1", dir.path(), Some("deadbeef")).await.unwrap();
        assert_eq!(state.staleness, StalenessLevel::Fresh);
        assert_eq!(state.base_revision, "deadbeef");
    }

    #[tokio::test]
    async fn new_file_since_base_revision_is_reindexed_into_overlay() {
        let dir = TempDir::new().unwrap();
        let base_revision = init_repo(dir.path());
        fs::write(dir.path().join("b.rs"), "fn b() { /* new */ }\n").unwrap();

        let manager = make_manager(dir.path());
        let state = manager.refresh("scope-1", dir.path(), Some(&base_revision)).await.unwrap();

        assert_eq!(state.staleness, StalenessLevel::Fresh);
        assert!(state.modified_paths.iter().any(|p| p == "b.rs"));
        assert!(state.chunk_count > 0);
    }

    #[tokio::test]
    async fn fresh_prior_state_is_reused_without_rerunning_git() {
        let dir = TempDir::new().unwrap();
        let base_revision = init_repo(dir.path());

        let manager = make_manager(dir.path());
        let first = manager.refresh("scope-1", dir.path(), Some(&base_revision)).await.unwrap();
        let second = manager.refresh("scope-1", dir.path(), Some(&base_revision)).await.unwrap();

        assert_eq!(first.built_at, second.built_at);
    }
}
