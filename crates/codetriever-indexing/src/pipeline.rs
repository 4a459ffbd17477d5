//! `IndexingPipeline` (C8): Discovery → Filtering → Parallel Chunking →
//! Embedding → Storage, run in-process and awaited by the caller. No
//! background daemon or job table — every stage runs to completion before
//! the next starts, short-circuiting on an empty result (spec §4.3).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use codetriever_config::EngineConfig;
use codetriever_embeddings::{EmbeddingProvider, RateLimiter};
use codetriever_meta_data::{
    FileMetadata, GitChangeDetector, IndexManifest, ManifestStats, ManifestStore,
    StorageDescriptor,
};
use codetriever_parsing::chunker::ChunkerRegistry;
use codetriever_vector_data::VectorStore;
use codetriever_vector_data::chunk::hash_content;

use crate::chunking::chunk_files;
use crate::discovery::discover;
use crate::embedding::embed_chunks;
use crate::error::{IndexerError, IndexerResult};
use crate::filtering::filter_files;
use crate::memory::{MemoryAwareQueue, MemoryMonitor};
use crate::storage::store_chunks;

/// A single file-level error recorded during a run, kept alongside the
/// scalar counters so callers can report exactly what went wrong
/// (SPEC_FULL §3 supplement; spec.md's `errorCount` is `errors.len()`).
#[derive(Debug, Clone)]
pub struct IndexingError {
    pub path: String,
    pub message: String,
}

/// Stats surfaced by a pipeline run (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct IndexingStats {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_stored: usize,
    pub chunks_updated: usize,
    pub chunks_skipped: usize,
    pub error_count: usize,
    pub duration_ms: u64,
    pub errors: Vec<IndexingError>,
}

/// Everything the pipeline needs to run a single scope's build, already
/// resolved from `EngineConfig` by the caller.
pub struct IndexingPipeline {
    config: EngineConfig,
    chunker_registry: Arc<ChunkerRegistry>,
    memory_monitor: Arc<MemoryMonitor>,
    rate_limiter: Arc<RateLimiter>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    manifest_store: ManifestStore,
}

impl IndexingPipeline {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        let chunker_registry = Arc::new(ChunkerRegistry::new(
            config.embedding.max_tokens,
            config.chunking.overlap_lines, // token overlap tracks line overlap's proportion by default
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
            vector_store,
            manifest_store,
        }
    }

    /// Run a full incremental build for `scope_id`, rooted at `root`.
    ///
    /// # Errors
    /// Returns [`IndexerError::TooManyErrors`] if per-file errors exceed
    /// `indexing.max_errors`, or propagates the first unrecoverable error
    /// from any stage.
    pub async fn run(&self, scope_id: &str, root: &Path, exclude: &[String]) -> IndexerResult<IndexingStats> {
        let started = Instant::now();
        let mut stats = IndexingStats::default();

        // -- Discovery --------------------------------------------------
        let discovered = discover(root, exclude)?;
        stats.files_discovered = discovered.len();
        if discovered.is_empty() {
            stats.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(stats);
        }

        let prior_manifest = self.manifest_store.load_manifest(scope_id).await?;
        let known_files: HashMap<String, FileMetadata> =
            prior_manifest.as_ref().map(|m| m.files.clone()).unwrap_or_default();

        let unchanged_paths = self.git_unchanged_paths(root, &prior_manifest).await;

        // -- Filtering ----------------------------------------------------
        let (filtered, skipped) =
            filter_files(root, &discovered, &known_files, &unchanged_paths).await?;
        stats.files_skipped = skipped;
        stats.files_processed = filtered.len();

        if filtered.is_empty() {
            stats.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(stats);
        }

        let index_revision = uuid::Uuid::new_v4().to_string();
        let mut new_files: HashMap<String, FileMetadata> = known_files.clone();
        for file in &filtered {
            new_files.insert(
                file.path.clone(),
                FileMetadata {
                    path: file.path.clone(),
                    mtime: file.mtime,
                    size: file.size,
                    hash: file.hash.clone(),
                    source_id: file.path.clone(),
                },
            );
        }

        // -- Parallel Chunking --------------------------------------------
        let queue = MemoryAwareQueue::new(Arc::clone(&self.memory_monitor), &self.config.memory);
        let (chunks, chunk_errors) = chunk_files(
            Arc::clone(&self.chunker_registry),
            queue,
            filtered,
            scope_id,
            &index_revision,
            self.config.indexing.max_errors,
        )
        .await?;
        stats.error_count += chunk_errors.len();
        stats.errors.extend(chunk_errors.into_iter().map(|(path, message)| IndexingError { path, message }));

        // -- Embedding ------------------------------------------------------
        let (embedded, embed_errors) = embed_chunks(
            Arc::clone(&self.embedding_provider),
            Arc::clone(&self.rate_limiter),
            chunks,
            self.config.indexing.embed_batch_target_tokens,
            self.config.indexing.embed_max_concurrency,
            self.config.indexing.embed_max_retries,
            self.config.indexing.embed_retry_delay_ms,
        )
        .await?;
        stats.error_count += embed_errors.len();
        stats.errors.extend(embed_errors.into_iter().map(|(path, message)| IndexingError { path, message }));

        if stats.error_count > self.config.indexing.max_errors {
            return Err(IndexerError::TooManyErrors(stats.error_count));
        }

        // -- Storage ---------------------------------------------------------
        let deleted_paths: Vec<String> = known_files
            .keys()
            .filter(|p| !discovered.iter().any(|f| &f.path == *p))
            .cloned()
            .collect();
        for path in &deleted_paths {
            new_files.remove(path);
        }

        let outcome = store_chunks(
            self.vector_store.as_ref(),
            scope_id,
            embedded,
            &deleted_paths,
            self.config.indexing.storage_batch_size,
        )
        .await?;
        stats.chunks_stored = outcome.stored;
        stats.chunks_updated = outcome.updated;
        stats.chunks_skipped = outcome.skipped;

        // -- Manifest -----------------------------------------------------
        let (git_revision, branch) = self.current_git_identity(root).await;
        let storage_stats = self.vector_store.stats(scope_id).await?;
        let manifest = IndexManifest {
            manifest_version: codetriever_meta_data::MANIFEST_VERSION.to_string(),
            index_revision: index_revision.clone(),
            built_at: chrono::Utc::now(),
            git_revision,
            branch,
            engine_config_hash: self.config.engine_config_hash(),
            sources_digest: hash_content(discovered.iter().map(|f| f.path.as_str()).collect::<Vec<_>>().join("\n").as_bytes()),
            stats: ManifestStats {
                total_chunks: storage_stats.chunk_count,
                total_files: storage_stats.file_count,
                embedding_model: self.embedding_provider.model_name().to_string(),
                embedding_dimension: self.embedding_provider.embedding_dimension(),
                index_time_ms: started.elapsed().as_millis() as u64,
            },
            storage: StorageDescriptor {
                storage_type: storage_stats.storage_type,
                location: scope_id.to_string(),
                sha256: String::new(),
                size_bytes: 0,
            },
            files: new_files,
        };
        self.manifest_store.save_manifest(scope_id, &manifest).await?;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Current HEAD commit and branch, recorded on the manifest so the next
    /// run's [`Self::git_unchanged_paths`] fast path has a `base_revision` to
    /// diff against. `(None, None)` outside a git repository.
    async fn current_git_identity(&self, root: &Path) -> (Option<String>, Option<String>) {
        let Ok(detector) = GitChangeDetector::discover(root).await else {
            return (None, None);
        };
        match detector.repository_context().await {
            Ok(ctx) => (ctx.commit_sha, Some(ctx.branch)),
            Err(_) => (None, None),
        }
    }

    /// Paths the git fast path can skip filtering for entirely: files
    /// untouched in `status --porcelain` and unchanged in the diff against
    /// the last indexed revision.
    async fn git_unchanged_paths(
        &self,
        root: &Path,
        prior_manifest: &Option<IndexManifest>,
    ) -> std::collections::HashSet<String> {
        let Some(manifest) = prior_manifest else {
            return std::collections::HashSet::new();
        };
        let Some(base_revision) = &manifest.git_revision else {
            return std::collections::HashSet::new();
        };
        let Ok(detector) = GitChangeDetector::discover(root).await else {
            return std::collections::HashSet::new();
        };
        let Ok(changes) = detector.enumerate_changes(base_revision).await else {
            return std::collections::HashSet::new();
        };
        let touched = changes.all_touched_paths();
        let deleted = changes.all_deleted_paths();
        manifest
            .files
            .keys()
            .filter(|p| !touched.contains(p) && !deleted.contains(p))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codetriever_config::EngineConfig;
    use codetriever_vector_data::LocalFlatStore;
    use std::fs;
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

    #[tokio::test]
    async fn full_run_produces_stats_and_stores_chunks() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}\nfn b() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "# Title\nSome text.\n").unwrap();

        let store = Arc::new(LocalFlatStore::new());
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(StubProvider);
        let config = EngineConfig::from_env();

        let pipeline = IndexingPipeline::new(config, provider, store.clone(), dir.path());
        let stats = pipeline.run("scope-1", dir.path(), &[]).await.unwrap();

        assert_eq!(stats.files_discovered, 2);
        assert_eq!(stats.files_processed, 2);
        assert!(stats.chunks_stored > 0);
        assert_eq!(stats.error_count, 0);

        let exists = store.scope_exists("scope-1").await.unwrap();
        assert!(exists);
    }

    #[tokio::test]
    async fn second_run_with_no_changes_skips_everything() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();

        let store = Arc::new(LocalFlatStore::new());
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(StubProvider);
        let config = EngineConfig::from_env();

        let pipeline = IndexingPipeline::new(config, provider, store, dir.path());
        pipeline.run("scope-1", dir.path(), &[]).await.unwrap();
        let second = pipeline.run("scope-1", dir.path(), &[]).await.unwrap();

        assert_eq!(second.files_processed, 0);
        assert_eq!(second.files_skipped, 1);
    }
}
