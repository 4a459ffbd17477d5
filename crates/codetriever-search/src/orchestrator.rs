//! Orchestrator (C16, spec §4.14): mode routing, per-mode pipelines, the
//! context-consistency gate, and query caching. This is the crate's single
//! public entry point — callers (the CLI, the API) depend on
//! [`Orchestrator::query`] and never reach into the individual components
//! directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use codetriever_config::EngineConfig;
use codetriever_embeddings::EmbeddingProvider;
use codetriever_meta_data::StalenessLevel;
use codetriever_vector_data::{ChunkKind, ScoredChunk, VectorStore};

use crate::cache::{self, QueryCache};
use crate::classifier;
use crate::completeness;
use crate::decomposer;
use crate::error::{SearchError, SearchResult};
use crate::gatherer;
use crate::llm::LlmProvider;
use crate::synthesizer::{self, Source};
use crate::types::{QueryContext, QueryMode, RetrievalTelemetry};

/// Breakdown of a response's sources by kind (spec §6 `sourcesSummary`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcesSummary {
    pub code: usize,
    pub docs: usize,
    pub external: usize,
}

impl SourcesSummary {
    fn from_sources(sources: &[Source]) -> Self {
        let mut summary = Self::default();
        for source in sources {
            match source.kind {
                ChunkKind::Code | ChunkKind::Config | ChunkKind::Test => summary.code += 1,
                ChunkKind::Docs | ChunkKind::Adr | ChunkKind::Other => summary.docs += 1,
            }
        }
        summary
    }
}

/// The orchestrator's response (spec §6 `AgentResponse`, minus the
/// wire-protocol-specific `meta.requestId`/`meta.schemaVersion` fields the
/// API crate attaches at the transport boundary).
#[derive(Debug, Clone)]
pub struct OrchestratorResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f64,
    pub complete: bool,
    pub sources_summary: SourcesSummary,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub mode: QueryMode,
    pub timing_ms: u64,
    pub cached: bool,
    pub index_revision: String,
    pub iterations: usize,
}

/// Owns every collaborator the query pipeline needs and wires them together
/// per spec §4.14's per-mode pipelines.
pub struct Orchestrator {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Option<Arc<dyn LlmProvider>>,
    cache: QueryCache<OrchestratorResponse>,
    config: EngineConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Option<Arc<dyn LlmProvider>>,
        config: EngineConfig,
    ) -> Self {
        let cache = QueryCache::new(config.cache.max_size);
        Self {
            store,
            embedder,
            llm,
            cache,
            config,
        }
    }

    /// Answer `query` against `scope_id` under `mode` (spec §4.14).
    ///
    /// # Errors
    /// Returns [`SearchError::InvalidQuery`] for an empty query,
    /// [`SearchError::ContextMismatch`] when a cached or freshly gathered
    /// result disagrees with `ctx`, or propagates collaborator errors.
    pub async fn query(
        &self,
        scope_id: &str,
        query: &str,
        mode: QueryMode,
        ctx: &QueryContext,
    ) -> SearchResult<OrchestratorResponse> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery("query must not be empty".to_string()));
        }

        // Independent of the keyed cache lookup below: `cache_key` already
        // folds `index_revision` in, so a keyed hit can never itself disagree
        // with its own key. The side index catches the case the keyed lookup
        // can't — this scope has moved on to a revision this request hasn't
        // heard about yet (spec §8 Scenario 1) — on both a hit and a miss.
        if let Some(previous_revision) = self.cache.observe_revision(scope_id, &ctx.index_revision) {
            self.cache.invalidate_scope(scope_id);
            return Err(SearchError::ContextMismatch {
                scope_id: scope_id.to_string(),
                reason: format!(
                    "scope's index_revision changed from '{previous_revision}' to '{}' since the last query",
                    ctx.index_revision
                ),
            });
        }

        let key = cache::cache_key(
            scope_id,
            mode.as_str(),
            query,
            &ctx.index_revision,
            &ctx.engine_config_hash,
            ctx.sources_digest.as_deref(),
        );

        if let Some(cached) = self.cache.get(&key) {
            return Ok(Self::mark_cached(cached));
        }

        let started = Instant::now();
        let mut response = match mode {
            QueryMode::Instant => self.run_instant(scope_id, query, ctx).await?,
            QueryMode::Auto => self.run_auto(scope_id, query, ctx).await?,
            QueryMode::Thinking => self.run_thinking(scope_id, query, ctx).await?,
        };
        response.timing_ms = started.elapsed().as_millis() as u64;
        response.index_revision = ctx.index_revision.clone();
        response.cached = false;

        let ttl = self.ttl_for_mode(response.mode);
        self.cache.put(
            key,
            response.clone(),
            scope_id,
            ttl,
            response.confidence,
            self.config.cache.min_confidence,
        );

        Ok(response)
    }

    /// Flag a keyed cache hit as served-from-cache. The context-consistency
    /// gate itself runs earlier in [`Self::query`], against the side index —
    /// by the time a key matches, `cache_key`'s embedded `index_revision`
    /// already guarantees agreement with the request, so there is nothing
    /// left to re-check here.
    fn mark_cached(mut cached: OrchestratorResponse) -> OrchestratorResponse {
        cached.cached = true;
        cached
    }

    fn ttl_for_mode(&self, mode: QueryMode) -> Duration {
        let secs = match mode {
            QueryMode::Instant => self.config.cache.ttl_instant_secs,
            QueryMode::Auto => self.config.cache.ttl_auto_secs,
            QueryMode::Thinking => self.config.cache.ttl_thinking_secs,
        };
        Duration::from_secs(secs)
    }

    /// Template telemetry handed to the gatherer before anything has been
    /// retrieved. `engine_config_hash` is the orchestrator's own live
    /// `EngineConfig` hash, not the request's claimed one, so the
    /// consistency check below has something independent to compare against.
    /// `index_revision` starts as the request's value but the gatherer
    /// overwrites it with what the retrieved chunks actually carry (spec
    /// §4.14) whenever anything was retrieved. `sources_digest` has no
    /// independent source at the query layer — re-deriving it would mean
    /// rescanning the workspace's source topology, which is the indexing
    /// pipeline's job, not the orchestrator's — so it is carried from the
    /// request as-is.
    fn base_telemetry(&self, ctx: &QueryContext) -> RetrievalTelemetry {
        RetrievalTelemetry {
            index_revision: ctx.index_revision.clone(),
            engine_config_hash: self.config.engine_config_hash(),
            sources_digest: ctx.sources_digest.clone().unwrap_or_default(),
            staleness: StalenessLevel::Fresh,
            freshness_applied: false,
            boosted_count: 0,
            conflict_count: 0,
            confidence_floor: 1.0,
            fail_closed: false,
        }
    }

    /// Context-consistency gate applied to a freshly gathered result (spec
    /// §4.14): the telemetry the gatherer actually observed — the retrieved
    /// chunks' own index revision, and the orchestrator's own live engine
    /// config hash — must agree with what the request claims. On mismatch,
    /// the scope's whole cache partition is invalidated.
    fn enforce_retrieval_context(
        &self,
        scope_id: &str,
        ctx: &QueryContext,
        telemetry: &RetrievalTelemetry,
    ) -> SearchResult<()> {
        if telemetry.index_revision != ctx.index_revision {
            self.cache.invalidate_scope(scope_id);
            return Err(SearchError::ContextMismatch {
                scope_id: scope_id.to_string(),
                reason: format!(
                    "retrieved index_revision '{}' does not match request's '{}'",
                    telemetry.index_revision, ctx.index_revision
                ),
            });
        }
        if telemetry.engine_config_hash != ctx.engine_config_hash {
            self.cache.invalidate_scope(scope_id);
            return Err(SearchError::ContextMismatch {
                scope_id: scope_id.to_string(),
                reason: format!(
                    "engine_config_hash '{}' does not match request's '{}'",
                    telemetry.engine_config_hash, ctx.engine_config_hash
                ),
            });
        }
        Ok(())
    }

    fn llm_provider(&self) -> Option<&dyn LlmProvider> {
        self.llm.as_deref()
    }

    /// instant: classify → single search → synthesize (direct-answer
    /// fallback baked into the synthesizer) → verify → compress. Upgrades
    /// to auto transparently if confidence stays below the configured
    /// threshold and an LLM is available.
    async fn run_instant(&self, scope_id: &str, query: &str, ctx: &QueryContext) -> SearchResult<OrchestratorResponse> {
        let weights = classifier::classify(query);
        let telemetry_template = self.base_telemetry(ctx);
        let (chunks, telemetry) = gatherer::gather(
            self.store.as_ref(),
            self.embedder.as_ref(),
            scope_id,
            query,
            std::slice::from_ref(&query.to_string()),
            weights,
            QueryMode::Instant,
            &self.config.retrieval.rerank,
            self.config.retrieval.auto_evidence_top_k,
            &telemetry_template,
        )
        .await?;
        self.enforce_retrieval_context(scope_id, ctx, &telemetry)?;

        let completeness = completeness::heuristic(
            &chunks,
            self.config.orchestrator.completeness_score_threshold,
            self.config.orchestrator.completeness_top_threshold,
        );

        let response = self.finish(query, chunks, completeness, QueryMode::Instant, 1).await?;

        if response.confidence < self.config.orchestrator.instant_upgrade_confidence && self.llm.is_some() {
            tracing::debug!(confidence = response.confidence, "instant confidence too low, upgrading to auto");
            return self.run_auto(scope_id, query, ctx).await;
        }
        Ok(response)
    }

    /// auto: decompose (≤3) → gather → single completeness check →
    /// synthesize → verify → compress.
    async fn run_auto(&self, scope_id: &str, query: &str, ctx: &QueryContext) -> SearchResult<OrchestratorResponse> {
        let weights = classifier::classify(query);
        let sub_queries = decomposer::decompose(
            query,
            QueryMode::Auto,
            self.llm_provider(),
            self.config.retrieval.auto_max_subqueries,
            self.config.retrieval.thinking_max_subqueries,
        )
        .await;

        let telemetry_template = self.base_telemetry(ctx);
        let (chunks, telemetry) = gatherer::gather(
            self.store.as_ref(),
            self.embedder.as_ref(),
            scope_id,
            query,
            &sub_queries,
            weights,
            QueryMode::Auto,
            &self.config.retrieval.rerank,
            self.config.retrieval.auto_evidence_top_k,
            &telemetry_template,
        )
        .await?;
        self.enforce_retrieval_context(scope_id, ctx, &telemetry)?;

        let completeness = completeness::assess(
            QueryMode::Auto,
            query,
            &chunks,
            self.llm_provider(),
            self.config.orchestrator.completeness_score_threshold,
            self.config.orchestrator.completeness_top_threshold,
        )
        .await;

        self.finish(query, chunks, completeness, QueryMode::Auto, 1).await
    }

    /// thinking: decompose (≤5) → gather → iterate completeness up to
    /// `thinking_max_iterations`, accumulating suggested sub-queries;
    /// early-exit on complete OR confidence > 0.8 OR no suggestions.
    async fn run_thinking(&self, scope_id: &str, query: &str, ctx: &QueryContext) -> SearchResult<OrchestratorResponse> {
        let weights = classifier::classify(query);
        let mut sub_queries = decomposer::decompose(
            query,
            QueryMode::Thinking,
            self.llm_provider(),
            self.config.retrieval.auto_max_subqueries,
            self.config.retrieval.thinking_max_subqueries,
        )
        .await;

        let telemetry_template = self.base_telemetry(ctx);
        let mut chunks;
        let mut completeness_result;
        let mut iterations = 0_usize;
        let max_iterations = self.config.orchestrator.thinking_max_iterations;

        loop {
            let (gathered, telemetry) = gatherer::gather(
                self.store.as_ref(),
                self.embedder.as_ref(),
                scope_id,
                query,
                &sub_queries,
                weights,
                QueryMode::Thinking,
                &self.config.retrieval.rerank,
                self.config.retrieval.thinking_evidence_top_k,
                &telemetry_template,
            )
            .await?;
            self.enforce_retrieval_context(scope_id, ctx, &telemetry)?;
            chunks = gathered;

            completeness_result = completeness::assess(
                QueryMode::Thinking,
                query,
                &chunks,
                self.llm_provider(),
                self.config.orchestrator.completeness_score_threshold,
                self.config.orchestrator.completeness_top_threshold,
            )
            .await;
            iterations += 1;

            let should_stop = completeness_result.complete
                || completeness_result.confidence > 0.8
                || completeness_result.suggested_queries.is_empty()
                || iterations >= max_iterations;
            if should_stop {
                break;
            }

            for suggested in &completeness_result.suggested_queries {
                if !sub_queries.contains(suggested) {
                    sub_queries.push(suggested.clone());
                }
            }
        }

        self.finish(query, chunks, completeness_result, QueryMode::Thinking, iterations).await
    }

    /// Shared synthesize → verify → compress tail for every mode.
    async fn finish(
        &self,
        query: &str,
        chunks: Vec<ScoredChunk>,
        completeness: completeness::CompletenessResult,
        mode: QueryMode,
        iterations: usize,
    ) -> SearchResult<OrchestratorResponse> {
        let synthesized = synthesizer::synthesize(query, &chunks, self.llm_provider()).await?;
        let compressed = crate::compressor::compress(
            synthesized,
            self.config.compressor.max_response_tokens,
            self.config.compressor.max_snippet_lines,
            self.config.compressor.max_sources,
            self.llm_provider(),
        )
        .await;

        let sources_summary = SourcesSummary::from_sources(&compressed.answer.sources);
        let mut warnings = compressed.answer.warnings;
        for missing in &completeness.missing {
            warnings.push(format!("possibly missing: {missing}"));
        }

        Ok(OrchestratorResponse {
            answer: compressed.answer.answer,
            sources: compressed.answer.sources,
            confidence: compressed.answer.confidence,
            complete: completeness.complete,
            sources_summary,
            warnings,
            suggestions: completeness.suggested_queries,
            mode,
            timing_ms: 0,
            cached: false,
            index_revision: String::new(),
            iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use codetriever_config::EngineConfig;
    use codetriever_vector_data::{Chunk, ChunkKind, ChunkMetadata, LocalFlatStore, Span};

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> codetriever_embeddings::EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0_f32, 0.0]).collect())
        }
        fn embedding_dimension(&self) -> usize {
            2
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

    fn make_chunk(id: &str, path: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            scope_id: "core".to_string(),
            source_id: path.to_string(),
            path: path.to_string(),
            span: Span::new(1, 3),
            text: text.to_string(),
            score: 0.0,
            metadata: ChunkMetadata::new(ChunkKind::Code, Some("rust".to_string()), "h".to_string(), Utc::now(), "rev-1".to_string(), Utc::now()),
            embedding: vec![1.0, 0.0],
        }
    }

    async fn make_orchestrator() -> Orchestrator {
        let store = Arc::new(LocalFlatStore::new());
        store
            .replace_scope("core", vec![make_chunk("a", "src/a.rs", "struct VectorStore { pub fn search(&self) {} }")])
            .await
            .unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbedder);
        Orchestrator::new(store, embedder, None, EngineConfig::from_env())
    }

    /// Matches the live hash of `EngineConfig::from_env()` so the
    /// context-consistency gate's `engine_config_hash` comparison (spec
    /// §4.14) agrees with what [`make_orchestrator`] actually runs with.
    fn ctx() -> QueryContext {
        QueryContext {
            scope_id: "core".to_string(),
            index_revision: "rev-1".to_string(),
            engine_config_hash: EngineConfig::from_env().engine_config_hash(),
            sources_digest: Some("src-1".to_string()),
        }
    }

    #[tokio::test]
    async fn empty_query_is_invalid() {
        let orchestrator = make_orchestrator().await;
        let result = orchestrator.query("core", "   ", QueryMode::Instant, &ctx()).await;
        assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let orchestrator = make_orchestrator().await;
        let first = orchestrator.query("core", "what is VectorStore", QueryMode::Instant, &ctx()).await.unwrap();
        assert!(!first.cached);
        let second = orchestrator.query("core", "what is VectorStore", QueryMode::Instant, &ctx()).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.answer, second.answer);
    }

    /// Spec §8 Scenario 1: a request with a revision the scope has moved past
    /// raises `ContextMismatch` and the scope's cache partition is emptied —
    /// exercised through the real `query()` path rather than by poking the
    /// cache directly, so it actually proves the gate fires in production use.
    #[tokio::test]
    async fn index_revision_change_invalidates_cache_and_errors() {
        let orchestrator = make_orchestrator().await;
        orchestrator.query("core", "what is VectorStore", QueryMode::Instant, &ctx()).await.unwrap();
        assert_eq!(orchestrator.cache.scope_size("core"), 1);

        let mut stale_ctx = ctx();
        stale_ctx.index_revision = "rev-2".to_string();
        let result = orchestrator.query("core", "what is VectorStore", QueryMode::Instant, &stale_ctx).await;
        assert!(matches!(result, Err(SearchError::ContextMismatch { .. })));
        assert_eq!(orchestrator.cache.scope_size("core"), 0);
    }

    /// The retrieved chunks' own `index_revision` is what the gate checks,
    /// not the request's claim by itself: a request whose revision agrees
    /// with what's actually stored still succeeds even for the very first
    /// query against a scope (no prior side-index entry to compare against).
    #[tokio::test]
    async fn matching_revision_on_first_query_succeeds() {
        let orchestrator = make_orchestrator().await;
        let result = orchestrator.query("core", "what is VectorStore", QueryMode::Instant, &ctx()).await;
        assert!(result.is_ok());
    }

    /// A request whose claimed `index_revision` never matches the scope's
    /// actual stored chunks is rejected on the very first query, before any
    /// side-index history exists to compare against.
    #[tokio::test]
    async fn revision_mismatch_on_first_query_is_rejected() {
        let orchestrator = make_orchestrator().await;
        let mut wrong_ctx = ctx();
        wrong_ctx.index_revision = "rev-9".to_string();
        let result = orchestrator.query("core", "what is VectorStore", QueryMode::Instant, &wrong_ctx).await;
        assert!(matches!(result, Err(SearchError::ContextMismatch { .. })));
    }
}
