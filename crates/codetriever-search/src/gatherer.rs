//! Gatherer and reranker (spec §4.9): executes sub-queries in parallel,
//! blends vector + keyword candidates per [`crate::classifier`]'s weights,
//! deduplicates by `chunk_id`, applies the intent-aware rerank, and
//! enforces the evidence guarantee.

use std::cmp::Ordering;
use std::collections::HashMap;

use codetriever_config::RerankWeights;
use codetriever_embeddings::EmbeddingProvider;
use codetriever_vector_data::{Chunk, ChunkKind, ScoredChunk, SearchFilters, VectorStore};

use crate::classifier::{QueryWeights, extract_identifiers, is_technical};
use crate::error::{SearchError, SearchResult};
use crate::types::{QueryMode, RetrievalTelemetry};

/// Reciprocal Rank Fusion constant, the conventional default that keeps a
/// single high rank from dominating the blend.
const RRF_K: f64 = 60.0;

const ARCHITECTURE_MARKERS: &[&str] = &["architecture", "design", "adr", "decision"];
const COMMAND_MARKERS: &[&str] = &["cli", "command", "--", "flag", "usage:", "npm ", "cargo "];
const PLANNING_PATH_MARKERS: &[&str] = &["plan", "improvement", "todo", "task"];
const CLI_PATH_MARKERS: &[&str] = &["cli", "command", "package.json", "bin/"];
const ADR_PATH_MARKERS: &[&str] = &["/adr", "adr-", "docs/decisions"];

/// Run every sub-query's hybrid search in parallel, merge by highest score
/// per `chunk_id`, rerank, and enforce the evidence guarantee (spec §4.9).
///
/// # Errors
/// Returns [`SearchError::Engine`] if every sub-query's gather failed.
pub async fn gather(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    scope_id: &str,
    original_query: &str,
    sub_queries: &[String],
    weights: QueryWeights,
    mode: QueryMode,
    rerank_weights: &RerankWeights,
    evidence_top_k: usize,
    telemetry_template: &RetrievalTelemetry,
) -> SearchResult<(Vec<ScoredChunk>, RetrievalTelemetry)> {
    let futures = sub_queries
        .iter()
        .map(|sub_query| hybrid_search(store, embedder, scope_id, sub_query, weights, telemetry_template));
    let outcomes = futures::future::join_all(futures).await;

    let mut best: HashMap<String, ScoredChunk> = HashMap::new();
    let mut telemetry: Option<RetrievalTelemetry> = None;
    let mut succeeded = 0_usize;

    for outcome in outcomes {
        let outcome = match outcome {
            Ok(outcome) => {
                succeeded += 1;
                outcome
            }
            Err(error) => {
                tracing::warn!(%error, "sub-query gather failed, degrading telemetry to fail-closed");
                let mut failed = telemetry_template.clone();
                failed.fail_closed = true;
                GatherOutcome { chunks: Vec::new(), telemetry: failed }
            }
        };

        for scored in outcome.chunks {
            best.entry(scored.chunk.chunk_id.clone())
                .and_modify(|existing| {
                    if scored.score > existing.score {
                        *existing = scored.clone();
                    }
                })
                .or_insert(scored);
        }

        telemetry = Some(match telemetry {
            Some(mut merged) => {
                merged.absorb(&outcome.telemetry);
                merged
            }
            None => outcome.telemetry,
        });
    }

    if succeeded == 0 {
        return Err(SearchError::Engine(format!(
            "all {} sub-queries failed to gather",
            sub_queries.len()
        )));
    }

    let mut merged: Vec<ScoredChunk> = best.into_values().collect();
    sort_scored(&mut merged);

    let boosted = rerank(&mut merged, original_query, mode, rerank_weights);
    ensure_evidence(&mut merged, evidence_top_k);

    let mut telemetry = telemetry.unwrap_or_else(|| telemetry_template.clone());
    telemetry.boosted_count += boosted;
    if let Some(observed_revision) = derive_index_revision(&merged) {
        telemetry.index_revision = observed_revision;
    }
    Ok((merged, telemetry))
}

/// The index revision the merged result set actually came from (spec
/// §4.14): the most common `metadata.index_revision` among the retrieved
/// chunks, not whatever the caller's request claimed. `None` when nothing
/// was retrieved (e.g. an empty scope), since there's no retrieved data to
/// contradict the request in that case — the caller's claimed revision is
/// left standing.
fn derive_index_revision(chunks: &[ScoredChunk]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for scored in chunks {
        *counts.entry(scored.chunk.metadata.index_revision.as_str()).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(revision, _)| revision.to_string())
}

struct GatherOutcome {
    chunks: Vec<ScoredChunk>,
    telemetry: RetrievalTelemetry,
}

fn sort_scored(chunks: &mut [ScoredChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
}

/// Hybrid vector + keyword search for a single sub-query, blended via
/// Reciprocal Rank Fusion at the classifier's `(vector_weight,
/// keyword_weight)` (spec §4.9).
async fn hybrid_search(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingProvider,
    scope_id: &str,
    query: &str,
    weights: QueryWeights,
    telemetry_template: &RetrievalTelemetry,
) -> SearchResult<GatherOutcome> {
    let filters = SearchFilters::default();
    let fetch_limit = weights.suggested_limit.max(1);

    let embeddings = embedder.embed_batch(&[query]).await?;
    let embedding = embeddings
        .into_iter()
        .next()
        .ok_or_else(|| SearchError::Engine("embedding backend returned no vectors".to_string()))?;

    let vector_results = store.search(scope_id, &embedding, fetch_limit, &filters).await?;
    let all_chunks = store.get_all_chunks(scope_id, &filters).await?;
    let keyword_results = keyword_rank(query, &all_chunks, fetch_limit);

    let mut rrf: HashMap<String, (f64, Chunk)> = HashMap::new();
    for (rank, scored) in vector_results.iter().enumerate() {
        let contribution = weights.vector_weight / (RRF_K + rank as f64 + 1.0);
        rrf.entry(scored.chunk.chunk_id.clone())
            .and_modify(|(score, _)| *score += contribution)
            .or_insert_with(|| (contribution, scored.chunk.clone()));
    }
    for (rank, chunk) in keyword_results.iter().enumerate() {
        let contribution = weights.keyword_weight / (RRF_K + rank as f64 + 1.0);
        rrf.entry(chunk.chunk_id.clone())
            .and_modify(|(score, _)| *score += contribution)
            .or_insert_with(|| (contribution, chunk.clone()));
    }

    let mut combined: Vec<ScoredChunk> = rrf
        .into_values()
        .map(|(score, mut chunk)| {
            chunk.score = score as f32;
            ScoredChunk {
                chunk,
                score: score as f32,
            }
        })
        .collect();
    sort_scored(&mut combined);
    combined.truncate(fetch_limit);

    let conflict_count = match (vector_results.first(), keyword_results.first()) {
        (Some(vector_top), Some(keyword_top)) if vector_top.chunk.chunk_id != keyword_top.chunk_id => 1,
        _ => 0,
    };
    let confidence_floor = combined.last().map_or(1.0, |c| f64::from(c.score));

    let mut telemetry = telemetry_template.clone();
    telemetry.conflict_count = conflict_count;
    telemetry.confidence_floor = confidence_floor;

    Ok(GatherOutcome {
        chunks: combined,
        telemetry,
    })
}

/// Rank `chunks` by term-overlap with `query`'s whitespace-split tokens
/// against chunk text and path. Ties broken by `chunk_id` for determinism.
fn keyword_rank(query: &str, chunks: &[Chunk], limit: usize) -> Vec<Chunk> {
    let terms: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|term| term.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|term| !term.is_empty())
        .collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &Chunk)> = chunks
        .iter()
        .map(|chunk| {
            let text = chunk.text.to_lowercase();
            let path = chunk.path.to_lowercase();
            let hits = terms.iter().filter(|term| text.contains(term.as_str()) || path.contains(term.as_str())).count();
            (hits, chunk)
        })
        .filter(|(hits, _)| *hits > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.chunk_id.cmp(&b.1.chunk_id)));
    scored.into_iter().take(limit).map(|(_, chunk)| chunk.clone()).collect()
}

/// Intent-aware rerank (spec §4.9): applies only to technical queries.
/// Returns the number of chunks whose score was adjusted.
fn rerank(chunks: &mut [ScoredChunk], query: &str, mode: QueryMode, weights: &RerankWeights) -> usize {
    if !is_technical(query) {
        return 0;
    }

    let identifiers = extract_identifiers(query);
    let lower_query = query.to_lowercase();
    let is_architecture_query = ARCHITECTURE_MARKERS.iter().any(|m| lower_query.contains(m));
    let is_command_query = COMMAND_MARKERS.iter().any(|m| lower_query.contains(m));

    let mut boosted = 0_usize;
    for scored in chunks.iter_mut() {
        let mut factor = 1.0_f64;
        let text = scored.chunk.text.to_lowercase();
        let path = scored.chunk.path.to_lowercase();

        let identifier_matches = identifiers
            .iter()
            .filter(|id| {
                let id = id.to_lowercase();
                text.contains(&id) || path.contains(&id)
            })
            .count();
        if identifier_matches > 0 {
            factor *= 1.0 + (weights.identifier_hit_step * identifier_matches as f64).min(weights.identifier_hit_cap);
        }

        let is_code_like = matches!(scored.chunk.metadata.kind, ChunkKind::Code | ChunkKind::Config);
        if is_code_like {
            factor *= code_boost(mode, weights);
        } else if scored.chunk.metadata.kind == ChunkKind::Docs && identifier_matches == 0 {
            factor *= doc_penalty(mode, weights);
        }

        if is_architecture_query && ADR_PATH_MARKERS.iter().any(|m| path.contains(m)) {
            factor *= weights.adr_boost;
        } else if scored.chunk.metadata.kind == ChunkKind::Docs && PLANNING_PATH_MARKERS.iter().any(|m| path.contains(m)) {
            factor *= weights.planning_doc_penalty;
        }

        if is_command_query {
            if CLI_PATH_MARKERS.iter().any(|m| path.contains(m)) {
                factor *= weights.command_boost;
            } else if scored.chunk.metadata.kind == ChunkKind::Docs {
                factor *= weights.bare_docs_penalty;
            }
        }

        if (factor - 1.0).abs() > f64::EPSILON {
            boosted += 1;
        }
        scored.score *= factor as f32;
        scored.chunk.score = scored.score;
    }

    sort_scored(chunks);
    boosted
}

fn code_boost(mode: QueryMode, weights: &RerankWeights) -> f64 {
    match mode {
        QueryMode::Thinking => weights.code_boost_thinking,
        QueryMode::Instant | QueryMode::Auto => weights.code_boost_auto,
    }
}

fn doc_penalty(mode: QueryMode, weights: &RerankWeights) -> f64 {
    match mode {
        QueryMode::Thinking => weights.doc_penalty_thinking,
        QueryMode::Instant | QueryMode::Auto => weights.doc_penalty_auto,
    }
}

/// Evidence guarantee (spec §4.9): if no code chunk appears in the top `k`,
/// promote the first code chunk found anywhere in the list to position
/// `min(k-1, len-1)`.
fn ensure_evidence(chunks: &mut Vec<ScoredChunk>, top_k: usize) {
    if chunks.is_empty() {
        return;
    }
    let top_k = top_k.min(chunks.len());
    let has_code = chunks[..top_k].iter().any(|c| c.chunk.metadata.kind == ChunkKind::Code);
    if has_code {
        return;
    }
    if let Some(pos) = chunks.iter().position(|c| c.chunk.metadata.kind == ChunkKind::Code) {
        let promote_to = top_k.saturating_sub(1).min(chunks.len() - 1);
        let chunk = chunks.remove(pos);
        chunks.insert(promote_to, chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codetriever_vector_data::{ChunkMetadata, Span};

    fn make_chunk(id: &str, path: &str, kind: ChunkKind, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            scope_id: "s".to_string(),
            source_id: path.to_string(),
            path: path.to_string(),
            span: Span::new(1, 5),
            text: text.to_string(),
            score: 0.5,
            metadata: ChunkMetadata::new(kind, None, "hash".to_string(), Utc::now(), "rev-1".to_string(), Utc::now()),
            embedding: vec![],
        }
    }

    fn scored(chunk: Chunk, score: f32) -> ScoredChunk {
        ScoredChunk { chunk, score }
    }

    #[test]
    fn evidence_guarantee_promotes_first_code_chunk() {
        let mut chunks = vec![
            scored(make_chunk("d1", "docs/a.md", ChunkKind::Docs, "docs"), 0.9),
            scored(make_chunk("d2", "docs/b.md", ChunkKind::Docs, "docs"), 0.8),
            scored(make_chunk("c1", "src/a.rs", ChunkKind::Code, "fn a() {}"), 0.1),
        ];
        ensure_evidence(&mut chunks, 3);
        assert!(chunks[..3].iter().any(|c| c.chunk.metadata.kind == ChunkKind::Code));
    }

    #[test]
    fn evidence_guarantee_noop_when_code_already_present() {
        let mut chunks = vec![
            scored(make_chunk("c1", "src/a.rs", ChunkKind::Code, "fn a() {}"), 0.9),
            scored(make_chunk("d1", "docs/a.md", ChunkKind::Docs, "docs"), 0.8),
        ];
        let before: Vec<String> = chunks.iter().map(|c| c.chunk.chunk_id.clone()).collect();
        ensure_evidence(&mut chunks, 2);
        let after: Vec<String> = chunks.iter().map(|c| c.chunk.chunk_id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn rerank_boosts_identifier_hits_for_technical_queries() {
        let mut chunks = vec![
            scored(make_chunk("c1", "src/vector_store.rs", ChunkKind::Code, "struct VectorStore;"), 0.5),
            scored(make_chunk("d1", "docs/readme.md", ChunkKind::Docs, "overview text"), 0.5),
        ];
        let weights = RerankWeights::default();
        rerank(&mut chunks, "what is `VectorStore`", QueryMode::Auto, &weights);
        assert_eq!(chunks[0].chunk.chunk_id, "c1");
        assert!(chunks[0].score > chunks[1].score);
    }

    #[test]
    fn rerank_is_noop_for_non_technical_queries() {
        let mut chunks = vec![
            scored(make_chunk("c1", "src/a.rs", ChunkKind::Code, "fn a() {}"), 0.5),
            scored(make_chunk("d1", "docs/a.md", ChunkKind::Docs, "docs"), 0.5),
        ];
        let weights = RerankWeights::default();
        let boosted = rerank(&mut chunks, "tell me about the project", QueryMode::Auto, &weights);
        assert_eq!(boosted, 0);
    }

    #[test]
    fn keyword_rank_orders_by_term_overlap() {
        let chunks = vec![
            make_chunk("a", "src/a.rs", ChunkKind::Code, "vector store search"),
            make_chunk("b", "src/b.rs", ChunkKind::Code, "unrelated content"),
        ];
        let ranked = keyword_rank("vector store", &chunks, 10);
        assert_eq!(ranked.first().unwrap().chunk_id, "a");
    }

    #[test]
    fn derive_index_revision_picks_the_majority_revision_among_retrieved_chunks() {
        let mut rev2 = make_chunk("c", "src/c.rs", ChunkKind::Code, "fn c() {}");
        rev2.metadata.index_revision = "rev-2".to_string();
        let chunks = vec![
            scored(make_chunk("a", "src/a.rs", ChunkKind::Code, "fn a() {}"), 0.9), // rev-1
            scored(make_chunk("b", "src/b.rs", ChunkKind::Code, "fn b() {}"), 0.8), // rev-1
            scored(rev2, 0.5),
        ];
        assert_eq!(derive_index_revision(&chunks), Some("rev-1".to_string()));
    }

    #[test]
    fn derive_index_revision_is_none_for_an_empty_result_set() {
        assert_eq!(derive_index_revision(&[]), None);
    }
}
