//! CompletenessChecker (spec §4.10): assesses whether a gathered result set
//! sufficiently answers a query, and proposes follow-up sub-queries when it
//! doesn't.

use codetriever_vector_data::ScoredChunk;

use crate::llm::{CompletionOptions, LlmProvider, parse_json_response};
use crate::types::QueryMode;

/// A chunk counts as "relevant" toward the heuristic's `relevant/5` term
/// above this score. Not specified numerically by spec §4.10; chosen as the
/// midpoint of the `[0, 1]` score range the store contract promises.
const RELEVANCE_THRESHOLD: f32 = 0.5;

/// Outcome of a completeness assessment (spec §4.10).
#[derive(Debug, Clone, Default)]
pub struct CompletenessResult {
    pub complete: bool,
    pub confidence: f64,
    pub missing: Vec<String>,
    pub suggested_queries: Vec<String>,
}

/// Instant-mode heuristic: `score = 0.4*top + 0.3*avg + 0.3*min(relevant/5,
/// 1)`; complete iff `score > score_threshold AND top > top_threshold`.
#[must_use]
pub fn heuristic(results: &[ScoredChunk], score_threshold: f64, top_threshold: f64) -> CompletenessResult {
    if results.is_empty() {
        return CompletenessResult {
            complete: false,
            confidence: 0.0,
            missing: vec!["no candidate chunks were retrieved".to_string()],
            suggested_queries: Vec::new(),
        };
    }

    let top = f64::from(results[0].score);
    let avg = results.iter().map(|r| f64::from(r.score)).sum::<f64>() / results.len() as f64;
    let relevant = results.iter().filter(|r| r.score >= RELEVANCE_THRESHOLD).count();
    let relevant_term = (relevant as f64 / 5.0).min(1.0);
    let score = 0.4 * top + 0.3 * avg + 0.3 * relevant_term;

    CompletenessResult {
        complete: score > score_threshold && top > top_threshold,
        confidence: score,
        missing: Vec::new(),
        suggested_queries: Vec::new(),
    }
}

#[derive(serde::Deserialize)]
struct JudgmentResponse {
    complete: bool,
    confidence: f64,
    #[serde(default)]
    missing: Vec<String>,
    #[serde(default)]
    suggest_sources: Vec<String>,
}

/// Assess completeness for `mode` (spec §4.10). Instant mode always uses
/// the heuristic; non-instant modes ask the LLM for a judgment and fall
/// back to the heuristic on any failure (missing LLM, request error, or an
/// unparsable response).
pub async fn assess(
    mode: QueryMode,
    query: &str,
    results: &[ScoredChunk],
    llm: Option<&dyn LlmProvider>,
    score_threshold: f64,
    top_threshold: f64,
) -> CompletenessResult {
    if mode == QueryMode::Instant {
        return heuristic(results, score_threshold, top_threshold);
    }
    let Some(llm) = llm else {
        return heuristic(results, score_threshold, top_threshold);
    };

    let context = results
        .iter()
        .take(10)
        .map(|r| format!("- {} (lines {}-{})", r.chunk.path, r.chunk.span.start_line, r.chunk.span.end_line))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Question: {query}\n\nRetrieved sources:\n{context}\n\nJudge whether these sources are \
         sufficient to fully and accurately answer the question. Respond with JSON: \
         {{\"complete\": bool, \"confidence\": number between 0 and 1, \"missing\": [string], \
         \"suggest_sources\": [string]}}. `suggest_sources` should be focused follow-up search \
         queries, not prose."
    );
    let options = CompletionOptions {
        system: Some(
            "You judge retrieval completeness for a code-search engine. Reply with JSON only."
                .to_string(),
        ),
        max_tokens: 400,
        temperature: 0.0,
        stop: Vec::new(),
    };

    match llm.complete(&prompt, &options).await {
        Ok(raw) => match parse_json_response::<JudgmentResponse>(&raw) {
            Ok(parsed) => CompletenessResult {
                complete: parsed.complete,
                confidence: parsed.confidence,
                missing: parsed.missing,
                suggested_queries: parsed.suggest_sources,
            },
            Err(error) => {
                tracing::warn!(%error, "completeness judgment unparsable, falling back to heuristic");
                heuristic(results, score_threshold, top_threshold)
            }
        },
        Err(error) => {
            tracing::warn!(%error, "completeness judgment call failed, falling back to heuristic");
            heuristic(results, score_threshold, top_threshold)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use codetriever_vector_data::{Chunk, ChunkKind, ChunkMetadata, Span};
    use crate::llm::{LlmError, LlmResult};

    fn make_result(score: f32) -> ScoredChunk {
        let chunk = Chunk {
            chunk_id: "c1".to_string(),
            scope_id: "s".to_string(),
            source_id: "src/a.rs".to_string(),
            path: "src/a.rs".to_string(),
            span: Span::new(1, 5),
            text: "fn a() {}".to_string(),
            score,
            metadata: ChunkMetadata::new(ChunkKind::Code, None, "h".to_string(), Utc::now(), "rev-1".to_string(), Utc::now()),
            embedding: vec![],
        };
        ScoredChunk { chunk, score }
    }

    #[test]
    fn empty_results_are_never_complete() {
        let result = heuristic(&[], 0.6, 0.7);
        assert!(!result.complete);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn high_scores_are_complete() {
        let results = vec![make_result(0.95), make_result(0.9), make_result(0.85)];
        let result = heuristic(&results, 0.6, 0.7);
        assert!(result.complete);
    }

    #[test]
    fn low_top_score_fails_despite_good_average() {
        let results = vec![make_result(0.65), make_result(0.6), make_result(0.6)];
        let result = heuristic(&results, 0.3, 0.7);
        assert!(!result.complete);
    }

    struct StubLlm(Option<String>);

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> LlmResult<String> {
            self.0.clone().ok_or_else(|| LlmError::Request("stub failure".to_string()))
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn instant_mode_never_calls_the_llm() {
        let llm = StubLlm(None);
        let results = vec![make_result(0.95)];
        let result = assess(QueryMode::Instant, "q", &results, Some(&llm), 0.6, 0.7).await;
        assert!(result.confidence > 0.0);
    }

    #[tokio::test]
    async fn llm_judgment_is_used_when_available() {
        let llm = StubLlm(Some(r#"{"complete": false, "confidence": 0.4, "missing": ["overlay docs"], "suggest_sources": ["overlay manager"]}"#.to_string()));
        let results = vec![make_result(0.5)];
        let result = assess(QueryMode::Auto, "q", &results, Some(&llm), 0.6, 0.7).await;
        assert!(!result.complete);
        assert_eq!(result.suggested_queries, vec!["overlay manager".to_string()]);
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_heuristic() {
        let llm = StubLlm(None);
        let results = vec![make_result(0.95)];
        let result = assess(QueryMode::Auto, "q", &results, Some(&llm), 0.6, 0.7).await;
        assert!(result.complete);
    }
}
