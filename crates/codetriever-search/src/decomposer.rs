//! Decomposer (spec §4.8): splits a query into an ordered list of
//! sub-queries, the original always first, bounded by the mode's max.
//!
//! Grounded on spec §4.8's literal heuristic-complexity tiers; the LLM
//! call and its JSON-mode parsing follow [`crate::llm`]'s
//! `parse_json_response` tolerant extractor (spec §6).

use crate::llm::{CompletionOptions, LlmProvider, parse_json_response};
use crate::types::QueryMode;

/// Heuristic complexity tiers (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

const ARCHITECTURE_MARKERS: &[&str] = &[
    "architecture", "relationship", "relationships", "design", "interact", "interaction",
    "depend", "integrat",
];

/// Classify a query's heuristic complexity (spec §4.8): simple location
/// lookups / `what is <Identifier>` / ≤ 5 words; complex relationship or
/// architecture queries / ≥ 15 words; medium otherwise.
#[must_use]
pub fn classify_complexity(query: &str) -> Complexity {
    let lower = query.to_lowercase();
    let word_count = query.split_whitespace().count();

    if word_count >= 15 || ARCHITECTURE_MARKERS.iter().any(|m| lower.contains(m)) {
        return Complexity::Complex;
    }

    if word_count <= 5 || lower.starts_with("what is ") || lower.starts_with("where is ") {
        return Complexity::Simple;
    }

    Complexity::Medium
}

#[derive(serde::Deserialize)]
struct SubQueryResponse {
    sub_queries: Vec<String>,
}

/// Produce the ordered sub-query list for `query` under `mode` (spec
/// §4.8). The original query is always first. On LLM failure or a
/// `Simple` classification, degrades to `[original]` without calling the
/// collaborator.
pub async fn decompose(
    query: &str,
    mode: QueryMode,
    llm: Option<&dyn LlmProvider>,
    auto_max: usize,
    thinking_max: usize,
) -> Vec<String> {
    let max = mode.max_subqueries(auto_max, thinking_max);
    if max <= 1 || classify_complexity(query) == Complexity::Simple {
        return vec![query.to_string()];
    }

    let Some(llm) = llm else {
        return vec![query.to_string()];
    };

    let prompt = format!(
        "Split the following code-search query into at most {} focused \
         sub-queries that together cover it. Respond with JSON: \
         {{\"sub_queries\": [\"...\"]}}. Query: {query}",
        max.saturating_sub(1)
    );
    let options = CompletionOptions {
        system: Some(
            "You decompose code-search queries into focused sub-queries. Reply with JSON only."
                .to_string(),
        ),
        max_tokens: 512,
        temperature: 0.0,
        stop: Vec::new(),
    };

    let Ok(raw) = llm.complete(&prompt, &options).await else {
        return vec![query.to_string()];
    };

    let Ok(parsed) = parse_json_response::<SubQueryResponse>(&raw) else {
        return vec![query.to_string()];
    };

    let mut sub_queries = vec![query.to_string()];
    for candidate in parsed.sub_queries {
        let candidate = candidate.trim().to_string();
        if candidate.is_empty() || candidate.eq_ignore_ascii_case(query) {
            continue;
        }
        sub_queries.push(candidate);
        if sub_queries.len() >= max {
            break;
        }
    }
    sub_queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, LlmResult};
    use async_trait::async_trait;

    struct StubLlm {
        response: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> LlmResult<String> {
            self.response
                .clone()
                .ok_or_else(|| LlmError::Request("stub failure".to_string()))
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn short_query_is_simple() {
        assert_eq!(classify_complexity("what is VectorStore"), Complexity::Simple);
    }

    #[test]
    fn long_relationship_query_is_complex() {
        assert_eq!(
            classify_complexity(
                "how does the indexing pipeline architecture interact with the overlay store and the vector store"
            ),
            Complexity::Complex
        );
    }

    #[test]
    fn mid_length_query_is_medium() {
        assert_eq!(classify_complexity("explain chunk deduplication on storage writes"), Complexity::Medium);
    }

    #[tokio::test]
    async fn simple_query_skips_the_llm_call() {
        let llm = StubLlm { response: None };
        let result = decompose("what is VectorStore", QueryMode::Thinking, Some(&llm), 3, 5).await;
        assert_eq!(result, vec!["what is VectorStore".to_string()]);
    }

    #[tokio::test]
    async fn instant_mode_never_decomposes() {
        let result = decompose("how does the architecture flow together across ten words here", QueryMode::Instant, None, 3, 5).await;
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_original_only() {
        let llm = StubLlm { response: None };
        let result = decompose(
            "how does the indexing architecture interact with storage and the overlay manager",
            QueryMode::Auto,
            Some(&llm),
            3,
            5,
        )
        .await;
        assert_eq!(result, vec!["how does the indexing architecture interact with storage and the overlay manager".to_string()]);
    }

    #[tokio::test]
    async fn llm_success_prepends_original_and_caps_at_mode_max() {
        let llm = StubLlm {
            response: Some(r#"{"sub_queries": ["a", "b", "c", "d"]}"#.to_string()),
        };
        let result = decompose(
            "how does the indexing architecture interact with storage and the overlay manager",
            QueryMode::Auto,
            Some(&llm),
            3,
            5,
        )
        .await;
        assert_eq!(result.len(), 3);
        assert_eq!(result[0], "how does the indexing architecture interact with storage and the overlay manager");
    }
}
