//! QueryClassifier (spec §4.7): maps a raw query to hybrid-search weights.
//!
//! Grounded on the rule table in spec §4.7 verbatim; the regex set follows
//! the identifier-shape detection style already used by
//! `codetriever-parsing::parsing::languages` for extension matching, here
//! applied to query text instead of file paths.

use std::sync::LazyLock;

use regex::Regex;

/// Output of [`classify`]: hybrid-search weights plus a suggested result
/// limit. Weight sum is not required to be 1 — they feed RRF downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryWeights {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub suggested_limit: usize,
}

static IDENTIFIER_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`[^`]+`|\b[a-z]+[A-Z][A-Za-z0-9]*\b|\b[A-Za-z0-9]+_[A-Za-z0-9_]+\b|\b[a-z0-9]+-[a-z0-9-]+\b|--[a-zA-Z][\w-]*")
        .expect("identifier shape regex is valid")
});

const ERROR_VOCABULARY: &[&str] = &[
    "error", "exception", "panic", "crash", "bug", "fail", "failing", "failed", "stack trace",
    "traceback", "debug", "broken", "fix",
];

const ARCHITECTURE_VOCABULARY: &[&str] = &["how does ", "architecture", "design", "algorithm", "flow"];

/// Whether `query` matches the technical-identifier rule (spec §4.7's first
/// rule). Shared with [`crate::gatherer`], which only applies the
/// intent-aware rerank to technical queries.
#[must_use]
pub fn is_technical(query: &str) -> bool {
    let lower = query.to_lowercase();
    IDENTIFIER_SHAPE.is_match(query)
        || lower.contains("what is ")
        || lower.contains("where")
        || lower.contains("find")
}

/// Extract the technical-identifier-shaped substrings from `query` (backtick
/// spans unwrapped), used by the reranker's exact-identifier-hit bonus.
#[must_use]
pub fn extract_identifiers(query: &str) -> Vec<String> {
    IDENTIFIER_SHAPE
        .find_iter(query)
        .map(|m| m.as_str().trim_matches('`').to_string())
        .collect()
}

/// Classify `query` into hybrid-search weights (spec §4.7). Rules are
/// evaluated in order; the first match wins.
#[must_use]
pub fn classify(query: &str) -> QueryWeights {
    let lower = query.to_lowercase();

    if is_technical(query) {
        return QueryWeights {
            vector_weight: 0.3,
            keyword_weight: 0.7,
            suggested_limit: default_limit(),
        };
    }

    if ARCHITECTURE_VOCABULARY.iter().any(|kw| lower.contains(kw)) {
        return QueryWeights {
            vector_weight: 0.75,
            keyword_weight: 0.25,
            suggested_limit: default_limit(),
        };
    }

    if ERROR_VOCABULARY.iter().any(|kw| lower.contains(kw)) {
        return QueryWeights {
            vector_weight: 0.5,
            keyword_weight: 0.5,
            suggested_limit: default_limit(),
        };
    }

    QueryWeights {
        vector_weight: 0.6,
        keyword_weight: 0.4,
        suggested_limit: default_limit(),
    }
}

fn default_limit() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtick_identifier_is_technical() {
        let weights = classify("what does `VectorStore` do");
        assert_eq!(weights.vector_weight, 0.3);
        assert_eq!(weights.keyword_weight, 0.7);
    }

    #[test]
    fn camel_case_identifier_is_technical() {
        let weights = classify("where is MemoryAwareQueue implemented");
        assert_eq!(weights.vector_weight, 0.3);
    }

    #[test]
    fn cli_flag_is_technical() {
        let weights = classify("what does --max-errors do");
        assert_eq!(weights.vector_weight, 0.3);
    }

    #[test]
    fn architecture_question_favors_vectors() {
        let weights = classify("how does the indexing pipeline architecture flow together");
        assert_eq!(weights.vector_weight, 0.75);
        assert_eq!(weights.keyword_weight, 0.25);
    }

    #[test]
    fn error_vocabulary_is_balanced() {
        let weights = classify("getting a panic during startup");
        assert_eq!(weights.vector_weight, 0.5);
        assert_eq!(weights.keyword_weight, 0.5);
    }

    #[test]
    fn generic_query_is_default() {
        let weights = classify("tell me about the project");
        assert_eq!(weights.vector_weight, 0.6);
        assert_eq!(weights.keyword_weight, 0.4);
    }
}
