//! Synthesizer & verification (spec §4.11): produces a grounded answer with
//! `[source:N]` citations, then runs the `SourceVerifier` and `FieldChecker`
//! passes that adjust confidence down whenever the answer isn't fully
//! backed by the cited chunks.

use std::collections::HashSet;
use std::sync::LazyLock;

use codetriever_vector_data::{ChunkKind, ScoredChunk};
use regex::Regex;

use crate::error::SearchResult;
use crate::llm::{CompletionOptions, LlmProvider};

/// A single citation surfaced on the final response (spec §6 `sources[]`).
#[derive(Debug, Clone)]
pub struct Source {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub snippet: String,
    pub relevance: f32,
    pub kind: ChunkKind,
}

/// The synthesizer's output before compression.
#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f64,
    pub warnings: Vec<String>,
}

/// Below this adjusted confidence, a `LOW_CONFIDENCE` warning is emitted
/// (spec §4.11).
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Synthesize an answer for `query` from `chunks`. Uses `llm` when present;
/// falls back to a direct quote of the top chunk otherwise (spec §4.14's
/// "direct answer builder" collapses into this fallback path).
///
/// # Errors
/// Propagates [`crate::llm::LlmError`] if the LLM call fails.
pub async fn synthesize(
    query: &str,
    chunks: &[ScoredChunk],
    llm: Option<&dyn LlmProvider>,
) -> SearchResult<SynthesizedAnswer> {
    let sources: Vec<Source> = chunks
        .iter()
        .map(|c| Source {
            file: c.chunk.path.clone(),
            start_line: c.chunk.span.start_line,
            end_line: c.chunk.span.end_line,
            snippet: c.chunk.text.clone(),
            relevance: c.score,
            kind: c.chunk.metadata.kind,
        })
        .collect();

    let answer = match llm {
        Some(llm) => {
            let context = build_context(chunks);
            let prompt = format!(
                "Answer the question using ONLY the numbered sources below. Cite every claim \
                 with [source:N]. If the sources don't support a fact, omit it rather than \
                 guessing.\n\nQuestion: {query}\n\n{context}"
            );
            let options = CompletionOptions {
                system: Some(
                    "You are a grounded code-search assistant. Never state a fact that is not \
                     supported by a cited source."
                        .to_string(),
                ),
                max_tokens: 1024,
                temperature: 0.1,
                stop: Vec::new(),
            };
            llm.complete(&prompt, &options).await?
        }
        None => direct_answer(chunks),
    };

    let mut warnings = Vec::new();
    let citation_confidence = verify_citations(&answer, chunks.len(), &mut warnings);
    let field_confidence = verify_fields(&answer, chunks);
    let confidence = citation_confidence * field_confidence;
    if confidence < LOW_CONFIDENCE_THRESHOLD {
        warnings.push("LOW_CONFIDENCE".to_string());
    }

    Ok(SynthesizedAnswer {
        answer,
        sources,
        confidence,
        warnings,
    })
}

fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[source:{}] {} (lines {}-{})\n{}",
                i + 1,
                c.chunk.path,
                c.chunk.span.start_line,
                c.chunk.span.end_line,
                c.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn direct_answer(chunks: &[ScoredChunk]) -> String {
    chunks.first().map_or_else(
        || "No relevant sources were found for this query.".to_string(),
        |c| {
            format!(
                "[source:1] {}:{}-{}\n{}",
                c.chunk.path, c.chunk.span.start_line, c.chunk.span.end_line, c.chunk.text
            )
        },
    )
}

static CITATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[source:(\d+)\]").expect("citation regex is valid"));

static IDENTIFIER_TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`[^`]+`|\b[a-z]+[A-Z][A-Za-z0-9]*\b|\b[A-Za-z][A-Za-z0-9]*_[A-Za-z0-9_]+\b")
        .expect("identifier token regex is valid")
});

/// `SourceVerifier` (spec §4.11): confirms every `[source:N]` citation
/// indexes into `chunks`. Returns the fraction of citations that verified,
/// `1.0` when the answer cites nothing.
fn verify_citations(answer: &str, source_count: usize, warnings: &mut Vec<String>) -> f64 {
    let cited: Vec<u32> = CITATION_PATTERN
        .captures_iter(answer)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    if cited.is_empty() {
        return 1.0;
    }
    let valid = cited.iter().filter(|&&n| n >= 1 && (n as usize) <= source_count).count();
    if valid < cited.len() {
        warnings.push(format!(
            "{} of {} citations could not be verified against retrieved sources",
            cited.len() - valid,
            cited.len()
        ));
    }
    valid as f64 / cited.len() as f64
}

/// `FieldChecker` (spec §4.11): scans the answer for identifier-like tokens
/// and verifies each appears in some cited chunk's text. Returns the
/// fraction of tokens that verified, `1.0` when the answer contains none.
fn verify_fields(answer: &str, chunks: &[ScoredChunk]) -> f64 {
    let tokens: HashSet<String> = IDENTIFIER_TOKEN_PATTERN
        .find_iter(answer)
        .map(|m| m.as_str().trim_matches('`').to_string())
        .collect();
    if tokens.is_empty() {
        return 1.0;
    }
    let haystack: String = chunks.iter().map(|c| c.chunk.text.as_str()).collect::<Vec<_>>().join("\n");
    let verified = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    verified as f64 / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codetriever_vector_data::{Chunk, ChunkMetadata, Span};

    fn make_result(path: &str, text: &str) -> ScoredChunk {
        let chunk = Chunk {
            chunk_id: "c1".to_string(),
            scope_id: "s".to_string(),
            source_id: path.to_string(),
            path: path.to_string(),
            span: Span::new(1, 5),
            text: text.to_string(),
            score: 0.9,
            metadata: ChunkMetadata::new(ChunkKind::Code, None, "h".to_string(), Utc::now(), "rev-1".to_string(), Utc::now()),
            embedding: vec![],
        };
        ScoredChunk { chunk, score: 0.9 }
    }

    #[tokio::test]
    async fn no_llm_falls_back_to_direct_quote() {
        let results = vec![make_result("src/a.rs", "fn a() {}")];
        let synthesized = synthesize("what is a()", &results, None).await.unwrap();
        assert!(synthesized.answer.contains("fn a() {}"));
        assert!((synthesized.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn verify_citations_flags_out_of_range_references() {
        let mut warnings = Vec::new();
        let confidence = verify_citations("see [source:1] and [source:9]", 1, &mut warnings);
        assert!((confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn verify_citations_is_trivially_confident_with_no_citations() {
        let mut warnings = Vec::new();
        let confidence = verify_citations("no citations here", 3, &mut warnings);
        assert!((confidence - 1.0).abs() < f64::EPSILON);
        assert!(warnings.is_empty());
    }

    #[test]
    fn verify_fields_checks_identifier_tokens_against_chunk_text() {
        let results = vec![make_result("src/a.rs", "struct VectorStore;")];
        let confidence = verify_fields("the answer mentions `VectorStore` and `Ghost`", &results);
        assert!(confidence < 1.0 && confidence > 0.0);
    }
}
