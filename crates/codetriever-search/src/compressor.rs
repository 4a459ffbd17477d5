//! Compressor (spec §4.12): fits a synthesized answer to a token budget
//! using the strategy ladder — unchanged, truncate snippets, reduce
//! sources, or (when available) LLM summarization before an aggressive
//! last resort.

use crate::llm::{CompletionOptions, LlmProvider, parse_json_response};
use crate::synthesizer::{Source, SynthesizedAnswer};

/// `ceil(len/4)`, the spec's token estimator (spec §4.12).
fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

fn total_tokens(answer: &SynthesizedAnswer) -> usize {
    estimate_tokens(&answer.answer) + answer.sources.iter().map(|s| estimate_tokens(&s.snippet)).sum::<usize>()
}

/// Which rung of the strategy ladder was used, surfaced for telemetry/tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStrategy {
    Unchanged,
    Truncate,
    ReduceSources,
    Summarize,
    Aggressive,
}

#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub answer: SynthesizedAnswer,
    pub strategy: CompressionStrategy,
}

/// Compress `answer` to fit `max_response_tokens`, per spec §4.12's ladder.
pub async fn compress(
    mut answer: SynthesizedAnswer,
    max_response_tokens: usize,
    max_snippet_lines: usize,
    max_sources: usize,
    llm: Option<&dyn LlmProvider>,
) -> CompressionOutcome {
    let initial = total_tokens(&answer);
    if initial <= max_response_tokens {
        return CompressionOutcome {
            answer,
            strategy: CompressionStrategy::Unchanged,
        };
    }

    let overflow_ratio = (initial as f64 - max_response_tokens as f64) / max_response_tokens as f64;

    if overflow_ratio < 0.2 {
        truncate_snippets(&mut answer.sources, max_snippet_lines);
        return CompressionOutcome {
            answer,
            strategy: CompressionStrategy::Truncate,
        };
    }

    if overflow_ratio < 0.5 {
        answer.sources.truncate(max_sources);
        truncate_snippets(&mut answer.sources, max_snippet_lines);
        return CompressionOutcome {
            answer,
            strategy: CompressionStrategy::ReduceSources,
        };
    }

    if let Some(llm) = llm
        && let Ok(summaries) = summarize_snippets(&answer.sources, llm).await
        && summaries.len() == answer.sources.len()
    {
        for (source, summary) in answer.sources.iter_mut().zip(summaries) {
            source.snippet = summary;
        }
        return CompressionOutcome {
            answer,
            strategy: CompressionStrategy::Summarize,
        };
    }

    answer.sources.truncate(3);
    truncate_snippets(&mut answer.sources, 5);
    if answer.answer.chars().count() > 500 {
        answer.answer = answer.answer.chars().take(500).collect();
    }
    CompressionOutcome {
        answer,
        strategy: CompressionStrategy::Aggressive,
    }
}

fn truncate_snippets(sources: &mut [Source], max_lines: usize) {
    for source in sources.iter_mut() {
        let truncated: Vec<&str> = source.snippet.lines().take(max_lines).collect();
        source.snippet = truncated.join("\n");
    }
}

#[derive(serde::Deserialize)]
struct SummaryResponse {
    summaries: Vec<String>,
}

async fn summarize_snippets(sources: &[Source], llm: &dyn LlmProvider) -> Result<Vec<String>, crate::llm::LlmError> {
    let numbered = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {}\n{}", i + 1, s.file, s.snippet))
        .collect::<Vec<_>>()
        .join("\n\n");
    let prompt = format!(
        "Summarize each of the following {} code/doc snippets in one or two sentences, \
         preserving any identifiers mentioned. Respond with JSON: {{\"summaries\": \
         [\"...\"]}} with exactly {} entries in the same order.\n\n{numbered}",
        sources.len(),
        sources.len()
    );
    let options = CompletionOptions {
        system: Some("You write terse, accurate one-sentence code snippet summaries.".to_string()),
        max_tokens: 600,
        temperature: 0.0,
        stop: Vec::new(),
    };
    let raw = llm.complete(&prompt, &options).await?;
    let parsed: SummaryResponse =
        parse_json_response(&raw).map_err(|_| crate::llm::LlmError::UnparsableJson(raw.chars().take(200).collect()))?;
    Ok(parsed.summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codetriever_vector_data::ChunkKind;

    fn make_answer(snippet_len: usize, source_count: usize) -> SynthesizedAnswer {
        SynthesizedAnswer {
            answer: "short answer".to_string(),
            sources: (0..source_count)
                .map(|i| Source {
                    file: format!("src/{i}.rs"),
                    start_line: 1,
                    end_line: 20,
                    snippet: "x\n".repeat(snippet_len),
                    relevance: 0.5,
                    kind: ChunkKind::Code,
                })
                .collect(),
            confidence: 0.9,
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn within_budget_is_unchanged() {
        let answer = make_answer(5, 1);
        let outcome = compress(answer, 4000, 20, 5, None).await;
        assert_eq!(outcome.strategy, CompressionStrategy::Unchanged);
    }

    #[tokio::test]
    async fn small_overflow_truncates_snippets_only() {
        let answer = make_answer(2000, 2);
        let outcome = compress(answer, 1800, 10, 5, None).await;
        assert_eq!(outcome.strategy, CompressionStrategy::Truncate);
        assert!(outcome.answer.sources.iter().all(|s| s.snippet.lines().count() <= 10));
    }

    #[tokio::test]
    async fn medium_overflow_reduces_sources() {
        let answer = make_answer(3000, 10);
        let outcome = compress(answer, 3000, 10, 3, None).await;
        assert_eq!(outcome.strategy, CompressionStrategy::ReduceSources);
        assert!(outcome.answer.sources.len() <= 3);
    }

    #[tokio::test]
    async fn large_overflow_without_llm_is_aggressive() {
        let answer = make_answer(5000, 10);
        let outcome = compress(answer, 1000, 10, 3, None).await;
        assert_eq!(outcome.strategy, CompressionStrategy::Aggressive);
        assert!(outcome.answer.sources.len() <= 3);
        assert!(outcome.answer.sources.iter().all(|s| s.snippet.lines().count() <= 5));
    }
}
