//! Jina/BERT-style model token counter implementation

use super::traits::TokenCounter;
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Token counter for Jina BERT v2 style models
///
/// Wraps a tokenizer the caller already loaded (typically by the embedding
/// crate, which owns model download/caching) so this crate never needs to
/// know how to fetch or load a model itself.
pub struct JinaTokenCounter {
    tokenizer: Arc<Tokenizer>,
    max_tokens: usize,
}

impl JinaTokenCounter {
    /// Create a new Jina token counter with the given tokenizer
    pub fn new(tokenizer: Arc<Tokenizer>, max_tokens: usize) -> Self {
        Self {
            tokenizer,
            max_tokens,
        }
    }
}

impl TokenCounter for JinaTokenCounter {
    fn name(&self) -> &str {
        "jina-bert-v2"
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn count(&self, text: &str) -> usize {
        // Encode without special tokens/truncation so counts reflect the raw text
        self.tokenizer
            .encode(text, false)
            .map(|encoding| encoding.len())
            .unwrap_or(0)
    }

    fn count_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|text| self.count(text)).collect()
    }
}

#[cfg(test)]
mod tests {
    // Loading a real Jina tokenizer requires network/model-cache access, so
    // behavioral coverage for `count`/`count_batch` lives in the embedding
    // crate's integration tests, which own a loaded tokenizer fixture.
}
