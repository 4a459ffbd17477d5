//! Embedding stage (C8 stage 4): batch chunks by estimated token cost, run
//! them through the rate limiter and embedding provider with retry/backoff,
//! and bisect batches that trip a deterministic input error (spec §4.3).

use std::sync::Arc;

use codetriever_embeddings::{EmbeddingError, EmbeddingProvider, RateLimiter};
use codetriever_vector_data::chunk::Chunk;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::error::{IndexerError, IndexerResult};

/// ~4 chars/token estimator, matching the spec's literal batching heuristic.
fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// Strip NUL bytes and re-validate as UTF-8, per spec §4.3's sanitize step.
/// Returns `None` for text that is empty after sanitization (dropped as a
/// poison pill rather than sent to the provider).
fn sanitize(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|&c| c != '\0').collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Whether this error looks like a deterministic rejection of the input
/// itself (bad tokenization, malformed text) rather than a transient
/// infrastructure failure. Only these are worth bisecting: retrying a
/// network blip against half the batch wastes calls without narrowing
/// anything down.
fn is_deterministic_input_error(err: &EmbeddingError) -> bool {
    matches!(err, EmbeddingError::Tokenization(_) | EmbeddingError::Embedding(_))
}

/// Whether this error is worth retrying at all (vs. a config/setup problem
/// that will fail identically every time).
fn is_retryable(err: &EmbeddingError) -> bool {
    !matches!(err, EmbeddingError::Config(_))
}

/// Partition sanitized chunk texts into batches whose estimated token sum
/// stays under `target_tokens`, further clamped by the provider's
/// `max_tokens` for a single item.
fn partition_batches(chunks: &[Chunk], target_tokens: usize) -> Vec<Vec<usize>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        let tokens = estimate_tokens(&chunk.text);
        if !current.is_empty() && current_tokens + tokens > target_tokens {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(i);
        current_tokens += tokens;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Embed one batch with exponential backoff, bisecting on a deterministic
/// input error until isolating (and dropping) the single poison item.
async fn embed_batch_with_recovery(
    provider: &dyn EmbeddingProvider,
    limiter: &RateLimiter,
    texts: &[String],
    max_retries: u32,
    base_delay_ms: u64,
) -> (Vec<Vec<f32>>, Vec<(usize, String)>) {
    if texts.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let estimated: u64 = texts.iter().map(|t| estimate_tokens(t) as u64).sum();
    let mut attempt = 0u32;

    loop {
        limiter.acquire(estimated).await;
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let result = provider.embed_batch(&refs).await;
        limiter.release();

        match result {
            Ok(vectors) => return (vectors, Vec::new()),
            Err(e) if texts.len() > 1 && is_deterministic_input_error(&e) => {
                let mid = texts.len() / 2;
                let (left_texts, right_texts) = texts.split_at(mid);
                let (mut left_vecs, mut left_errs) =
                    Box::pin(embed_batch_with_recovery(provider, limiter, left_texts, max_retries, base_delay_ms))
                        .await;
                let (right_vecs, right_errs) =
                    Box::pin(embed_batch_with_recovery(provider, limiter, right_texts, max_retries, base_delay_ms))
                        .await;
                left_vecs.extend(right_vecs);
                left_errs.extend(right_errs.into_iter().map(|(i, msg)| (i + mid, msg)));
                return (left_vecs, left_errs);
            }
            Err(e) if texts.len() == 1 && is_deterministic_input_error(&e) => {
                // Single-item poison pill: drop it with a warning rather
                // than failing the whole run.
                tracing::warn!(error = %e, "dropping poison-pill chunk that the embedding backend rejected");
                return (Vec::new(), vec![(0, e.to_string())]);
            }
            Err(e) if is_retryable(&e) && attempt < max_retries => {
                attempt += 1;
                let delay = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
                tracing::debug!(attempt, delay_ms = delay, error = %e, "retrying embedding batch");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            Err(e) => {
                return (Vec::new(), (0..texts.len()).map(|i| (i, e.to_string())).collect());
            }
        }
    }
}

/// Embed every chunk's text, writing the resulting vector back into
/// `chunk.embedding`. Chunks whose embedding failed (after retry/bisection)
/// are removed from the returned vector and reported as errors.
///
/// # Errors
/// Never returns `Err` directly; failures are reported per-chunk in the
/// returned error list so the caller can apply its own error budget.
pub async fn embed_chunks(
    provider: Arc<dyn EmbeddingProvider>,
    limiter: Arc<RateLimiter>,
    mut chunks: Vec<Chunk>,
    target_tokens: usize,
    max_concurrency: usize,
    max_retries: u32,
    base_delay_ms: u64,
) -> IndexerResult<(Vec<Chunk>, Vec<(String, String)>)> {
    // Sanitize up front; drop anything that becomes empty.
    let mut errors = Vec::new();
    chunks.retain(|c| {
        if sanitize(&c.text).is_some() {
            true
        } else {
            errors.push((c.path.clone(), "empty after sanitization".to_string()));
            false
        }
    });
    for chunk in &mut chunks {
        chunk.text = sanitize(&chunk.text).unwrap_or_default();
    }

    let batches = partition_batches(&chunks, target_tokens);
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = FuturesUnordered::new();

    for batch_indices in batches {
        let provider = Arc::clone(&provider);
        let limiter = Arc::clone(&limiter);
        let semaphore = Arc::clone(&semaphore);
        let texts: Vec<String> = batch_indices.iter().map(|&i| chunks[i].text.clone()).collect();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let (vectors, errs) =
                embed_batch_with_recovery(provider.as_ref(), &limiter, &texts, max_retries, base_delay_ms).await;
            (batch_indices, vectors, errs)
        }));
    }

    let mut embedded = Vec::with_capacity(chunks.len());
    let mut failed_indices = std::collections::HashSet::new();
    let mut vectors_by_index = std::collections::HashMap::new();

    while let Some(joined) = tasks.next().await {
        let (batch_indices, vectors, errs) =
            joined.map_err(|e| IndexerError::Other(e.to_string()))?;

        let failed_in_batch: std::collections::HashSet<usize> = errs.iter().map(|(i, _)| *i).collect();
        let mut vector_iter = vectors.into_iter();
        for (local_i, &global_i) in batch_indices.iter().enumerate() {
            if failed_in_batch.contains(&local_i) {
                failed_indices.insert(global_i);
            } else if let Some(vector) = vector_iter.next() {
                vectors_by_index.insert(global_i, vector);
            }
        }
        for (local_i, msg) in errs {
            let path = batch_indices.get(local_i).map_or_else(String::new, |&i| chunks[i].path.clone());
            errors.push((path, msg));
        }
    }

    for (i, mut chunk) in chunks.into_iter().enumerate() {
        if failed_indices.contains(&i) {
            continue;
        }
        if let Some(vector) = vectors_by_index.remove(&i) {
            chunk.embedding = vector;
            embedded.push(chunk);
        }
    }

    Ok((embedded, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codetriever_vector_data::chunk::{ChunkKind, ChunkMetadata, Span};

    fn chunk(path: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("{path}:1-1"),
            scope_id: "scope".to_string(),
            source_id: path.to_string(),
            path: path.to_string(),
            span: Span::new(1, 1),
            text: text.to_string(),
            score: 0.0,
            metadata: ChunkMetadata::new(
                ChunkKind::Code,
                Some("rust".to_string()),
                "hash".to_string(),
                Utc::now(),
                "rev".to_string(),
                Utc::now(),
            ),
            embedding: Vec::new(),
        }
    }

    struct StubProvider {
        dim: usize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed_batch(
            &self,
            texts: &[&str],
        ) -> codetriever_embeddings::EmbeddingResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; self.dim]).collect())
        }
        fn embedding_dimension(&self) -> usize {
            self.dim
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

    fn test_limiter() -> RateLimiter {
        RateLimiter::new(&codetriever_config::RateLimitConfig { tpm: 1_000_000, rpm: 1_000 })
    }

    #[tokio::test]
    async fn embeds_every_chunk_and_fills_vectors() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(StubProvider { dim: 4 });
        let limiter = Arc::new(test_limiter());
        let chunks = vec![chunk("a.rs", "fn a() {}"), chunk("b.rs", "fn b() {}")];

        let (embedded, errors) =
            embed_chunks(provider, limiter, chunks, 100_000, 2, 2, 1).await.unwrap();
        assert_eq!(embedded.len(), 2);
        assert!(errors.is_empty());
        assert!(embedded.iter().all(|c| c.embedding.len() == 4));
    }

    #[test]
    fn sanitize_strips_nul_and_drops_empty() {
        assert_eq!(sanitize("a\0b").as_deref(), Some("ab"));
        assert_eq!(sanitize("   "), None);
        assert_eq!(sanitize("\0"), None);
    }

    #[test]
    fn partition_batches_respects_target_tokens() {
        let chunks = vec![chunk("a.rs", &"x".repeat(400)), chunk("b.rs", &"y".repeat(400))];
        // Each chunk is ~100 tokens; target of 100 forces two batches.
        let batches = partition_batches(&chunks, 100);
        assert_eq!(batches.len(), 2);
    }
}
