//! Storage stage (C8 stage 5): batched, deduplicating upsert into a
//! [`VectorStore`], with an optional concurrent `path`-based delete (spec
//! §4.3).

use std::collections::HashMap;

use codetriever_vector_data::VectorStore;
use codetriever_vector_data::chunk::Chunk;

use crate::error::IndexerResult;

/// Outcome of writing a set of chunks: how many were brand new vs. updates
/// to an existing `chunk_id` whose content hash changed, vs. skipped as
/// unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageOutcome {
    pub stored: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Write `chunks` to `store` in batches of `batch_size`, deleting
/// `deleted_paths` as part of the final batch. Chunks whose `chunk_id`
/// already exists with an identical `file_hash` are skipped rather than
/// rewritten.
///
/// # Errors
/// Propagates the first [`VectorDataError`] any batch write encounters.
pub async fn store_chunks(
    store: &dyn VectorStore,
    scope_id: &str,
    chunks: Vec<Chunk>,
    deleted_paths: &[String],
    batch_size: usize,
) -> IndexerResult<StorageOutcome> {
    let existing: HashMap<String, String> = store
        .get_all_chunks(scope_id, &codetriever_vector_data::storage::SearchFilters::default())
        .await?
        .into_iter()
        .map(|c| (c.chunk_id, c.metadata.file_hash))
        .collect();

    let mut outcome = StorageOutcome::default();
    let mut to_write = Vec::new();

    for chunk in chunks {
        match existing.get(&chunk.chunk_id) {
            Some(prior_hash) if *prior_hash == chunk.metadata.file_hash => {
                outcome.skipped += 1;
            }
            Some(_) => {
                outcome.updated += 1;
                to_write.push(chunk);
            }
            None => {
                outcome.stored += 1;
                to_write.push(chunk);
            }
        }
    }

    let batch_size = batch_size.max(1);
    let mut batches = to_write.chunks(batch_size).map(<[Chunk]>::to_vec).peekable();

    if batches.peek().is_none() {
        if !deleted_paths.is_empty() {
            store.update_scope(scope_id, Vec::new(), deleted_paths).await?;
        }
        return Ok(outcome);
    }

    while let Some(batch) = batches.next() {
        if batches.peek().is_none() && !deleted_paths.is_empty() {
            store.update_scope(scope_id, batch, deleted_paths).await?;
        } else {
            store.upsert_chunks(scope_id, batch).await?;
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use codetriever_vector_data::LocalFlatStore;
    use codetriever_vector_data::chunk::{ChunkKind, ChunkMetadata, Span};

    fn chunk(id: &str, path: &str, hash: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            scope_id: "scope".to_string(),
            source_id: path.to_string(),
            path: path.to_string(),
            span: Span::new(1, 1),
            text: "x".to_string(),
            score: 0.0,
            metadata: ChunkMetadata::new(
                ChunkKind::Code,
                Some("rust".to_string()),
                hash.to_string(),
                Utc::now(),
                "rev".to_string(),
                Utc::now(),
            ),
            embedding: vec![0.1, 0.2],
        }
    }

    #[tokio::test]
    async fn first_write_stores_everything_as_new() {
        let store = LocalFlatStore::new();
        let chunks = vec![chunk("a:1-1", "a.rs", "h1"), chunk("b:1-1", "b.rs", "h2")];
        let outcome = store_chunks(&store, "scope", chunks, &[], 100).await.unwrap();
        assert_eq!(outcome.stored, 2);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test]
    async fn rewrite_with_same_hash_is_skipped_and_changed_hash_is_updated() {
        let store = LocalFlatStore::new();
        let first = vec![chunk("a:1-1", "a.rs", "h1"), chunk("b:1-1", "b.rs", "h2")];
        store_chunks(&store, "scope", first, &[], 100).await.unwrap();

        let second = vec![chunk("a:1-1", "a.rs", "h1"), chunk("b:1-1", "b.rs", "h2-changed")];
        let outcome = store_chunks(&store, "scope", second, &[], 100).await.unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.stored, 0);
    }

    #[tokio::test]
    async fn deleted_paths_are_removed_from_the_scope() {
        let store = LocalFlatStore::new();
        let first = vec![chunk("a:1-1", "a.rs", "h1"), chunk("b:1-1", "b.rs", "h2")];
        store_chunks(&store, "scope", first, &[], 100).await.unwrap();

        store_chunks(&store, "scope", Vec::new(), &["a.rs".to_string()], 100).await.unwrap();
        let filters = codetriever_vector_data::storage::SearchFilters::default();
        let remaining = store.get_all_chunks("scope", &filters).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, "b.rs");
    }
}
