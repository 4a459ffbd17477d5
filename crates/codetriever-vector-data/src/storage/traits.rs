//! `VectorStore` contract (spec §4.4): scoped chunk storage with
//! upsert/search/enumerate by fingerprint.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::VectorDataResult;
use crate::chunk::Chunk;

/// Filters applicable to `get_all_chunks`/`search`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to chunks whose `source_id` is in this set, when present
    pub source_ids: Option<HashSet<String>>,
    /// Restrict to chunks whose `path` matches this glob, when present
    pub path_glob: Option<String>,
}

impl SearchFilters {
    #[must_use]
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(ids) = &self.source_ids
            && !ids.contains(&chunk.source_id)
        {
            return false;
        }
        if let Some(glob) = &self.path_glob
            && !glob_match(glob, &chunk.path)
        {
            return false;
        }
        true
    }
}

/// Minimal glob matcher supporting `*` (any run) and `?` (one char), enough
/// for the path-prefix/extension filters the gatherer and CLI need.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn rec(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => rec(&p[1..], t) || (!t.is_empty() && rec(p, &t[1..])),
            (Some(b'?'), Some(_)) => rec(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => rec(&p[1..], &t[1..]),
            _ => false,
        }
    }
    rec(pattern.as_bytes(), text.as_bytes())
}

/// A single scored search result.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Aggregate statistics about a scope's storage.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub chunk_count: usize,
    pub file_count: usize,
    pub storage_type: String,
}

/// Scoped chunk storage: upsert/search/enumerate by fingerprint.
///
/// Implementations: [`crate::storage::local_flat::LocalFlatStore`] (in-process,
/// spec's "local flat" backend) and [`crate::storage::qdrant::QdrantStore`]
/// (external service). Both sit behind this trait so the indexing pipeline
/// and orchestrator never depend on a concrete backend (spec §9 redesign:
/// trait/interface with enum dispatch over a fallback adapter path).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Drop and recreate a scope's partition, discarding all prior chunks.
    async fn replace_scope(&self, scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()>;

    /// Insert-or-update chunks by `chunk_id`. Implementations MUST treat this
    /// as idempotent: re-upserting an unchanged chunk is a no-op.
    async fn upsert_chunks(&self, scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()>;

    /// Remove every chunk in `scope_id` whose `path` is in `deleted_paths`,
    /// then idempotently insert/update `chunks` (spec §4.3 stage 5).
    async fn update_scope(
        &self,
        scope_id: &str,
        chunks: Vec<Chunk>,
        deleted_paths: &[String],
    ) -> VectorDataResult<()>;

    /// Delete a scope's entire partition.
    async fn delete_scope(&self, scope_id: &str) -> VectorDataResult<()>;

    /// Whether a scope has ever been populated.
    async fn scope_exists(&self, scope_id: &str) -> VectorDataResult<bool>;

    /// Enumerate all chunks in a scope, optionally filtered.
    async fn get_all_chunks(
        &self,
        scope_id: &str,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<Chunk>>;

    /// Vector similarity search. Results are ordered `(score desc, chunk_id
    /// asc)` for determinism (spec §5 ordering guarantees); scores lie in
    /// `[0, 1]` under an implementation-defined monotone transform of cosine
    /// similarity.
    async fn search(
        &self,
        scope_id: &str,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<ScoredChunk>>;

    /// Backend statistics for a scope.
    async fn stats(&self, scope_id: &str) -> VectorDataResult<StorageStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_handles_star_and_question() {
        assert!(glob_match("src/*.rs", "src/main.rs"));
        assert!(glob_match("src/?.rs", "src/a.rs"));
        assert!(!glob_match("src/*.rs", "src/main.ts"));
        assert!(glob_match("**/*.md", "docs/guide.md"));
    }
}
