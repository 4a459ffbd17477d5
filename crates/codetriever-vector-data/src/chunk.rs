//! The [`Chunk`] data model: the unit of retrieval (spec §3)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// A contiguous, semantically bounded fragment of a file with its embedding
/// and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id, unique within `(scope_id, index_revision)`
    pub chunk_id: String,
    /// Partition this chunk belongs to
    pub scope_id: String,
    /// Identifier of the source file that produced this chunk
    pub source_id: String,
    /// Forward-slash normalized, workspace-root-relative path
    pub path: String,
    /// Line span, 1-indexed, inclusive
    pub span: Span,
    /// The chunk's text content
    pub text: String,
    /// Transient similarity score, populated by search; not persisted meaningfully
    #[serde(default)]
    pub score: f32,
    /// Structured + open metadata
    pub metadata: ChunkMetadata,
    /// Dense embedding vector; empty until the embedding stage runs
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// 1-indexed, inclusive line span. Invariant: `end_line >= start_line >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
}

impl Span {
    /// # Panics
    /// In debug builds, panics if the span violates `end_line >= start_line >= 1`.
    #[must_use]
    pub fn new(start_line: usize, end_line: usize) -> Self {
        debug_assert!(start_line >= 1 && end_line >= start_line);
        Self { start_line, end_line }
    }
}

/// The kind of content a chunk was extracted from, used by rerank and by
/// `source_trust` defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Code,
    Docs,
    Adr,
    Config,
    Test,
    Other,
}

impl ChunkKind {
    /// Default `source_trust` for this kind, per spec §3.
    #[must_use]
    pub fn default_trust(self) -> f32 {
        match self {
            Self::Adr => 0.9,
            Self::Docs => 0.8,
            Self::Config => 0.75,
            Self::Code => 0.7,
            Self::Test => 0.65,
            Self::Other => 0.5,
        }
    }
}

/// Metadata always carried by a chunk, plus an open `extra` map for rare
/// fields (spec §9: typed record + small extra map, not a universal dynamic
/// map, to keep hot paths allocation-light).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub kind: ChunkKind,
    pub language: Option<String>,
    pub source_trust: f32,
    pub file_hash: String,
    pub file_mtime: DateTime<Utc>,
    pub index_revision: String,
    pub indexed_at: DateTime<Utc>,

    /// Doc-only fields (kind == Docs)
    pub doc_id: Option<String>,
    pub doc_title: Option<String>,
    pub doc_section_path: Option<String>,
    pub topic_key: Option<String>,
    pub freshness_score: Option<f32>,

    /// Rare/open fields that don't warrant a dedicated column
    #[serde(default)]
    pub extra: HashMap<String, JsonValue>,
}

impl ChunkMetadata {
    /// Build metadata for a chunk with the kind's default `source_trust`.
    #[must_use]
    pub fn new(
        kind: ChunkKind,
        language: Option<String>,
        file_hash: String,
        file_mtime: DateTime<Utc>,
        index_revision: String,
        indexed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_trust: kind.default_trust(),
            kind,
            language,
            file_hash,
            file_mtime,
            index_revision,
            indexed_at,
            doc_id: None,
            doc_title: None,
            doc_section_path: None,
            topic_key: None,
            freshness_score: None,
            extra: HashMap::new(),
        }
    }
}

/// Normalize a path to use forward slashes, as required by spec §3.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Derive a stable `chunk_id` from `{source_id, path, start_line, end_line[, index]}`.
///
/// `index` disambiguates multiple chunks that would otherwise share an
/// identical span (e.g. a chunker emitting overlapping windows that happen to
/// coincide); pass `0` when spans are already guaranteed unique.
#[must_use]
pub fn generate_chunk_id(source_id: &str, path: &str, span: Span, index: usize) -> String {
    let path = normalize_path(path);
    if index == 0 {
        format!("{source_id}:{path}:{}-{}", span.start_line, span.end_line)
    } else {
        format!("{source_id}:{path}:{}-{}:{index}", span.start_line, span.end_line)
    }
}

/// SHA-256 of file content, hex-encoded. Used for `ChunkMetadata::file_hash`
/// and for change detection in the indexing pipeline.
#[must_use]
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        let span = Span::new(1, 10);
        let a = generate_chunk_id("src/a.rs", "src/a.rs", span, 0);
        let b = generate_chunk_id("src/a.rs", "src/a.rs", span, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_id_differs_on_index() {
        let span = Span::new(1, 10);
        let a = generate_chunk_id("src/a.rs", "src/a.rs", span, 0);
        let b = generate_chunk_id("src/a.rs", "src/a.rs", span, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_path_converts_backslashes() {
        assert_eq!(normalize_path("src\\a\\b.rs"), "src/a/b.rs");
    }

    #[test]
    fn default_trust_matches_spec_table() {
        assert!((ChunkKind::Adr.default_trust() - 0.9).abs() < f32::EPSILON);
        assert!((ChunkKind::Docs.default_trust() - 0.8).abs() < f32::EPSILON);
        assert!((ChunkKind::Config.default_trust() - 0.75).abs() < f32::EPSILON);
        assert!((ChunkKind::Code.default_trust() - 0.7).abs() < f32::EPSILON);
        assert!((ChunkKind::Test.default_trust() - 0.65).abs() < f32::EPSILON);
    }

    #[test]
    fn hash_content_is_stable() {
        assert_eq!(hash_content(b"hello"), hash_content(b"hello"));
        assert_ne!(hash_content(b"hello"), hash_content(b"world"));
    }
}
