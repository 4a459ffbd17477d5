//! Data model for the metadata layer: `FileMetadata`, `IndexManifest`,
//! `OverlayState`, `QueryHistoryEntry`, `FeedbackEntry`, plus the
//! `RepositoryContext`/`FileState` supplement (spec §3, SPEC_FULL §3).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Current manifest schema version. Compatibility is same-major per spec §3.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// `(path, mtime, size, hash, source_id)` — used by the Filtering stage to
/// decide whether a file needs rechunking without rereading it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    pub path: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
    pub hash: String,
    pub source_id: String,
}

/// Outcome of comparing a file against its last-known `FileMetadata`,
/// driving `stats.filesSkipped` vs. reprocessed (SPEC_FULL §3 supplement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unchanged,
    New,
    Updated,
}

/// Per-scope descriptor written atomically at the end of a successful build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub manifest_version: String,
    pub index_revision: String,
    pub built_at: DateTime<Utc>,
    pub git_revision: Option<String>,
    pub branch: Option<String>,
    pub engine_config_hash: String,
    pub sources_digest: String,
    pub stats: ManifestStats,
    pub storage: StorageDescriptor,
    /// Per-file metadata snapshot, keyed by normalized path, used by the
    /// Filtering stage on the next incremental build.
    #[serde(default)]
    pub files: HashMap<String, FileMetadata>,
}

impl IndexManifest {
    /// True if `other`'s major version matches this reader's expectation,
    /// per spec §3 "compatibility = same major".
    #[must_use]
    pub fn major_version(version: &str) -> Option<u64> {
        version.split('.').next()?.parse().ok()
    }

    #[must_use]
    pub fn is_compatible(&self) -> bool {
        Self::major_version(&self.manifest_version) == Self::major_version(MANIFEST_VERSION)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManifestStats {
    pub total_chunks: usize,
    pub total_files: usize,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub index_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageDescriptor {
    pub storage_type: String,
    pub location: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// `(base_revision, built_at, modified_paths, deleted_paths, chunk_count)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayState {
    pub base_revision: String,
    pub built_at: DateTime<Utc>,
    pub modified_paths: Vec<String>,
    pub deleted_paths: Vec<String>,
    pub chunk_count: usize,
    /// Three-level staleness classification (spec §9 Open Question #2):
    /// the only taxonomy this implementation tracks. `OverlayState::is_stale`
    /// derives the legacy TTL-boolean from it rather than keeping a second,
    /// conflicting notion of staleness.
    #[serde(default)]
    pub staleness: StalenessLevel,
}

impl OverlayState {
    /// Derived boolean staleness: true for anything other than `Fresh`,
    /// replacing the TTL-only boolean the distillation's two taxonomies
    /// disagreed on.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.staleness != StalenessLevel::Fresh
    }
}

/// Retrieval/overlay staleness, worst-wins across sub-queries (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StalenessLevel {
    #[default]
    Fresh,
    SoftStale,
    HardStale,
}

impl StalenessLevel {
    /// Combine two staleness readings, keeping the worse of the two.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// A recorded query, for feedback/analytics and future re-ranking signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub query_id: String,
    pub query_text: String,
    pub query_hash: String,
    pub scope_id: String,
    pub ts: DateTime<Utc>,
    pub query_vector: Vec<f32>,
    pub result_chunk_ids: Vec<String>,
    pub top_chunk_ids: Vec<String>,
}

/// User or system feedback about a `(query, chunk)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub feedback_id: String,
    pub query_id: String,
    pub chunk_id: String,
    pub scope_id: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub score: f32,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    #[serde(rename = "self")]
    SelfReported,
    Implicit,
    Explicit,
}

/// Git identity of the workspace being indexed, produced by
/// `GitChangeDetector` and folded into a manifest's `git_revision`/`branch`
/// (SPEC_FULL §3 supplement).
#[derive(Debug, Clone)]
pub struct RepositoryContext {
    pub repository_id: String,
    pub repository_url: Option<String>,
    pub branch: String,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub commit_date: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub is_dirty: bool,
    pub root_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_version_compat_checks_major_only() {
        let mut manifest = IndexManifest {
            manifest_version: "1.3.0".to_string(),
            index_revision: "rev-1".to_string(),
            built_at: Utc::now(),
            git_revision: None,
            branch: None,
            engine_config_hash: "cfg".to_string(),
            sources_digest: "src".to_string(),
            stats: ManifestStats::default(),
            storage: StorageDescriptor::default(),
            files: HashMap::new(),
        };
        assert!(manifest.is_compatible());
        manifest.manifest_version = "2.0.0".to_string();
        assert!(!manifest.is_compatible());
    }

    #[test]
    fn staleness_worst_picks_the_higher_level() {
        assert_eq!(StalenessLevel::Fresh.worst(StalenessLevel::SoftStale), StalenessLevel::SoftStale);
        assert_eq!(StalenessLevel::HardStale.worst(StalenessLevel::Fresh), StalenessLevel::HardStale);
    }

    #[test]
    fn overlay_is_stale_matches_non_fresh() {
        let overlay = OverlayState {
            base_revision: "b".to_string(),
            built_at: Utc::now(),
            modified_paths: vec![],
            deleted_paths: vec![],
            chunk_count: 0,
            staleness: StalenessLevel::SoftStale,
        };
        assert!(overlay.is_stale());
    }
}
