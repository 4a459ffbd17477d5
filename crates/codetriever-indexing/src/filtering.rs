//! Filtering stage (C8 stage 2): decide which discovered files actually need
//! rechunking, without rereading unchanged files (spec §4.3).
//!
//! Two-tier check: a cheap `(mtime, size)` comparison against the manifest's
//! last-known [`FileMetadata`] first; only files that fail it get their
//! content read and SHA-256'd for the authoritative comparison. A git-aware
//! fast path (SPEC_FULL §4.3 supplement) skips both tiers for files the
//! `GitChangeDetector` already reports unchanged since the last indexed
//! revision.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use codetriever_meta_data::{FileMetadata, FileState};
use codetriever_vector_data::chunk::hash_content;

use crate::discovery::DiscoveredFile;
use crate::error::IndexerResult;

/// A file that survived filtering, with its freshly-read content and the
/// [`FileState`] that determined it needed (re)processing.
pub struct FilteredFile {
    pub path: String,
    pub content: String,
    pub mtime: DateTime<Utc>,
    pub size: u64,
    pub hash: String,
    pub state: FileState,
}

/// Filter `discovered` files against `known` (the manifest's last-known
/// per-file metadata), returning only files that need (re)chunking.
///
/// `unchanged_paths` is the git fast-path: paths `GitChangeDetector` already
/// reports unchanged since the last indexed revision skip both tiers
/// entirely and are never re-read.
///
/// # Errors
/// Returns [`IndexerError::Io`] if a candidate file cannot be read as UTF-8
/// after lossy decoding, or if its filesystem metadata cannot be read.
pub async fn filter_files(
    root: &Path,
    discovered: &[DiscoveredFile],
    known: &HashMap<String, FileMetadata>,
    unchanged_paths: &HashSet<String>,
) -> IndexerResult<(Vec<FilteredFile>, usize)> {
    let mut changed = Vec::new();
    let mut skipped = 0usize;

    for file in discovered {
        if unchanged_paths.contains(&file.path) {
            skipped += 1;
            continue;
        }

        let full_path = root.join(&file.path);
        let meta = tokio::fs::metadata(&full_path).await?;
        let size = meta.len();
        let mtime: DateTime<Utc> = meta.modified().map_or_else(|_| Utc::now(), DateTime::<Utc>::from);

        let prior = known.get(&file.path);

        // Tier (a): mtime+size match means "probably unchanged" without
        // touching file content at all.
        if let Some(prior) = prior
            && prior.size == size
            && prior.mtime == mtime
        {
            skipped += 1;
            continue;
        }

        // Tier (b): read and hash to get the authoritative answer.
        let bytes = tokio::fs::read(&full_path).await?;
        let (content, _, _) = encoding_rs::UTF_8.decode(&bytes);
        let content = content.into_owned();
        let hash = hash_content(&bytes);

        let state = match prior {
            Some(prior) if prior.hash == hash => {
                skipped += 1;
                continue;
            }
            Some(_) => FileState::Updated,
            None => FileState::New,
        };

        changed.push(FilteredFile {
            path: file.path.clone(),
            content,
            mtime,
            size,
            hash,
            state,
        });
    }

    Ok((changed, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn discovered(path: &str) -> DiscoveredFile {
        DiscoveredFile { path: path.to_string() }
    }

    #[tokio::test]
    async fn new_file_with_no_prior_metadata_is_kept() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();

        let (changed, skipped) =
            filter_files(dir.path(), &[discovered("a.rs")], &HashMap::new(), &HashSet::new())
                .await
                .unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(skipped, 0);
        assert_eq!(changed[0].state, FileState::New);
    }

    #[tokio::test]
    async fn unchanged_mtime_and_size_skips_without_reading_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.rs");
        fs::write(&path, "fn a() {}").unwrap();
        let meta = fs::metadata(&path).unwrap();
        let mtime: DateTime<Utc> = meta.modified().unwrap().into();

        let mut known = HashMap::new();
        known.insert(
            "a.rs".to_string(),
            FileMetadata {
                path: "a.rs".to_string(),
                mtime,
                size: meta.len(),
                hash: "irrelevant".to_string(),
                source_id: "a.rs".to_string(),
            },
        );

        let (changed, skipped) =
            filter_files(dir.path(), &[discovered("a.rs")], &known, &HashSet::new()).await.unwrap();
        assert!(changed.is_empty());
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn content_hash_mismatch_is_updated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.rs");
        fs::write(&path, "fn a() {}").unwrap();

        let mut known = HashMap::new();
        known.insert(
            "a.rs".to_string(),
            FileMetadata {
                path: "a.rs".to_string(),
                mtime: Utc::now() - chrono::Duration::days(1),
                size: 999,
                hash: "stale-hash".to_string(),
                source_id: "a.rs".to_string(),
            },
        );

        let (changed, _) =
            filter_files(dir.path(), &[discovered("a.rs")], &known, &HashSet::new()).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].state, FileState::Updated);
    }

    #[tokio::test]
    async fn git_fast_path_skips_content_read() {
        let dir = TempDir::new().unwrap();
        // No file on disk at all -- if the fast path tried to read it, this
        // would error. It must not even stat the file.
        let mut unchanged = HashSet::new();
        unchanged.insert("missing.rs".to_string());

        let (changed, skipped) = filter_files(
            dir.path(),
            &[discovered("missing.rs")],
            &HashMap::new(),
            &unchanged,
        )
        .await
        .unwrap();
        assert!(changed.is_empty());
        assert_eq!(skipped, 1);
    }
}
