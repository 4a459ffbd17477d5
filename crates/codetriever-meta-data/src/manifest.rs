//! `ManifestStore`: JSON persistence for [`IndexManifest`] and
//! [`OverlayState`] under the layout spec §6 defines:
//! `<workspace>/.kb/mind/indexes/<scope_id>/{manifest.json, overlay-state.json}`.
//!
//! Writes are atomic (write to a sibling temp file, then rename) so a
//! canceled indexing run never leaves a half-written manifest behind for a
//! concurrent reader to observe (spec §5 cancellation guarantee).

use std::path::{Path, PathBuf};

use crate::error::MetaDataResult;
use crate::models::{IndexManifest, OverlayState};

const MANIFEST_FILE: &str = "manifest.json";
const OVERLAY_FILE: &str = "overlay-state.json";

/// Resolves and persists the per-scope manifest/overlay files under a
/// workspace root.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    workspace_root: PathBuf,
}

impl ManifestStore {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self { workspace_root: workspace_root.into() }
    }

    /// `<workspace>/.kb/mind/indexes/<scope_id>/`
    #[must_use]
    pub fn scope_dir(&self, scope_id: &str) -> PathBuf {
        self.workspace_root.join(".kb").join("mind").join("indexes").join(scope_id)
    }

    #[must_use]
    pub fn manifest_path(&self, scope_id: &str) -> PathBuf {
        self.scope_dir(scope_id).join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn overlay_path(&self, scope_id: &str) -> PathBuf {
        self.scope_dir(scope_id).join(OVERLAY_FILE)
    }

    /// Load a scope's manifest, if one has ever been written.
    ///
    /// # Errors
    /// Returns [`crate::error::MetaDataError::Parse`] if the file exists but
    /// isn't valid JSON, or an IO error for anything other than "not found".
    pub async fn load_manifest(&self, scope_id: &str) -> MetaDataResult<Option<IndexManifest>> {
        read_json_if_exists(&self.manifest_path(scope_id)).await
    }

    /// Atomically write a scope's manifest, creating parent directories as
    /// needed. This is the commit point per spec §5's ownership model:
    /// readers that opened a snapshot before this call keep observing the
    /// old `index_revision`.
    ///
    /// # Errors
    /// Returns an IO error if the directory can't be created or the
    /// temp-file/rename sequence fails.
    pub async fn save_manifest(&self, scope_id: &str, manifest: &IndexManifest) -> MetaDataResult<()> {
        write_json_atomic(&self.manifest_path(scope_id), manifest).await
    }

    /// Load a scope's overlay state, if any.
    ///
    /// # Errors
    /// Returns [`crate::error::MetaDataError::Parse`] on malformed JSON.
    pub async fn load_overlay_state(&self, scope_id: &str) -> MetaDataResult<Option<OverlayState>> {
        read_json_if_exists(&self.overlay_path(scope_id)).await
    }

    /// Atomically write a scope's overlay state.
    ///
    /// # Errors
    /// Returns an IO error if the write fails.
    pub async fn save_overlay_state(&self, scope_id: &str, state: &OverlayState) -> MetaDataResult<()> {
        write_json_atomic(&self.overlay_path(scope_id), state).await
    }

    /// Whether any manifest has ever been written for this scope.
    #[must_use]
    pub fn scope_exists(&self, scope_id: &str) -> bool {
        self.manifest_path(scope_id).exists()
    }

    /// Remove a scope's entire metadata directory.
    ///
    /// # Errors
    /// Returns an IO error if removal fails for a reason other than the
    /// directory not existing.
    pub async fn delete_scope(&self, scope_id: &str) -> MetaDataResult<()> {
        let dir = self.scope_dir(scope_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_json_if_exists<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> MetaDataResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> MetaDataResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &body).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManifestStats, StorageDescriptor};
    use chrono::Utc;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn sample_manifest() -> IndexManifest {
        IndexManifest {
            manifest_version: "1.0.0".to_string(),
            index_revision: "rev-1".to_string(),
            built_at: Utc::now(),
            git_revision: Some("abc123".to_string()),
            branch: Some("main".to_string()),
            engine_config_hash: "cfg-1".to_string(),
            sources_digest: "src-1".to_string(),
            stats: ManifestStats {
                total_chunks: 10,
                total_files: 2,
                embedding_model: "jina".to_string(),
                embedding_dimension: 768,
                index_time_ms: 42,
            },
            storage: StorageDescriptor {
                storage_type: "local".to_string(),
                location: "/tmp/x".to_string(),
                sha256: "deadbeef".to_string(),
                size_bytes: 1024,
            },
            files: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips_all_fields() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let manifest = sample_manifest();

        store.save_manifest("core", &manifest).await.unwrap();
        let loaded = store.load_manifest("core").await.unwrap().expect("manifest should exist");

        assert_eq!(loaded.index_revision, manifest.index_revision);
        assert_eq!(loaded.engine_config_hash, manifest.engine_config_hash);
        assert_eq!(loaded.stats.total_chunks, manifest.stats.total_chunks);
        assert_eq!(loaded.storage.sha256, manifest.storage.sha256);
    }

    #[tokio::test]
    async fn load_missing_manifest_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        assert!(store.load_manifest("nope").await.unwrap().is_none());
        assert!(!store.scope_exists("nope"));
    }

    #[tokio::test]
    async fn replacing_a_manifest_is_visible_to_the_next_load() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        let mut manifest = sample_manifest();
        store.save_manifest("core", &manifest).await.unwrap();

        manifest.index_revision = "rev-2".to_string();
        store.save_manifest("core", &manifest).await.unwrap();

        let loaded = store.load_manifest("core").await.unwrap().unwrap();
        assert_eq!(loaded.index_revision, "rev-2");
    }

    #[tokio::test]
    async fn delete_scope_removes_manifest_and_overlay() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        store.save_manifest("core", &sample_manifest()).await.unwrap();

        store.delete_scope("core").await.unwrap();
        assert!(!store.scope_exists("core"));
        // Deleting again is a no-op, not an error.
        store.delete_scope("core").await.unwrap();
    }
}
