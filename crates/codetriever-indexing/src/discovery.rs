//! Discovery stage (C8 stage 1): expand workspace source globs into
//! workspace-root-relative, forward-slash-normalized paths honoring `exclude`
//! patterns (spec §4.3).

use std::path::Path;

use ignore::WalkBuilder;

use crate::error::IndexerResult;

/// A file found by discovery, with its path relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Forward-slash-normalized, workspace-root-relative path
    pub path: String,
}

/// Walk `root`, honoring `.gitignore`/`.ignore` and an explicit `exclude`
/// glob list, returning every regular file found.
///
/// # Errors
/// Returns an IO error if `root` cannot be read.
pub fn discover(root: &Path, exclude: &[String]) -> IndexerResult<Vec<DiscoveredFile>> {
    let mut walker = WalkBuilder::new(root);
    walker.hidden(false).git_ignore(true).git_exclude(true);

    let mut files = Vec::new();
    for entry in walker.build() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let normalized = codetriever_vector_data::chunk::normalize_path(&relative.to_string_lossy());

        if is_excluded(&normalized, exclude) {
            continue;
        }

        files.push(DiscoveredFile { path: normalized });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn is_excluded(path: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|pattern| codetriever_vector_data::storage::glob_match(pattern, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discover_finds_nested_files_with_normalized_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/nested/a.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# hi").unwrap();

        let files = discover(dir.path(), &[]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert!(paths.contains(&"src/nested/a.rs".to_string()));
        assert!(paths.contains(&"README.md".to_string()));
    }

    #[test]
    fn discover_honors_exclude_globs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/debug.bin"), "x").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let files = discover(dir.path(), &["target/*".to_string()]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert!(!paths.iter().any(|p| p.starts_with("target/")));
        assert!(paths.contains(&"main.rs".to_string()));
    }

    #[test]
    fn discover_respects_gitignore() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "ignored.txt\n").unwrap();
        fs::write(dir.path().join("ignored.txt"), "x").unwrap();
        fs::write(dir.path().join("kept.txt"), "x").unwrap();

        let files = discover(dir.path(), &[]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert!(!paths.contains(&"ignored.txt".to_string()));
        assert!(paths.contains(&"kept.txt".to_string()));
    }
}
