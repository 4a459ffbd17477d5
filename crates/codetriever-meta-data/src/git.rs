//! `GitChangeDetector` (C7): enumerate `{added, modified, deleted, renamed}`
//! vs. a revision, plus uncommitted changes, by shelling out to `git` (spec
//! §6: "subprocess invocations of `rev-parse`, `merge-base`, `diff
//! --name-status`, `status --porcelain`, `ls-files`, `ls-tree`, `show`").
//!
//! Deliberately not `git2`: the spec's collaborator contract is the
//! subprocess surface, and that's what this detector implements end to end
//! rather than reimplementing the same behavior over `libgit2` bindings.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use tokio::process::Command;

use crate::error::{MetaDataError, MetaDataResult};
use crate::models::RepositoryContext;

/// A single `diff --name-status`/`status --porcelain` entry, normalized from
/// git's `A|M|D|R|C` codes to `added|modified|deleted|renamed|copied`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

impl ChangeKind {
    fn from_code(code: &str) -> Option<Self> {
        match code.chars().next()? {
            'A' => Some(Self::Added),
            'M' => Some(Self::Modified),
            'D' => Some(Self::Deleted),
            'R' => Some(Self::Renamed),
            'C' => Some(Self::Copied),
            _ => None,
        }
    }
}

/// A changed file, with the prior path populated for renames/copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub kind: ChangeKind,
    pub path: String,
    pub old_path: Option<String>,
}

/// Union of committed diff (vs. `base_revision`) and uncommitted changes,
/// as required by spec §4.5's overlay staleness recomputation.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<(String, String)>,
}

impl ChangeSet {
    fn absorb(&mut self, file: ChangedFile) {
        match file.kind {
            ChangeKind::Added => self.added.push(file.path),
            ChangeKind::Modified => self.modified.push(file.path),
            ChangeKind::Deleted => self.deleted.push(file.path),
            ChangeKind::Renamed | ChangeKind::Copied => {
                if let Some(old) = file.old_path {
                    self.renamed.push((old, file.path));
                } else {
                    self.modified.push(file.path);
                }
            }
        }
    }

    /// True if there are no changes of any kind.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
    }

    /// All paths that no longer exist at their old location (deletions plus
    /// the old side of renames) — the set the overlay masks as deleted.
    #[must_use]
    pub fn all_deleted_paths(&self) -> Vec<String> {
        let mut paths = self.deleted.clone();
        paths.extend(self.renamed.iter().map(|(old, _)| old.clone()));
        paths
    }

    /// All paths that need re-chunking: additions, modifications, and the
    /// new side of renames.
    #[must_use]
    pub fn all_touched_paths(&self) -> Vec<String> {
        let mut paths = self.added.clone();
        paths.extend(self.modified.clone());
        paths.extend(self.renamed.iter().map(|(_, new)| new.clone()));
        paths
    }
}

/// Shells out to `git` rooted at a discovered repository toplevel.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    repo_root: PathBuf,
}

impl GitChangeDetector {
    /// Discover the repository containing `path` via `git rev-parse --show-toplevel`.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if `path` is not inside a git repository
    /// or the `git` binary cannot be invoked.
    pub async fn discover(path: &Path) -> MetaDataResult<Self> {
        let output = Command::new("git")
            .arg("-C")
            .arg(path)
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .await
            .map_err(|e| MetaDataError::Git(format!("failed to invoke git: {e}")))?;

        if !output.status.success() {
            return Err(MetaDataError::Git(format!(
                "{path:?} is not inside a git repository: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self { repo_root: PathBuf::from(root) })
    }

    async fn run(&self, args: &[&str]) -> MetaDataResult<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(args)
            .output()
            .await
            .map_err(|e| MetaDataError::Git(format!("failed to invoke git {args:?}: {e}")))?;

        if !output.status.success() {
            return Err(MetaDataError::Git(format!(
                "git {args:?} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `git rev-parse <rev>`
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if `rev` doesn't resolve.
    pub async fn rev_parse(&self, rev: &str) -> MetaDataResult<String> {
        self.run(&["rev-parse", rev]).await
    }

    /// `git merge-base <a> <b>`, `None` if the revisions share no history.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] on a git invocation failure unrelated to
    /// "no common ancestor" (which this method reports as `Ok(None)`).
    pub async fn merge_base(&self, a: &str, b: &str) -> MetaDataResult<Option<String>> {
        match self.run(&["merge-base", a, b]).await {
            Ok(sha) if !sha.is_empty() => Ok(Some(sha)),
            Ok(_) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    /// `git merge-base --is-ancestor <ancestor> <rev>`
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if the underlying `git` invocation
    /// cannot run at all (a non-ancestor relationship is reported as
    /// `Ok(false)`, not an error).
    pub async fn is_ancestor(&self, ancestor: &str, rev: &str) -> MetaDataResult<bool> {
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(["merge-base", "--is-ancestor", ancestor, rev])
            .status()
            .await
            .map_err(|e| MetaDataError::Git(format!("failed to invoke git: {e}")))?;
        Ok(status.success())
    }

    fn parse_name_status(raw: &str) -> Vec<ChangedFile> {
        raw.lines()
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                let mut fields = line.split('\t');
                let code = fields.next()?;
                let kind = ChangeKind::from_code(code)?;
                match kind {
                    ChangeKind::Renamed | ChangeKind::Copied => {
                        let old_path = fields.next()?.to_string();
                        let path = fields.next()?.to_string();
                        Some(ChangedFile { kind, path, old_path: Some(old_path) })
                    }
                    _ => {
                        let path = fields.next()?.to_string();
                        Some(ChangedFile { kind, path, old_path: None })
                    }
                }
            })
            .collect()
    }

    /// `git diff --name-status <from>...<to>` (three-dot: diff against the
    /// merge base) when `three_dot` is true, else the plain two-dot form.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if either revision is invalid.
    pub async fn diff_name_status(
        &self,
        from: &str,
        to: &str,
        three_dot: bool,
    ) -> MetaDataResult<Vec<ChangedFile>> {
        let range = if three_dot { format!("{from}...{to}") } else { format!("{from}..{to}") };
        let raw = self.run(&["diff", "--name-status", &range]).await?;
        Ok(Self::parse_name_status(&raw))
    }

    /// `git status --porcelain`: uncommitted changes in the working tree.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if the invocation fails.
    pub async fn status_porcelain(&self) -> MetaDataResult<Vec<ChangedFile>> {
        let raw = self.run(&["status", "--porcelain"]).await?;
        Ok(raw
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                let (code, rest) = line.split_at(line.char_indices().nth(2)?.0);
                let path = rest.trim().to_string();
                let status_char = code.trim().chars().next().unwrap_or('M');
                let kind = match status_char {
                    '?' | 'A' => ChangeKind::Added,
                    'D' => ChangeKind::Deleted,
                    'R' => ChangeKind::Renamed,
                    'C' => ChangeKind::Copied,
                    _ => ChangeKind::Modified,
                };
                if matches!(kind, ChangeKind::Renamed | ChangeKind::Copied) {
                    let mut parts = path.splitn(2, " -> ");
                    let old_path = parts.next()?.to_string();
                    let new_path = parts.next()?.to_string();
                    Some(ChangedFile { kind, path: new_path, old_path: Some(old_path) })
                } else {
                    Some(ChangedFile { kind, path, old_path: None })
                }
            })
            .collect())
    }

    /// `git ls-files`: everything currently tracked.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if the invocation fails.
    pub async fn ls_files(&self) -> MetaDataResult<Vec<String>> {
        let raw = self.run(&["ls-files"]).await?;
        Ok(raw.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    /// `git ls-tree -r --name-only <rev>`: files tracked at a revision.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if `rev` doesn't resolve.
    pub async fn ls_tree(&self, rev: &str) -> MetaDataResult<Vec<String>> {
        let raw = self.run(&["ls-tree", "-r", "--name-only", rev]).await?;
        Ok(raw.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    /// `git show <rev>:<path>`: file content at a revision.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if the path doesn't exist at `rev`.
    pub async fn show(&self, rev: &str, path: &str) -> MetaDataResult<String> {
        self.run(&["show", &format!("{rev}:{path}")]).await
    }

    /// Union of the committed diff since `base_revision` (three-dot, against
    /// the merge base) and the uncommitted working-tree status, per spec
    /// §4.5: "Uncommitted changes are unioned with committed diff."
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if `base_revision` doesn't resolve.
    pub async fn enumerate_changes(&self, base_revision: &str) -> MetaDataResult<ChangeSet> {
        let head = self.rev_parse("HEAD").await?;
        let mut set = ChangeSet::default();

        if base_revision != head {
            for file in self.diff_name_status(base_revision, "HEAD", true).await? {
                set.absorb(file);
            }
        }
        for file in self.status_porcelain().await? {
            set.absorb(file);
        }
        Ok(set)
    }

    /// Detect the repository's current identity: branch, HEAD commit, and
    /// working-tree cleanliness.
    ///
    /// # Errors
    /// Returns [`MetaDataError::Git`] if any underlying `git` invocation
    /// fails (e.g. an unborn HEAD with no commits yet).
    pub async fn repository_context(&self) -> MetaDataResult<RepositoryContext> {
        let commit_sha = self.rev_parse("HEAD").await.ok();
        let branch = self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await.unwrap_or_else(|_| "HEAD".to_string());

        let commit_message = if commit_sha.is_some() {
            self.run(&["log", "-1", "--format=%B"]).await.ok()
        } else {
            None
        };
        let author = if commit_sha.is_some() {
            self.run(&["log", "-1", "--format=%an"]).await.ok()
        } else {
            None
        };
        let commit_date = if commit_sha.is_some() {
            self.run(&["log", "-1", "--format=%at"])
                .await
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        } else {
            None
        };

        let status = self.status_porcelain().await.unwrap_or_default();
        let is_dirty = !status.is_empty();

        let (repository_id, repository_url) = self.repository_identity().await;

        Ok(RepositoryContext {
            repository_id,
            repository_url,
            branch,
            commit_sha,
            commit_message,
            commit_date,
            author,
            is_dirty,
            root_path: self.repo_root.clone(),
        })
    }

    async fn repository_identity(&self) -> (String, Option<String>) {
        for remote in ["origin", "upstream"] {
            if let Ok(url) = self.run(&["remote", "get-url", remote]).await
                && !url.is_empty()
            {
                return (normalize_git_url(&url), Some(url));
            }
        }
        let dir_name = self
            .repo_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        (dir_name, None)
    }
}

/// Normalize a git remote URL (SSH or HTTPS) into a stable `host/owner/repo`
/// identity string.
fn normalize_git_url(url: &str) -> String {
    let trimmed = url.trim_end_matches(".git");
    if let Some(rest) = trimmed.strip_prefix("git@") {
        rest.replacen(':', "/", 1)
    } else if let Some(rest) = trimmed.strip_prefix("https://") {
        rest.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        rest.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    async fn init_repo() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        let run = |args: &[&str]| {
            StdCommand::new("git").arg("-C").arg(dir.path()).args(args).output().expect("git")
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);
        dir
    }

    #[tokio::test]
    async fn discover_finds_repo_root() {
        let dir = init_repo().await;
        let detector = GitChangeDetector::discover(dir.path()).await.expect("discover");
        assert_eq!(
            std::fs::canonicalize(&detector.repo_root).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn discover_fails_outside_a_repository() {
        let dir = TempDir::new().expect("tempdir");
        let result = GitChangeDetector::discover(dir.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_porcelain_reports_new_files() {
        let dir = init_repo().await;
        std::fs::write(dir.path().join("b.txt"), "new").unwrap();
        let detector = GitChangeDetector::discover(dir.path()).await.unwrap();
        let status = detector.status_porcelain().await.unwrap();
        assert!(status.iter().any(|f| f.path == "b.txt" && f.kind == ChangeKind::Added));
    }

    #[tokio::test]
    async fn enumerate_changes_unions_committed_and_uncommitted() {
        let dir = init_repo().await;
        let detector = GitChangeDetector::discover(dir.path()).await.unwrap();
        let head = detector.rev_parse("HEAD").await.unwrap();

        std::fs::write(dir.path().join("c.txt"), "dirty").unwrap();
        let changes = detector.enumerate_changes(&head).await.unwrap();
        assert!(changes.added.contains(&"c.txt".to_string()));
    }

    #[test]
    fn normalize_git_url_handles_ssh_and_https() {
        assert_eq!(normalize_git_url("git@github.com:owner/repo.git"), "github.com/owner/repo");
        assert_eq!(normalize_git_url("https://github.com/owner/repo.git"), "github.com/owner/repo");
    }
}
