//! Reading pending changes from the working tree using git2.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{
    build::CheckoutBuilder, Commit, Diff, DiffFindOptions, DiffFormat, DiffOptions, ErrorCode,
    Repository, Status, StatusOptions, Tree,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RepoError;

/// Maximum characters of diff text kept per file.
pub const DEFAULT_MAX_DIFF_CHARS: usize = 10_000;

/// Appended to diff text that hit the cap.
pub const TRUNCATION_MARKER: &str = "\n... [diff truncated]";

/// How a file changed relative to HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
        }
    }
}

/// One file's pending change, with capped diff text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub kind: ChangeKind,
    pub content: String,
    /// Previous path for renames.
    pub old_path: Option<String>,
    /// Whether `content` was cut at the cap.
    pub truncated: bool,
}

/// Read access to repository change state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiffSource: Send + Sync {
    /// Repo-relative paths of every file with pending changes, sorted.
    async fn list_changed_files(&self) -> Result<Vec<String>, RepoError>;

    /// Diffs for `paths`, in the given order. Paths without changes are skipped.
    async fn get_diffs(&self, paths: &[String]) -> Result<Vec<FileDiff>, RepoError>;

    /// Discard all pending changes to `path`.
    async fn revert(&self, path: &str) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
struct StatusInfo {
    kind: ChangeKind,
    old_path: Option<String>,
}

/// [`DiffSource`] backed by libgit2.
#[derive(Debug, Clone)]
pub struct Git2DiffSource {
    root: PathBuf,
    git_dir: PathBuf,
    max_diff_chars: usize,
}

impl Git2DiffSource {
    /// Find the repository containing `start`.
    pub fn discover(start: &Path) -> Result<Self, RepoError> {
        let repo = Repository::discover(start).map_err(RepoError::OpenRepository)?;
        let root = repo
            .workdir()
            .ok_or_else(|| {
                RepoError::OpenRepository(git2::Error::from_str(
                    "bare repositories have no working tree",
                ))
            })?
            .to_path_buf();
        Ok(Self {
            root,
            git_dir: repo.path().to_path_buf(),
            max_diff_chars: DEFAULT_MAX_DIFF_CHARS,
        })
    }

    pub fn with_max_diff_chars(mut self, max: usize) -> Self {
        self.max_diff_chars = max;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn open(&self) -> Result<Repository, RepoError> {
        Repository::open(&self.root).map_err(RepoError::OpenRepository)
    }
}

#[async_trait]
impl DiffSource for Git2DiffSource {
    async fn list_changed_files(&self) -> Result<Vec<String>, RepoError> {
        let repo = self.open()?;
        Ok(collect_statuses(&repo)?.into_keys().collect())
    }

    async fn get_diffs(&self, paths: &[String]) -> Result<Vec<FileDiff>, RepoError> {
        let repo = self.open()?;
        let statuses = collect_statuses(&repo)?;
        let head_tree = resolve_head_tree(&repo)?;

        let mut diffs = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(info) = statuses.get(path) else {
                debug!("No pending changes for {}, skipping", path);
                continue;
            };
            let (content, truncated) =
                diff_text_for(&repo, head_tree.as_ref(), path, info, self.max_diff_chars)?;
            diffs.push(FileDiff {
                path: path.clone(),
                kind: info.kind,
                content,
                old_path: info.old_path.clone(),
                truncated,
            });
        }
        Ok(diffs)
    }

    async fn revert(&self, path: &str) -> Result<(), RepoError> {
        let repo = self.open()?;
        revert_path(&repo, &self.root, path)
    }
}

/// Resolve the HEAD tree, distinguishing an unborn branch from real failures.
fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, RepoError> {
    resolve_head_commit(repo)?
        .map(|c| c.tree())
        .transpose()
        .map_err(RepoError::Status)
}

fn resolve_head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, RepoError> {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(RepoError::Status(e)),
    };
    let commit = head_ref.peel_to_commit().map_err(RepoError::Status)?;
    Ok(Some(commit))
}

/// Map every changed path to its kind, sorted by path.
fn collect_statuses(repo: &Repository) -> Result<BTreeMap<String, StatusInfo>, RepoError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .renames_head_to_index(true)
        .renames_index_to_workdir(true);

    let statuses = repo.statuses(Some(&mut opts)).map_err(RepoError::Status)?;

    let mut map = BTreeMap::new();
    for entry in statuses.iter() {
        let status = entry.status();
        if status.is_empty() || status.contains(Status::IGNORED) {
            continue;
        }

        let new_path = entry
            .head_to_index()
            .and_then(|d| d.new_file().path().map(path_string))
            .or_else(|| {
                entry
                    .index_to_workdir()
                    .and_then(|d| d.new_file().path().map(path_string))
            })
            .or_else(|| entry.path().map(str::to_string));
        let Some(path) = new_path else { continue };

        let kind = classify(status);
        let old_path = if kind == ChangeKind::Renamed {
            entry
                .head_to_index()
                .or_else(|| entry.index_to_workdir())
                .and_then(|d| d.old_file().path().map(path_string))
                .filter(|old| *old != path)
        } else {
            None
        };

        map.insert(path, StatusInfo { kind, old_path });
    }
    Ok(map)
}

fn classify(status: Status) -> ChangeKind {
    if status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED) {
        ChangeKind::Renamed
    } else if status.intersects(Status::WT_NEW | Status::INDEX_NEW) {
        ChangeKind::Added
    } else if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
        ChangeKind::Deleted
    } else {
        ChangeKind::Modified
    }
}

fn path_string(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

/// Diff HEAD against the working tree (through the index) for one path.
fn diff_text_for(
    repo: &Repository,
    head_tree: Option<&Tree<'_>>,
    path: &str,
    info: &StatusInfo,
    max_chars: usize,
) -> Result<(String, bool), RepoError> {
    let diff_failed = |source| RepoError::DiffFailed {
        path: path.to_string(),
        source,
    };

    let mut opts = DiffOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true)
        .disable_pathspec_match(true)
        .pathspec(path);
    if let Some(old) = &info.old_path {
        opts.pathspec(old.as_str());
    }

    let mut diff = repo
        .diff_tree_to_workdir_with_index(head_tree, Some(&mut opts))
        .map_err(diff_failed)?;

    if info.old_path.is_some() {
        let mut find = DiffFindOptions::new();
        find.renames(true).for_untracked(true);
        diff.find_similar(Some(&mut find)).map_err(diff_failed)?;
    }

    Ok(render_capped(&diff, max_chars))
}

/// Render a diff as patch text, stopping at `max_chars` and appending a marker.
fn render_capped(diff: &Diff<'_>, max_chars: usize) -> (String, bool) {
    let mut text = String::new();
    let mut truncated = false;

    if let Err(e) = diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if truncated {
            return true;
        }

        let content = String::from_utf8_lossy(line.content());
        let origin = line.origin();
        let prefix_len = usize::from(matches!(origin, '+' | '-' | ' '));

        if text.len() + content.len() + prefix_len > max_chars {
            truncated = true;
            return true;
        }

        if prefix_len == 1 {
            text.push(origin);
        }
        text.push_str(&content);
        true
    }) {
        warn!("Failed to render diff text: {e}");
    }

    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    (text, truncated)
}

/// Restore `path` to its HEAD state, deleting it if HEAD does not have it.
fn revert_path(repo: &Repository, root: &Path, path: &str) -> Result<(), RepoError> {
    let failed = |reason: String| RepoError::RevertFailed {
        path: path.to_string(),
        reason,
    };

    let statuses = collect_statuses(repo)?;
    let Some(info) = statuses.get(path) else {
        debug!("{} has no pending changes, nothing to revert", path);
        return Ok(());
    };

    let mut paths = vec![path.to_string()];
    if let Some(old) = &info.old_path {
        paths.push(old.clone());
    }

    let head = resolve_head_commit(repo)?;
    match &head {
        Some(commit) => repo
            .reset_default(Some(commit.as_object()), paths.iter().map(String::as_str))
            .map_err(|e| failed(e.message().to_string()))?,
        None => {
            let mut index = repo.index().map_err(|e| failed(e.message().to_string()))?;
            for p in &paths {
                // Absent entries are fine; the file may be untracked.
                let _ = index.remove_path(Path::new(p));
            }
            index.write().map_err(|e| failed(e.message().to_string()))?;
        }
    }

    let head_tree = head
        .as_ref()
        .map(|c| c.tree())
        .transpose()
        .map_err(|e| failed(e.message().to_string()))?;

    for p in &paths {
        let in_head = head_tree
            .as_ref()
            .is_some_and(|tree| tree.get_path(Path::new(p)).is_ok());

        if in_head {
            let mut checkout = CheckoutBuilder::new();
            checkout.force().path(p.as_str());
            repo.checkout_head(Some(&mut checkout))
                .map_err(|e| failed(e.message().to_string()))?;
        } else {
            let full = root.join(p);
            if full.is_file() {
                std::fs::remove_file(&full).map_err(|e| failed(e.to_string()))?;
            }
        }
    }

    debug!("Reverted {}", path);
    Ok(())
}
