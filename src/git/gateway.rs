//! Staging and committing by shelling out to the system `git` binary.
//!
//! Uses the user's git config, hooks, and signing setup as-is.

use std::env;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::RepoError;

/// Default timeout for a single git invocation.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variable to override the default timeout.
pub const TIMEOUT_ENV_VAR: &str = "GROUPCOMMIT_GIT_TIMEOUT";

static NOTHING_TO_COMMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)nothing (added )?to commit|no changes added to commit")
        .expect("Invalid regex")
});

static INDEX_LOCKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"index\.lock").expect("Invalid regex"));

/// Write access to the repository index and history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Stage exactly `paths` (additions, modifications, and deletions).
    async fn stage(&self, paths: &[String]) -> Result<(), RepoError>;

    /// Remove `paths` from the index, keeping working tree contents.
    async fn unstage(&self, paths: &[String]) -> Result<(), RepoError>;

    /// Commit `paths` only and return the new commit id. Other staged entries
    /// stay in the index.
    async fn commit(&self, message: &str, paths: &[String]) -> Result<String, RepoError>;
}

/// Get the configured git timeout.
///
/// Reads `GROUPCOMMIT_GIT_TIMEOUT` (seconds); an invalid value logs a warning
/// and falls back to the default.
pub fn get_timeout() -> Duration {
    match env::var(TIMEOUT_ENV_VAR) {
        Ok(v) if !v.is_empty() => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    "Invalid {} value '{}', using default {}s",
                    TIMEOUT_ENV_VAR, v, DEFAULT_TIMEOUT_SECS
                );
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        },
        _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    }
}

/// [`RepositoryGateway`] that runs `git -C <root> ...`.
#[derive(Debug, Clone)]
pub struct GitCliGateway {
    root: PathBuf,
    timeout: Duration,
}

impl GitCliGateway {
    /// Fails with [`RepoError::GitNotInstalled`] when `git` is not on PATH.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, RepoError> {
        if which::which("git").is_err() {
            return Err(RepoError::GitNotInstalled);
        }
        Ok(Self {
            root: root.into(),
            timeout: get_timeout(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a git command, returning stdout or a classified error.
    async fn run_git(&self, args: &[&str], operation: &str) -> Result<String, RepoError> {
        debug!("git {}", args.join(" "));

        let output = timeout(
            self.timeout,
            Command::new("git")
                .arg("-C")
                .arg(&self.root)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| RepoError::Timeout {
            operation: operation.to_string(),
            secs: self.timeout.as_secs(),
        })?
        .map_err(RepoError::SpawnFailed)?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(operation, &stdout, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Those of `paths` whose index entry differs from HEAD.
    async fn staged_paths(&self, paths: &[String]) -> Result<Vec<String>, RepoError> {
        let mut args = vec!["diff", "--cached", "--no-renames", "--name-only", "-z", "--"];
        args.extend(paths.iter().map(String::as_str));
        let out = self.run_git(&args, "diff").await?;
        Ok(out
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn has_head(&self) -> bool {
        self.run_git(&["rev-parse", "--verify", "-q", "HEAD"], "rev-parse")
            .await
            .is_ok()
    }
}

/// Turn a failed git invocation into a [`RepoError`].
///
/// `git commit` prints "nothing to commit" on stdout, so both streams are checked.
fn classify_failure(operation: &str, stdout: &str, stderr: &str) -> RepoError {
    if NOTHING_TO_COMMIT.is_match(stdout) || NOTHING_TO_COMMIT.is_match(stderr) {
        return RepoError::NothingToCommit;
    }
    if INDEX_LOCKED.is_match(stderr) {
        return RepoError::IndexLocked {
            operation: operation.to_string(),
        };
    }
    let detail = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    RepoError::CommandFailed {
        operation: operation.to_string(),
        stderr: detail.to_string(),
    }
}

#[async_trait]
impl RepositoryGateway for GitCliGateway {
    async fn stage(&self, paths: &[String]) -> Result<(), RepoError> {
        if paths.is_empty() {
            return Err(RepoError::NoPaths);
        }
        // `add` rejects a pathspec that matches nothing, which is the case for
        // the source of a rename already recorded in the index.
        let (present, missing): (Vec<&String>, Vec<&String>) = paths
            .iter()
            .partition(|p| self.root.join(p.as_str()).symlink_metadata().is_ok());
        if !present.is_empty() {
            let mut args = vec!["add", "-A", "--"];
            args.extend(present.iter().map(|p| p.as_str()));
            self.run_git(&args, "add").await?;
        }
        if !missing.is_empty() {
            let mut args = vec!["rm", "--cached", "-q", "-r", "--ignore-unmatch", "--"];
            args.extend(missing.iter().map(|p| p.as_str()));
            self.run_git(&args, "rm").await?;
        }
        Ok(())
    }

    async fn unstage(&self, paths: &[String]) -> Result<(), RepoError> {
        if paths.is_empty() {
            return Ok(());
        }
        // `reset` needs a HEAD to reset to; before the first commit just drop the entries.
        let mut args = if self.has_head().await {
            vec!["reset", "-q", "HEAD", "--"]
        } else {
            vec!["rm", "--cached", "-q", "-r", "--ignore-unmatch", "--"]
        };
        args.extend(paths.iter().map(String::as_str));
        self.run_git(&args, "reset").await?;
        Ok(())
    }

    async fn commit(&self, message: &str, paths: &[String]) -> Result<String, RepoError> {
        if message.trim().is_empty() {
            return Err(RepoError::EmptyMessage);
        }
        if paths.is_empty() {
            return Err(RepoError::NoPaths);
        }
        // `--only` with no staged difference prints the status of unrelated
        // entries instead of "nothing to commit".
        let changed = self.staged_paths(paths).await?;
        if changed.is_empty() {
            return Err(RepoError::NothingToCommit);
        }
        let mut args = vec!["commit", "-q", "-m", message, "--only", "--"];
        args.extend(changed.iter().map(String::as_str));
        self.run_git(&args, "commit").await?;
        let sha = self.run_git(&["rev-parse", "HEAD"], "rev-parse").await?;
        Ok(sha.trim().to_string())
    }
}
