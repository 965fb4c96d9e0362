//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use git2::{IndexAddOption, Oid, Repository, Signature};

use groupcommit::error::{ErrorKind, ProviderError, RepoError};
use groupcommit::llm::{Completion, CompletionProvider, CompletionSettings, Vendor};
use groupcommit::RepositoryGateway;

/// A test git repository builder for integration tests.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Create a new empty git repository in a temp directory.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let repo = Repository::init(dir.path()).expect("Failed to init git repo");
        {
            let mut config = repo.config().expect("Failed to open repo config");
            config
                .set_str("user.name", "Test User")
                .expect("Failed to set user.name");
            config
                .set_str("user.email", "test@example.com")
                .expect("Failed to set user.email");
        }
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the repository root, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.dir.path().join(rel)).expect("Failed to remove test file");
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(rel)).expect("Failed to read test file")
    }

    /// Stage everything in the working tree.
    pub fn add_all(&self) {
        let mut index = self.repo.index().expect("Failed to get index");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("Failed to add files");
        index.write().expect("Failed to write index");
    }

    /// Stage one path.
    pub fn add(&self, rel: &str) {
        let mut index = self.repo.index().expect("Failed to get index");
        index.add_path(Path::new(rel)).expect("Failed to add file");
        index.write().expect("Failed to write index");
    }

    /// Commit the current index. Returns the commit OID.
    pub fn commit_index(&self, message: &str) -> Oid {
        let sig = Signature::now("Test User", "test@example.com")
            .expect("Failed to create signature");
        let mut index = self.repo.index().expect("Failed to get index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        // Get parent commit if exists
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    /// Write `files`, stage everything and commit.
    pub fn commit_files(&self, files: &[(&str, &str)], message: &str) -> Oid {
        for (rel, content) in files {
            self.write(rel, content);
        }
        self.add_all();
        self.commit_index(message)
    }

    /// Commit messages from HEAD backwards.
    pub fn log_messages(&self) -> Vec<String> {
        let mut walk = self.repo.revwalk().expect("Failed to create revwalk");
        if walk.push_head().is_err() {
            return Vec::new();
        }
        walk.map(|oid| {
            let commit = self
                .repo
                .find_commit(oid.expect("Failed to walk"))
                .expect("Failed to find commit");
            commit.message().unwrap_or_default().trim().to_string()
        })
        .collect()
    }

    /// Paths changed by the HEAD commit relative to its parent.
    pub fn head_paths(&self) -> Vec<String> {
        let head = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .expect("Failed to read HEAD");
        let tree = head.tree().expect("Failed to read tree");
        let parent_tree = head.parent(0).ok().and_then(|p| p.tree().ok());
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
            .expect("Failed to diff");
        let mut paths: Vec<String> = diff
            .deltas()
            .filter_map(|d| d.new_file().path().map(|p| p.to_string_lossy().to_string()))
            .collect();
        paths.sort();
        paths
    }
}

/// Whether the git binary is available for subprocess tests.
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

pub fn test_settings() -> CompletionSettings {
    CompletionSettings {
        model: "test-model".into(),
        temperature: 0.2,
        max_output_tokens: 1024,
        api_key: "test-key".into(),
    }
}

/// A provider that replies from a script and records every prompt it sees.
///
/// Prompts containing any of the `fail_on` markers fail with `Unknown`.
/// Once the script runs out, every call replies with `fallback`.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    fail_on: Vec<String>,
    tokens_per_call: Option<u64>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            fail_on: Vec::new(),
            tokens_per_call: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies(self, replies: &[&str]) -> Self {
        *self.replies.lock().unwrap() = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on.push(marker.to_string());
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_per_call = Some(tokens);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }

    async fn complete(
        &self,
        prompt: &str,
        _settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_on.iter().any(|m| prompt.contains(m.as_str())) {
            return Err(ProviderError::new(
                Vendor::OpenAi,
                ErrorKind::Unknown,
                "scripted failure",
            ));
        }
        let text = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(Completion {
            text,
            tokens_used: self.tokens_per_call,
        })
    }
}

/// A gateway that records calls and fails commits whose message contains a marker.
#[derive(Default)]
pub struct RecordingGateway {
    pub fail_commit_on: Option<String>,
    pub calls: Mutex<Vec<String>>,
    next_sha: Mutex<u32>,
}

impl RecordingGateway {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_commit_on: Some(marker.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryGateway for RecordingGateway {
    async fn stage(&self, paths: &[String]) -> Result<(), RepoError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("stage {}", paths.join(" ")));
        Ok(())
    }

    async fn unstage(&self, paths: &[String]) -> Result<(), RepoError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("unstage {}", paths.join(" ")));
        Ok(())
    }

    async fn commit(&self, message: &str, _paths: &[String]) -> Result<String, RepoError> {
        self.calls.lock().unwrap().push(format!("commit {}", message));
        if let Some(marker) = &self.fail_commit_on {
            if message.contains(marker.as_str()) {
                return Err(RepoError::NothingToCommit);
            }
        }
        let mut next = self.next_sha.lock().unwrap();
        *next += 1;
        Ok(format!("{:040x}", *next))
    }
}
