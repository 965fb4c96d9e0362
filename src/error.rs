//! Error types for groupcommit modules using thiserror.

use std::fmt;

use thiserror::Error;

use crate::llm::Vendor;

/// Shared classification of upstream failures.
///
/// Provider HTTP failures and git subprocess failures are both reduced to one
/// of these kinds before they reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    RateLimited,
    RequestTooLarge,
    ServiceUnavailable,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::RequestTooLarge => "request-too-large",
            ErrorKind::ServiceUnavailable => "service-unavailable",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Human-readable explanation of the failure class.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "authentication failed, check the configured API key",
            ErrorKind::RateLimited => "rate limit reached, wait a moment and try again",
            ErrorKind::RequestTooLarge => {
                "the request is too large for the model, try a group with fewer files"
            }
            ErrorKind::ServiceUnavailable => "the service is temporarily unavailable",
            ErrorKind::Unknown => "the request failed",
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::ServiceUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from a completion provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{vendor}: {}", .kind.user_message())]
pub struct ProviderError {
    pub vendor: Vendor,
    pub kind: ErrorKind,
    /// Raw detail (response body, transport error) for logs, not for display.
    pub detail: String,
}

impl ProviderError {
    pub fn new(vendor: Vendor, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            vendor,
            kind,
            detail: detail.into(),
        }
    }
}

/// Errors from repository reads and writes (diffs, staging, committing).
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("git is not installed or not on PATH")]
    GitNotInstalled,

    #[error("Failed to open repository: {0}")]
    OpenRepository(#[source] git2::Error),

    #[error("Failed to read working tree status: {0}")]
    Status(#[source] git2::Error),

    #[error("Failed to collect diff for {path}: {source}")]
    DiffFailed {
        path: String,
        #[source]
        source: git2::Error,
    },

    #[error("Failed to revert {path}: {reason}")]
    RevertFailed { path: String, reason: String },

    #[error("Failed to spawn git: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("git {operation} timed out after {secs} seconds")]
    Timeout { operation: String, secs: u64 },

    #[error("git {operation} failed: another git process holds the index lock")]
    IndexLocked { operation: String },

    #[error("git {operation} failed: {stderr}")]
    CommandFailed { operation: String, stderr: String },

    #[error("No files to stage")]
    NoPaths,

    #[error("Commit message is empty")]
    EmptyMessage,

    #[error("Nothing to commit (staging the group's files may have failed)")]
    NothingToCommit,
}

impl RepoError {
    /// Map into the shared failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::Timeout { .. } | RepoError::IndexLocked { .. } => {
                ErrorKind::ServiceUnavailable
            }
            _ => ErrorKind::Unknown,
        }
    }
}

/// Errors from the workspace key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read state file: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to write state file: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("Failed to serialize state: {0}")]
    SerializationFailed(#[source] serde_json::Error),

    #[error("Failed to replace state file: {0}")]
    PersistFailed(#[source] tempfile::PersistError),
}

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown provider '{0}'. Expected one of: openai, anthropic, gemini, mistral")]
    UnknownProvider(String),

    #[error("No API key configured for {vendor}. Set {env_var} or add api_key to the config file")]
    MissingApiKey { vendor: Vendor, env_var: &'static str },
}

/// Errors that fail a whole commit message generation.
///
/// Failures of a single file summary never show up here; they degrade to a
/// placeholder summary instead.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("The group has no files to describe")]
    NoFiles,

    #[error("None of the group's files have pending changes")]
    NoChanges,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read changes: {0}")]
    Diff(#[from] RepoError),

    #[error("Failed to write the commit message: {0}")]
    Synthesis(#[source] ProviderError),

    #[error("The model returned an empty commit message")]
    EmptyResponse,

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("The group being described no longer exists or has changed")]
    TargetGone,
}

/// Errors from a provider connection check.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Errors from opening a session on a repository.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display_uses_user_message() {
        let err = ProviderError::new(Vendor::Anthropic, ErrorKind::RateLimited, "429 body");
        let msg = err.to_string();
        assert!(msg.starts_with("Anthropic"));
        assert!(msg.contains("rate limit"));
        assert!(!msg.contains("429 body"));
    }

    #[test]
    fn test_only_rate_limit_and_unavailable_are_transient() {
        assert!(ErrorKind::RateLimited.is_transient());
        assert!(ErrorKind::ServiceUnavailable.is_transient());
        assert!(!ErrorKind::Auth.is_transient());
        assert!(!ErrorKind::RequestTooLarge.is_transient());
        assert!(!ErrorKind::Unknown.is_transient());
    }

    #[test]
    fn test_repo_error_kind_mapping() {
        let timeout = RepoError::Timeout {
            operation: "commit".into(),
            secs: 60,
        };
        assert_eq!(timeout.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(RepoError::NothingToCommit.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_missing_api_key_names_env_var() {
        let err = ConfigError::MissingApiKey {
            vendor: Vendor::Gemini,
            env_var: "GEMINI_API_KEY",
        };
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
