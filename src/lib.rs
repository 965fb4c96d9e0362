//! groupcommit - Split uncommitted changes into separately described commits.
//!
//! # Overview
//!
//! Changed files are selected into a draft group, described with an
//! LLM-generated commit message, and staged as a group. Staged groups are
//! persisted per repository and committed one by one, so a failing group
//! never blocks the others.

pub mod commit;
pub mod config;
pub mod error;
pub mod generate;
pub mod git;
pub mod llm;
pub mod session;
pub mod state;

// Re-export commonly used types
pub use commit::{BatchCommitCoordinator, BatchEvent, BatchSummary};
pub use config::Config;
pub use error::{
    ConfigError, ConnectionError, ErrorKind, GenerationError, ProviderError, RepoError,
    SessionError, StoreError,
};
pub use generate::{GeneratedMessage, GenerationPipeline, GenerationProgress, GenerationRequest};
pub use git::{ChangeKind, DiffSource, FileDiff, RepositoryGateway};
pub use llm::{CompletionProvider, CompletionSettings, Vendor};
pub use session::Session;
pub use state::{AppState, GroupId, GroupStateMachine, GroupTarget, StagedGroup};
