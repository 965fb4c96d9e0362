//! Committing staged groups.

pub mod batch;

pub use batch::{BatchCommitCoordinator, BatchEvent, BatchSummary, GroupFailure};
