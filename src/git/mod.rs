//! Repository access: change reading via git2, staging and committing via the git CLI.

pub mod diff;
pub mod gateway;

pub use diff::{ChangeKind, DiffSource, FileDiff, Git2DiffSource};
pub use gateway::{GitCliGateway, RepositoryGateway};
