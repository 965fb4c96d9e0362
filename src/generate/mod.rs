//! Commit message generation from diffs.

pub mod budget;
pub mod pipeline;
pub mod prompt;

pub use budget::TokenBudget;
pub use pipeline::{
    FileSummary, GeneratedMessage, GenerationPipeline, GenerationProgress, GenerationRequest,
};
