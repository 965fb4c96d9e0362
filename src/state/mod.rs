//! Selection, draft, and staged-group state with persistence.

pub mod machine;
pub mod model;
pub mod store;

pub use machine::GroupStateMachine;
pub use model::{
    AppState, DraftGroup, GroupId, GroupTarget, ProviderSummary, StagedGroup, StagedGroupUpdate,
    View,
};
pub use store::{JsonFileStore, MemoryStore, StateStore};
