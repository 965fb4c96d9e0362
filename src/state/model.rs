//! Group and view state types.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::Vendor;

/// Opaque unique identifier of a staged group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single in-progress group being authored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftGroup {
    pub files: Vec<String>,
    pub specific_context: String,
    pub commit_message: Option<String>,
    pub generating: bool,
}

/// A finalized group queued for commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedGroup {
    pub id: GroupId,
    pub files: Vec<String>,
    #[serde(default)]
    pub specific_context: String,
    pub commit_message: String,
}

/// Partial update of a staged group; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedGroupUpdate {
    pub specific_context: Option<String>,
    pub commit_message: Option<String>,
    pub files: Option<Vec<String>>,
}

/// Where a generated message is written back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupTarget {
    Draft,
    Staged(GroupId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum View {
    #[default]
    FileSelection,
    Group,
    ReviewStagedGroup,
    Settings,
}

/// What the UI may show about the configured provider. Never carries the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub vendor: Vendor,
    pub model: String,
    pub api_key_configured: bool,
}

/// Immutable snapshot of everything the UI observes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub changed_files: Vec<String>,
    pub selection: BTreeSet<String>,
    pub draft: Option<DraftGroup>,
    pub staged_groups: Vec<StagedGroup>,
    pub general_context: String,
    pub provider: ProviderSummary,
    pub view: View,
    /// Staged group currently under review.
    pub reviewing: Option<GroupId>,
}

impl AppState {
    pub fn staged_group(&self, id: &GroupId) -> Option<&StagedGroup> {
        self.staged_groups.iter().find(|g| &g.id == id)
    }

    /// Every path claimed by some staged group.
    pub fn claimed_files(&self) -> BTreeSet<&str> {
        self.staged_groups
            .iter()
            .flat_map(|g| g.files.iter().map(String::as_str))
            .collect()
    }

    /// Changed files not yet claimed by any staged group.
    pub fn unclaimed_files(&self) -> Vec<&str> {
        let claimed = self.claimed_files();
        self.changed_files
            .iter()
            .map(String::as_str)
            .filter(|f| !claimed.contains(f))
            .collect()
    }
}
