//! The single owner of selection, draft, and staged-group state.
//!
//! Every mutator publishes a fresh [`AppState`] snapshot on a watch channel.
//! Rejected transitions leave state unchanged and return `false` / `None`.
//! Persistence is best-effort: a failed write is logged and the in-memory
//! state stays authoritative.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::model::{
    AppState, DraftGroup, GroupId, GroupTarget, ProviderSummary, StagedGroup, StagedGroupUpdate,
    View,
};
use crate::state::store::{
    decode_staged_groups, encode_staged_groups, StateStore, GENERAL_CONTEXT_KEY,
    STAGED_GROUPS_KEY,
};

pub struct GroupStateMachine {
    store: Box<dyn StateStore>,
    state: AppState,
    tx: watch::Sender<Arc<AppState>>,
}

impl GroupStateMachine {
    /// Load persisted groups and general context from `store`.
    ///
    /// Invalid persisted groups (empty, unmessaged, duplicate, or overlapping)
    /// are repaired and the repaired list is written back.
    pub fn load(store: Box<dyn StateStore>) -> Self {
        let groups = match store.get(STAGED_GROUPS_KEY) {
            Ok(Some(value)) => decode_staged_groups(value),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to load staged groups, starting empty: {}", e);
                Vec::new()
            }
        };
        let (staged_groups, repaired) = repair_groups(groups);

        let general_context = match store.get(GENERAL_CONTEXT_KEY) {
            Ok(Some(value)) => value.as_str().unwrap_or_default().to_string(),
            Ok(None) => String::new(),
            Err(e) => {
                warn!("Failed to load general context: {}", e);
                String::new()
            }
        };

        let state = AppState {
            staged_groups,
            general_context,
            ..Default::default()
        };
        let (tx, _) = watch::channel(Arc::new(state.clone()));
        let machine = Self { store, state, tx };

        if repaired {
            info!("Repaired persisted staged groups");
            machine.persist_groups();
        }
        machine
    }

    /// Receive a snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.tx.subscribe()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<AppState> {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Replace the changed-file snapshot and prune everything that referenced
    /// files which no longer have changes.
    pub fn refresh_changed_files(&mut self, files: Vec<String>) {
        let files = dedup(files);
        let present: BTreeSet<&str> = files.iter().map(String::as_str).collect();

        self.state.selection.retain(|p| present.contains(p.as_str()));

        if let Some(draft) = &mut self.state.draft {
            draft.files.retain(|p| present.contains(p.as_str()));
            if draft.files.is_empty() {
                info!("Draft group lost all its files, discarding it");
                self.state.draft = None;
                if self.state.view == View::Group {
                    self.state.view = View::FileSelection;
                }
            }
        }

        let mut groups_changed = false;
        let mut removed = Vec::new();
        for group in &mut self.state.staged_groups {
            let before = group.files.len();
            group.files.retain(|p| present.contains(p.as_str()));
            if group.files.len() != before {
                groups_changed = true;
            }
            if group.files.is_empty() {
                removed.push(group.id.clone());
            }
        }
        for id in &removed {
            warn!("Staged group {} has no remaining changes, unstaging it", id);
            self.state.staged_groups.retain(|g| &g.id != id);
            self.stop_reviewing(id);
        }

        self.state.changed_files = files;
        if groups_changed {
            self.persist_groups();
        }
        self.publish();
    }

    /// Add or remove `path` from the selection. Unknown paths are ignored.
    pub fn toggle_selection(&mut self, path: &str) -> bool {
        if !self.state.changed_files.iter().any(|f| f == path) {
            debug!("Ignoring selection of unknown path {}", path);
            self.publish();
            return false;
        }
        if !self.state.selection.remove(path) {
            self.state.selection.insert(path.to_string());
        }
        self.publish();
        true
    }

    pub fn clear_selection(&mut self) {
        self.state.selection.clear();
        self.publish();
    }

    /// Start a draft from `paths`, excluding files already in a staged group.
    ///
    /// Replaces an existing draft unless that draft is generating.
    pub fn start_group(&mut self, paths: &[String]) -> bool {
        if self.state.draft.as_ref().is_some_and(|d| d.generating) {
            warn!("A message is being generated for the current draft, not replacing it");
            self.publish();
            return false;
        }

        let files: Vec<String> = {
            let claimed = self.state.claimed_files();
            dedup(paths.to_vec())
                .into_iter()
                .filter(|p| !claimed.contains(p.as_str()))
                .filter(|p| self.state.changed_files.contains(p))
                .collect()
        };

        if files.is_empty() {
            info!("No unstaged changed files among the selection, not starting a group");
            self.publish();
            return false;
        }

        self.state.draft = Some(DraftGroup {
            files,
            ..Default::default()
        });
        self.state.selection.clear();
        self.state.reviewing = None;
        self.state.view = View::Group;
        self.publish();
        true
    }

    /// Turn the draft into a staged group.
    ///
    /// Requires a draft with at least one unclaimed file and a non-blank message.
    pub fn stage_draft(&mut self) -> Option<GroupId> {
        let draft = self.state.draft.as_ref()?;
        let message = draft
            .commit_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())?
            .to_string();

        let files: Vec<String> = {
            let claimed = self.state.claimed_files();
            draft
                .files
                .iter()
                .filter(|p| !claimed.contains(p.as_str()))
                .cloned()
                .collect()
        };
        if files.is_empty() {
            return None;
        }

        let group = StagedGroup {
            id: GroupId::new(),
            files,
            specific_context: draft.specific_context.clone(),
            commit_message: message,
        };
        let id = group.id.clone();
        info!("Staged group {} with {} file(s)", id, group.files.len());

        self.state.staged_groups.push(group);
        self.state.draft = None;
        self.state.view = View::FileSelection;
        self.persist_groups();
        self.publish();
        Some(id)
    }

    pub fn unstage(&mut self, id: &GroupId) -> bool {
        let before = self.state.staged_groups.len();
        self.state.staged_groups.retain(|g| &g.id != id);
        if self.state.staged_groups.len() == before {
            return false;
        }
        self.stop_reviewing(id);
        self.persist_groups();
        self.publish();
        true
    }

    /// Merge a partial update into a staged group.
    ///
    /// A blank message is dropped from the update. `files` are deduplicated and
    /// stripped of paths claimed by other groups; if nothing is left the field
    /// is dropped rather than emptying the group.
    pub fn update_staged_group(&mut self, id: &GroupId, update: StagedGroupUpdate) -> bool {
        let Some(index) = self.state.staged_groups.iter().position(|g| &g.id == id) else {
            return false;
        };

        let files = update.files.and_then(|files| {
            let claimed_elsewhere: BTreeSet<&str> = self
                .state
                .staged_groups
                .iter()
                .filter(|g| &g.id != id)
                .flat_map(|g| g.files.iter().map(String::as_str))
                .collect();
            let files: Vec<String> = dedup(files)
                .into_iter()
                .filter(|p| !claimed_elsewhere.contains(p.as_str()))
                .filter(|p| self.state.changed_files.contains(p))
                .collect();
            if files.is_empty() {
                warn!("Ignoring file update that would leave group {} empty", id);
                None
            } else {
                Some(files)
            }
        });

        let group = &mut self.state.staged_groups[index];
        if let Some(context) = update.specific_context {
            group.specific_context = context;
        }
        match update.commit_message.as_deref().map(str::trim) {
            Some("") => warn!("Ignoring blank commit message for group {}", id),
            Some(message) => group.commit_message = message.to_string(),
            None => {}
        }
        if let Some(files) = files {
            group.files = files;
        }

        self.persist_groups();
        self.publish();
        true
    }

    /// Remove one file; removing the last file unstages the group.
    pub fn remove_file_from_staged_group(&mut self, id: &GroupId, path: &str) -> bool {
        let Some(group) = self.state.staged_groups.iter_mut().find(|g| &g.id == id) else {
            return false;
        };
        let before = group.files.len();
        group.files.retain(|p| p != path);
        if group.files.len() == before {
            return false;
        }
        if group.files.is_empty() {
            return self.unstage(id);
        }
        self.persist_groups();
        self.publish();
        true
    }

    /// Remove a group after it was committed.
    pub fn remove_group_by_id(&mut self, id: &GroupId) -> bool {
        let before = self.state.staged_groups.len();
        self.state.staged_groups.retain(|g| &g.id != id);
        let removed = self.state.staged_groups.len() != before;
        self.stop_reviewing(id);
        self.persist_groups();
        self.publish();
        removed
    }

    pub fn set_draft_context(&mut self, context: &str) -> bool {
        let Some(draft) = &mut self.state.draft else {
            return false;
        };
        draft.specific_context = context.to_string();
        self.publish();
        true
    }

    /// Set the draft message. A blank message clears it.
    pub fn set_draft_message(&mut self, message: &str) -> bool {
        let Some(draft) = &mut self.state.draft else {
            return false;
        };
        draft.commit_message = if message.trim().is_empty() {
            None
        } else {
            Some(message.to_string())
        };
        self.publish();
        true
    }

    pub fn set_draft_generating(&mut self, generating: bool) -> bool {
        let Some(draft) = &mut self.state.draft else {
            return false;
        };
        draft.generating = generating;
        self.publish();
        true
    }

    /// Drop the draft and return to file selection. Rejected while generating.
    pub fn discard_draft(&mut self) -> bool {
        match &self.state.draft {
            None => return false,
            Some(d) if d.generating => {
                warn!("Cannot discard the draft while its message is being generated");
                return false;
            }
            Some(_) => {}
        }
        self.state.draft = None;
        if self.state.view == View::Group {
            self.state.view = View::FileSelection;
        }
        self.publish();
        true
    }

    /// Write a generated message back to its target.
    ///
    /// A draft target only accepts the message if its file list still equals
    /// `files`, the list the generation was started with.
    pub fn apply_generated_message(
        &mut self,
        target: &GroupTarget,
        files: &[String],
        message: &str,
    ) -> bool {
        let message = message.trim();
        if message.is_empty() {
            return false;
        }
        match target {
            GroupTarget::Draft => {
                let Some(draft) = &mut self.state.draft else {
                    return false;
                };
                if draft.files != files {
                    warn!("Draft files changed during generation, discarding the message");
                    return false;
                }
                draft.commit_message = Some(message.to_string());
                self.publish();
                true
            }
            GroupTarget::Staged(id) => {
                let Some(group) = self.state.staged_groups.iter_mut().find(|g| &g.id == id)
                else {
                    return false;
                };
                group.commit_message = message.to_string();
                self.persist_groups();
                self.publish();
                true
            }
        }
    }

    pub fn set_general_context(&mut self, context: &str) {
        self.state.general_context = context.to_string();
        if let Err(e) = self
            .store
            .set(GENERAL_CONTEXT_KEY, serde_json::Value::from(context))
        {
            warn!("Failed to persist general context: {}", e);
        }
        self.publish();
    }

    pub fn set_provider_summary(&mut self, summary: ProviderSummary) {
        self.state.provider = summary;
        self.publish();
    }

    pub fn open_settings(&mut self) -> bool {
        if self.state.view != View::FileSelection {
            return false;
        }
        self.state.view = View::Settings;
        self.publish();
        true
    }

    pub fn close_settings(&mut self) -> bool {
        if self.state.view != View::Settings {
            return false;
        }
        self.state.view = View::FileSelection;
        self.publish();
        true
    }

    /// Open a staged group for review. Discards the draft unless it is generating.
    pub fn review_staged_group(&mut self, id: &GroupId) -> bool {
        if self.state.staged_group(id).is_none() {
            return false;
        }
        if self.state.draft.as_ref().is_some_and(|d| d.generating) {
            warn!("Cannot leave the draft while its message is being generated");
            return false;
        }
        self.state.draft = None;
        self.state.reviewing = Some(id.clone());
        self.state.view = View::ReviewStagedGroup;
        self.publish();
        true
    }

    /// Return to file selection from the group or review view.
    pub fn back_to_selection(&mut self) -> bool {
        match self.state.view {
            View::Group => self.discard_draft(),
            View::ReviewStagedGroup => {
                self.state.reviewing = None;
                self.state.view = View::FileSelection;
                self.publish();
                true
            }
            View::Settings => self.close_settings(),
            View::FileSelection => false,
        }
    }

    fn stop_reviewing(&mut self, id: &GroupId) {
        if self.state.reviewing.as_ref() == Some(id) {
            self.state.reviewing = None;
            if self.state.view == View::ReviewStagedGroup {
                self.state.view = View::FileSelection;
            }
        }
    }

    fn persist_groups(&self) {
        let result = encode_staged_groups(&self.state.staged_groups)
            .and_then(|value| self.store.set(STAGED_GROUPS_KEY, value));
        if let Err(e) = result {
            warn!("Failed to persist staged groups: {}", e);
        }
    }

    fn publish(&self) {
        self.tx.send_replace(Arc::new(self.state.clone()));
    }
}

/// Remove duplicates, keeping first occurrences in order.
fn dedup(paths: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Enforce group invariants on loaded data. Returns whether anything changed.
fn repair_groups(groups: Vec<StagedGroup>) -> (Vec<StagedGroup>, bool) {
    let mut claimed = BTreeSet::new();
    let mut ids = BTreeSet::new();
    let mut changed = false;
    let mut repaired = Vec::with_capacity(groups.len());

    for mut group in groups {
        if !ids.insert(group.id.clone()) {
            warn!("Dropping persisted group with duplicate id {}", group.id);
            changed = true;
            continue;
        }
        let before = group.files.len();
        group.files = dedup(group.files)
            .into_iter()
            .filter(|p| !claimed.contains(p))
            .collect();
        if group.files.len() != before {
            changed = true;
        }
        if group.files.is_empty() || group.commit_message.trim().is_empty() {
            warn!("Dropping invalid persisted group {}", group.id);
            changed = true;
            continue;
        }
        claimed.extend(group.files.iter().cloned());
        repaired.push(group);
    }
    (repaired, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::MemoryStore;

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn machine_with(changed: &[&str]) -> GroupStateMachine {
        let mut machine = GroupStateMachine::load(Box::new(MemoryStore::new()));
        machine.refresh_changed_files(files(changed));
        machine
    }

    fn stage(machine: &mut GroupStateMachine, paths: &[&str], message: &str) -> GroupId {
        assert!(machine.start_group(&files(paths)));
        machine.set_draft_message(message);
        machine.stage_draft().unwrap()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        assert_eq!(dedup(files(&["b", "a", "b", "c", "a"])), files(&["b", "a", "c"]));
    }

    #[test]
    fn test_repair_drops_invalid_and_overlapping_groups() {
        let group = |id: &str, paths: &[&str], msg: &str| StagedGroup {
            id: GroupId::from(id),
            files: files(paths),
            specific_context: String::new(),
            commit_message: msg.into(),
        };
        let (groups, changed) = repair_groups(vec![
            group("g1", &["a", "a", "b"], "one"),
            group("g2", &["b"], "two"),
            group("g3", &["c"], "   "),
            group("g1", &["d"], "dup"),
            group("g4", &["b", "e"], "four"),
        ]);
        assert!(changed);
        let ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g4"]);
        assert_eq!(groups[0].files, files(&["a", "b"]));
        assert_eq!(groups[1].files, files(&["e"]));
    }

    #[test]
    fn test_repair_of_valid_groups_is_unchanged() {
        let groups = vec![StagedGroup {
            id: GroupId::from("g"),
            files: files(&["a"]),
            specific_context: String::new(),
            commit_message: "m".into(),
        }];
        let (repaired, changed) = repair_groups(groups.clone());
        assert!(!changed);
        assert_eq!(repaired, groups);
    }

    #[test]
    fn test_toggle_unknown_path_is_ignored() {
        let mut machine = machine_with(&["a.rs"]);
        assert!(!machine.toggle_selection("zzz.rs"));
        assert!(machine.state().selection.is_empty());
    }

    #[test]
    fn test_ignored_toggle_still_publishes() {
        let mut machine = machine_with(&["a.rs"]);
        let mut rx = machine.subscribe();

        assert!(!machine.toggle_selection("zzz.rs"));

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().selection.is_empty());
    }

    #[test]
    fn test_toggle_is_symmetric() {
        let mut machine = machine_with(&["a.rs"]);
        machine.toggle_selection("a.rs");
        assert!(machine.state().selection.contains("a.rs"));
        machine.toggle_selection("a.rs");
        assert!(machine.state().selection.is_empty());
    }

    #[test]
    fn test_start_group_with_only_claimed_files_fails() {
        let mut machine = machine_with(&["a.rs", "b.rs"]);
        stage(&mut machine, &["a.rs"], "feat: a");
        let before = machine.state().clone();

        assert!(!machine.start_group(&files(&["a.rs"])));
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_start_group_replaces_idle_draft_but_not_generating_one() {
        let mut machine = machine_with(&["a.rs", "b.rs"]);
        machine.start_group(&files(&["a.rs"]));
        assert!(machine.start_group(&files(&["b.rs"])));
        assert_eq!(machine.state().draft.as_ref().unwrap().files, files(&["b.rs"]));

        machine.set_draft_generating(true);
        assert!(!machine.start_group(&files(&["a.rs"])));
        assert_eq!(machine.state().draft.as_ref().unwrap().files, files(&["b.rs"]));
    }

    #[test]
    fn test_stage_draft_without_message_is_rejected() {
        let mut machine = machine_with(&["a.rs"]);
        machine.start_group(&files(&["a.rs"]));
        machine.set_draft_message("   \n");
        let draft_before = machine.state().draft.clone();

        assert!(machine.stage_draft().is_none());
        assert_eq!(machine.state().draft, draft_before);
        assert!(machine.state().staged_groups.is_empty());
    }

    #[test]
    fn test_stage_draft_without_draft_is_rejected() {
        let mut machine = machine_with(&["a.rs"]);
        assert!(machine.stage_draft().is_none());
    }

    #[test]
    fn test_stage_draft_trims_message() {
        let mut machine = machine_with(&["a.rs"]);
        let id = stage(&mut machine, &["a.rs"], "  fix: x \n");
        assert_eq!(machine.state().staged_group(&id).unwrap().commit_message, "fix: x");
    }

    #[test]
    fn test_update_drops_blank_message_and_claimed_files() {
        let mut machine = machine_with(&["a.rs", "b.rs", "c.rs"]);
        let g1 = stage(&mut machine, &["a.rs"], "one");
        let g2 = stage(&mut machine, &["b.rs"], "two");

        assert!(machine.update_staged_group(
            &g2,
            StagedGroupUpdate {
                commit_message: Some("  ".into()),
                files: Some(files(&["a.rs", "c.rs", "c.rs"])),
                specific_context: Some("ctx".into()),
            }
        ));

        let group = machine.state().staged_group(&g2).unwrap();
        assert_eq!(group.commit_message, "two");
        assert_eq!(group.files, files(&["c.rs"]));
        assert_eq!(group.specific_context, "ctx");
        assert_eq!(
            machine.state().staged_group(&g1).unwrap().files,
            files(&["a.rs"])
        );
    }

    #[test]
    fn test_update_that_would_empty_files_keeps_them() {
        let mut machine = machine_with(&["a.rs", "b.rs"]);
        let g1 = stage(&mut machine, &["a.rs"], "one");
        let g2 = stage(&mut machine, &["b.rs"], "two");

        machine.update_staged_group(
            &g2,
            StagedGroupUpdate {
                files: Some(files(&["a.rs"])),
                ..Default::default()
            },
        );
        assert_eq!(machine.state().staged_group(&g2).unwrap().files, files(&["b.rs"]));

        machine.update_staged_group(
            &g1,
            StagedGroupUpdate {
                files: Some(vec![]),
                ..Default::default()
            },
        );
        assert_eq!(machine.state().staged_group(&g1).unwrap().files, files(&["a.rs"]));
    }

    #[test]
    fn test_update_unknown_group_is_rejected() {
        let mut machine = machine_with(&["a.rs"]);
        assert!(!machine.update_staged_group(&GroupId::from("nope"), StagedGroupUpdate::default()));
    }

    #[test]
    fn test_unstage_while_reviewing_returns_to_selection() {
        let mut machine = machine_with(&["a.rs"]);
        let id = stage(&mut machine, &["a.rs"], "m");
        assert!(machine.review_staged_group(&id));
        assert_eq!(machine.state().view, View::ReviewStagedGroup);

        assert!(machine.unstage(&id));
        assert_eq!(machine.state().view, View::FileSelection);
        assert_eq!(machine.state().reviewing, None);
        assert!(!machine.unstage(&id));
    }

    #[test]
    fn test_review_and_group_views_exclude_each_other() {
        let mut machine = machine_with(&["a.rs", "b.rs"]);
        let id = stage(&mut machine, &["a.rs"], "m");

        machine.start_group(&files(&["b.rs"]));
        assert!(machine.review_staged_group(&id));
        assert!(machine.state().draft.is_none());

        machine.start_group(&files(&["b.rs"]));
        assert_eq!(machine.state().view, View::Group);
        assert_eq!(machine.state().reviewing, None);
    }

    #[test]
    fn test_settings_only_from_file_selection() {
        let mut machine = machine_with(&["a.rs"]);
        assert!(machine.open_settings());
        assert_eq!(machine.state().view, View::Settings);
        assert!(machine.close_settings());
        assert_eq!(machine.state().view, View::FileSelection);

        machine.start_group(&files(&["a.rs"]));
        assert!(!machine.open_settings());
    }

    #[test]
    fn test_back_to_selection_discards_idle_draft() {
        let mut machine = machine_with(&["a.rs"]);
        machine.start_group(&files(&["a.rs"]));
        assert!(machine.back_to_selection());
        assert!(machine.state().draft.is_none());
        assert_eq!(machine.state().view, View::FileSelection);
    }

    #[test]
    fn test_discard_rejected_while_generating() {
        let mut machine = machine_with(&["a.rs"]);
        machine.start_group(&files(&["a.rs"]));
        machine.set_draft_generating(true);
        assert!(!machine.discard_draft());
        assert!(machine.state().draft.is_some());
    }

    #[test]
    fn test_apply_generated_message_checks_draft_files() {
        let mut machine = machine_with(&["a.rs", "b.rs"]);
        machine.start_group(&files(&["a.rs"]));

        assert!(!machine.apply_generated_message(&GroupTarget::Draft, &files(&["b.rs"]), "m"));
        assert_eq!(machine.state().draft.as_ref().unwrap().commit_message, None);

        assert!(machine.apply_generated_message(&GroupTarget::Draft, &files(&["a.rs"]), " m \n"));
        assert_eq!(
            machine.state().draft.as_ref().unwrap().commit_message.as_deref(),
            Some("m")
        );
    }

    #[test]
    fn test_apply_generated_message_to_staged_group() {
        let mut machine = machine_with(&["a.rs"]);
        let id = stage(&mut machine, &["a.rs"], "old");
        assert!(machine.apply_generated_message(&GroupTarget::Staged(id.clone()), &[], "new"));
        assert_eq!(machine.state().staged_group(&id).unwrap().commit_message, "new");
        assert!(!machine.apply_generated_message(
            &GroupTarget::Staged(GroupId::from("gone")),
            &[],
            "x"
        ));
    }

    #[test]
    fn test_refresh_prunes_draft_and_selection() {
        let mut machine = machine_with(&["a.rs", "b.rs", "c.rs"]);
        machine.toggle_selection("c.rs");
        machine.start_group(&files(&["a.rs", "b.rs"]));
        machine.toggle_selection("c.rs");

        machine.refresh_changed_files(files(&["b.rs"]));
        assert_eq!(machine.state().draft.as_ref().unwrap().files, files(&["b.rs"]));
        assert!(machine.state().selection.is_empty());

        machine.refresh_changed_files(vec![]);
        assert!(machine.state().draft.is_none());
        assert_eq!(machine.state().view, View::FileSelection);
    }

    #[test]
    fn test_every_mutation_publishes_a_snapshot() {
        let mut machine = machine_with(&["a.rs"]);
        let mut rx = machine.subscribe();
        assert!(!rx.has_changed().unwrap());

        machine.toggle_selection("a.rs");
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().selection.contains("a.rs"));

        machine.refresh_changed_files(files(&["a.rs"]));
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_snapshot_is_detached_from_later_mutations() {
        let mut machine = machine_with(&["a.rs"]);
        let before = machine.snapshot();
        machine.toggle_selection("a.rs");
        assert!(before.selection.is_empty());
        assert!(machine.snapshot().selection.contains("a.rs"));
    }
}
