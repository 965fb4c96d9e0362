//! Committing every staged group, one at a time.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::git::{DiffSource, RepositoryGateway};
use crate::state::{GroupId, GroupStateMachine, StagedGroup};

/// Events emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started { total: usize },
    GroupCommitted { id: GroupId, sha: String },
    GroupFailed { id: GroupId, error: String },
    Finished { success_count: usize, failure_count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFailure {
    pub id: GroupId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<GroupFailure>,
}

pub struct BatchCommitCoordinator<'a> {
    gateway: &'a dyn RepositoryGateway,
    diffs: &'a dyn DiffSource,
    events: Option<UnboundedSender<BatchEvent>>,
}

impl<'a> BatchCommitCoordinator<'a> {
    pub fn new(gateway: &'a dyn RepositoryGateway, diffs: &'a dyn DiffSource) -> Self {
        Self {
            gateway,
            diffs,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Stage and commit each staged group in order.
    ///
    /// A failing group stays staged and the batch moves on. Committed groups
    /// are removed from `machine`. The changed-file list is refreshed at the end.
    pub async fn commit_all(&self, machine: &mut GroupStateMachine) -> BatchSummary {
        let groups: Vec<StagedGroup> = machine.state().staged_groups.clone();
        self.emit(BatchEvent::Started {
            total: groups.len(),
        });

        let mut summary = BatchSummary::default();
        for group in &groups {
            match self.commit_group(group).await {
                Ok(sha) => {
                    info!("Committed group {} as {}", group.id, short_sha(&sha));
                    machine.remove_group_by_id(&group.id);
                    summary.success_count += 1;
                    self.emit(BatchEvent::GroupCommitted {
                        id: group.id.clone(),
                        sha,
                    });
                }
                Err(message) => {
                    warn!("Failed to commit group {}: {}", group.id, message);
                    summary.failure_count += 1;
                    summary.failures.push(GroupFailure {
                        id: group.id.clone(),
                        message: message.clone(),
                    });
                    self.emit(BatchEvent::GroupFailed {
                        id: group.id.clone(),
                        error: message,
                    });
                }
            }
        }

        self.emit(BatchEvent::Finished {
            success_count: summary.success_count,
            failure_count: summary.failure_count,
        });

        match self.diffs.list_changed_files().await {
            Ok(files) => machine.refresh_changed_files(files),
            Err(e) => warn!("Failed to refresh changed files after commit: {}", e),
        }

        summary
    }

    async fn commit_group(&self, group: &StagedGroup) -> Result<String, String> {
        let paths = self.paths_to_commit(group).await;
        if let Err(e) = self.gateway.stage(&paths).await {
            self.restore_index(group, &paths).await;
            return Err(e.to_string());
        }
        match self.gateway.commit(&group.commit_message, &paths).await {
            Ok(sha) => Ok(sha),
            Err(e) => {
                self.restore_index(group, &paths).await;
                Err(e.to_string())
            }
        }
    }

    /// The group's files plus the source path of any rename among them.
    ///
    /// A rename is listed under its new path only, so the deletion of the old
    /// path has to travel with it.
    async fn paths_to_commit(&self, group: &StagedGroup) -> Vec<String> {
        let mut paths = group.files.clone();
        match self.diffs.get_diffs(&group.files).await {
            Ok(diffs) => {
                for old in diffs.into_iter().filter_map(|d| d.old_path) {
                    if !paths.contains(&old) {
                        paths.push(old);
                    }
                }
            }
            Err(e) => warn!(
                "Could not look up renames for group {}, committing listed files only: {}",
                group.id, e
            ),
        }
        paths
    }

    /// Unstage a failed group's files so they do not leak into the next commit.
    async fn restore_index(&self, group: &StagedGroup, paths: &[String]) {
        if let Err(e) = self.gateway.unstage(paths).await {
            warn!(
                "Failed to unstage files of group {} after a failed commit: {}",
                group.id, e
            );
        }
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
