//! The process-wide context: one state machine plus the services it talks to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::commit::{BatchCommitCoordinator, BatchEvent, BatchSummary};
use crate::config::Config;
use crate::error::{ConfigError, ConnectionError, GenerationError, RepoError, SessionError};
use crate::generate::{
    GeneratedMessage, GenerationPipeline, GenerationProgress, GenerationRequest, TokenBudget,
};
use crate::git::{DiffSource, Git2DiffSource, GitCliGateway, RepositoryGateway};
use crate::llm::{CompletionProvider, CompletionSettings, ProviderClient, RetryPolicy, Vendor};
use crate::state::{AppState, GroupStateMachine, GroupTarget, JsonFileStore, StateStore};

pub struct Session {
    machine: GroupStateMachine,
    diffs: Box<dyn DiffSource>,
    gateway: Box<dyn RepositoryGateway>,
    provider: Box<dyn CompletionProvider>,
    /// `None` when no API key is configured for the provider.
    settings: Option<CompletionSettings>,
    budget: TokenBudget,
}

impl Session {
    pub fn new(
        machine: GroupStateMachine,
        diffs: Box<dyn DiffSource>,
        gateway: Box<dyn RepositoryGateway>,
        provider: Box<dyn CompletionProvider>,
        settings: Option<CompletionSettings>,
        budget: TokenBudget,
    ) -> Self {
        Self {
            machine,
            diffs,
            gateway,
            provider,
            settings,
            budget,
        }
    }

    /// Open the repository containing `start` and wire up the configured provider.
    pub async fn open(start: &Path, config: &Config) -> Result<Self, SessionError> {
        let mut diffs = Git2DiffSource::discover(start)?;
        if let Some(max) = config.max_diff_chars {
            diffs = diffs.with_max_diff_chars(max);
        }
        let gateway = GitCliGateway::new(diffs.root())?;

        let store: Box<dyn StateStore> = match &config.state_dir {
            Some(dir) => Box::new(JsonFileStore::new(
                dir.join(workspace_key(diffs.root())).join("state.json"),
            )),
            None => Box::new(JsonFileStore::for_git_dir(diffs.git_dir())),
        };
        let mut machine = GroupStateMachine::load(store);
        machine.set_provider_summary(config.provider_summary());

        let vendor = config.provider;
        let provider = ProviderClient::for_vendor(
            vendor,
            config.base_url(vendor).as_deref(),
            config.request_timeout(vendor),
        )?
        .with_retry(RetryPolicy::default());
        let settings = match config.completion_settings(vendor) {
            Ok(s) => Some(s),
            Err(e) => {
                debug!("{}", e);
                None
            }
        };
        info!(
            "Opened {} with {} ({})",
            diffs.root().display(),
            vendor,
            config.model(vendor)
        );

        let mut session = Self::new(
            machine,
            Box::new(diffs),
            Box::new(gateway),
            Box::new(provider),
            settings,
            config.token_budget(vendor),
        );
        session.refresh().await?;
        Ok(session)
    }

    pub fn state(&self) -> &AppState {
        self.machine.state()
    }

    pub fn machine(&self) -> &GroupStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut GroupStateMachine {
        &mut self.machine
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.machine.subscribe()
    }

    pub fn vendor(&self) -> Vendor {
        self.provider.vendor()
    }

    fn settings(&self) -> Result<&CompletionSettings, ConfigError> {
        let vendor = self.provider.vendor();
        self.settings.as_ref().ok_or(ConfigError::MissingApiKey {
            vendor,
            env_var: vendor.api_key_env(),
        })
    }

    /// Re-read the changed-file list from the repository.
    pub async fn refresh(&mut self) -> Result<(), RepoError> {
        let files = self.diffs.list_changed_files().await?;
        self.machine.refresh_changed_files(files);
        Ok(())
    }

    /// Generate a message for `target` and write it back.
    ///
    /// A draft is marked as generating for the duration of the run. Nothing is
    /// written back once `cancel` fires.
    pub async fn generate(
        &mut self,
        target: GroupTarget,
        cancel: &CancellationToken,
        progress: Option<UnboundedSender<GenerationProgress>>,
    ) -> Result<GeneratedMessage, GenerationError> {
        let settings = self.settings()?.clone();
        let request = self.request_for(&target)?;

        let is_draft = target == GroupTarget::Draft;
        if is_draft && !self.machine.set_draft_generating(true) {
            return Err(GenerationError::TargetGone);
        }

        let mut pipeline = GenerationPipeline::new(
            self.provider.as_ref(),
            self.diffs.as_ref(),
            &settings,
            self.budget,
        );
        if let Some(tx) = progress {
            pipeline = pipeline.with_progress(tx);
        }
        let result = pipeline.run(&request, cancel).await;

        if is_draft {
            self.machine.set_draft_generating(false);
        }
        let generated = result?;
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        if !self
            .machine
            .apply_generated_message(&target, &request.files, &generated.message)
        {
            return Err(GenerationError::TargetGone);
        }
        Ok(generated)
    }

    fn request_for(&self, target: &GroupTarget) -> Result<GenerationRequest, GenerationError> {
        let state = self.machine.state();
        let (files, specific_context) = match target {
            GroupTarget::Draft => {
                let draft = state.draft.as_ref().ok_or(GenerationError::TargetGone)?;
                (draft.files.clone(), draft.specific_context.clone())
            }
            GroupTarget::Staged(id) => {
                let group = state.staged_group(id).ok_or(GenerationError::TargetGone)?;
                (group.files.clone(), group.specific_context.clone())
            }
        };
        Ok(GenerationRequest {
            files,
            general_context: state.general_context.clone(),
            specific_context,
        })
    }

    /// Commit every staged group. See [`BatchCommitCoordinator::commit_all`].
    pub async fn commit_all(&mut self, events: Option<UnboundedSender<BatchEvent>>) -> BatchSummary {
        let mut coordinator =
            BatchCommitCoordinator::new(self.gateway.as_ref(), self.diffs.as_ref());
        if let Some(tx) = events {
            coordinator = coordinator.with_events(tx);
        }
        coordinator.commit_all(&mut self.machine).await
    }

    /// Discard pending changes to `path`, then refresh.
    pub async fn revert(&mut self, path: &str) -> Result<(), RepoError> {
        self.diffs.revert(path).await?;
        info!("Reverted {}", path);
        self.refresh().await
    }

    pub async fn test_connection(&self) -> Result<(), ConnectionError> {
        let settings = self.settings()?;
        self.provider.test_connection(settings).await?;
        Ok(())
    }
}

/// Directory name for a repository's state under a shared `state_dir`.
fn workspace_key(root: &Path) -> PathBuf {
    let key: String = root
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    PathBuf::from(key.trim_matches('-'))
}
