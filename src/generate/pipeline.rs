//! Two-phase commit message generation.
//!
//! Phase one summarizes each file's diff independently; a failed summary
//! degrades to a placeholder. Phase two synthesizes one message from the
//! ordered summaries; its failure fails the run.

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GenerationError;
use crate::generate::budget::TokenBudget;
use crate::generate::prompt::{
    build_summary_prompt, build_synthesis_prompt, clean_message, sanitize_diff,
};
use crate::git::{DiffSource, FileDiff};
use crate::llm::{CompletionProvider, CompletionSettings};

/// Output ceiling for a single file summary.
pub const SUMMARY_MAX_OUTPUT_TOKENS: u32 = 256;

/// Output ceiling for the synthesized commit message.
pub const SYNTHESIS_MAX_OUTPUT_TOKENS: u32 = 500;

/// Summary text used when a file could not be summarized.
pub fn placeholder_summary(path: &str) -> String {
    format!("Could not summarize changes for {}.", path)
}

/// Progress events emitted during a run. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationProgress {
    Started { total: usize },
    /// `index` is 1-based.
    Summarizing { index: usize, total: usize, path: String },
    Synthesizing,
    Finished { success: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub files: Vec<String>,
    pub general_context: String,
    pub specific_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: String,
    pub summary: String,
    /// True when `summary` is the placeholder for a failed call.
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMessage {
    pub message: String,
    pub summaries: Vec<FileSummary>,
    /// Sum of provider-reported usage; `None` when no call reported any.
    pub tokens_used: Option<u64>,
    /// Whether any diff or summary was cut upstream or to fit the budget.
    pub truncated: bool,
}

pub struct GenerationPipeline<'a> {
    provider: &'a dyn CompletionProvider,
    diffs: &'a dyn DiffSource,
    settings: &'a CompletionSettings,
    budget: TokenBudget,
    progress: Option<UnboundedSender<GenerationProgress>>,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(
        provider: &'a dyn CompletionProvider,
        diffs: &'a dyn DiffSource,
        settings: &'a CompletionSettings,
        budget: TokenBudget,
    ) -> Self {
        Self {
            provider,
            diffs,
            settings,
            budget,
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: UnboundedSender<GenerationProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Generate one commit message for `request.files`.
    ///
    /// Cancellation is observed before each provider call and while one is in
    /// flight; a cancelled run returns [`GenerationError::Cancelled`] and never
    /// a message.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GeneratedMessage, GenerationError> {
        if request.files.is_empty() {
            return Err(GenerationError::NoFiles);
        }

        self.emit(GenerationProgress::Started {
            total: request.files.len(),
        });
        let result = self.run_phases(request, cancel).await;
        self.emit(GenerationProgress::Finished {
            success: result.is_ok(),
        });
        result
    }

    async fn run_phases(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GeneratedMessage, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let diffs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            diffs = self.diffs.get_diffs(&request.files) => diffs?,
        };
        if diffs.is_empty() {
            return Err(GenerationError::NoChanges);
        }

        let mut tokens = TokenTally::default();
        let mut truncated = diffs.iter().any(|d| d.truncated);

        let total = diffs.len();
        let mut summaries = Vec::with_capacity(total);
        for (i, diff) in diffs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            self.emit(GenerationProgress::Summarizing {
                index: i + 1,
                total,
                path: diff.path.clone(),
            });

            let (summary, cut) = self
                .summarize(diff, &request.general_context, cancel, &mut tokens)
                .await?;
            truncated |= cut;
            summaries.push(summary);
        }

        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        self.emit(GenerationProgress::Synthesizing);

        let (fitted, cut) = self.fit_summaries(
            &summaries,
            &request.general_context,
            &request.specific_context,
        );
        truncated |= cut;
        let prompt = build_synthesis_prompt(
            &fitted,
            &request.general_context,
            &request.specific_context,
        );

        let settings = self
            .settings
            .with_output_ceiling(SYNTHESIS_MAX_OUTPUT_TOKENS);
        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            result = self.provider.complete(&prompt, &settings) => {
                result.map_err(GenerationError::Synthesis)?
            }
        };
        tokens.add(completion.tokens_used);

        // A late cancel still wins over a finished synthesis.
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let message = clean_message(&completion.text);
        if message.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        info!(
            "Generated commit message for {} file(s){}",
            summaries.len(),
            if truncated { " (input truncated)" } else { "" }
        );

        Ok(GeneratedMessage {
            message,
            summaries,
            tokens_used: tokens.total,
            truncated,
        })
    }

    /// Summarize one file. Provider failures become the placeholder.
    async fn summarize(
        &self,
        diff: &FileDiff,
        general_context: &str,
        cancel: &CancellationToken,
        tokens: &mut TokenTally,
    ) -> Result<(FileSummary, bool), GenerationError> {
        let overhead = TokenBudget::estimate_tokens(&build_summary_prompt(
            &diff.path,
            diff.kind,
            "",
            general_context,
        ));
        let (content, cut) = self
            .budget
            .truncate_to_fit(&sanitize_diff(&diff.content), overhead);
        if cut {
            debug!("Diff for {} cut to fit the token budget", diff.path);
        }
        let prompt = build_summary_prompt(&diff.path, diff.kind, &content, general_context);

        let settings = self.settings.with_output_ceiling(SUMMARY_MAX_OUTPUT_TOKENS);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            result = self.provider.complete(&prompt, &settings) => result,
        };

        let summary = match outcome {
            Ok(completion) => {
                tokens.add(completion.tokens_used);
                let text = completion.text.trim();
                if text.is_empty() {
                    warn!("Empty summary for {}, using placeholder", diff.path);
                    placeholder(&diff.path)
                } else {
                    FileSummary {
                        path: diff.path.clone(),
                        summary: collapse_lines(text),
                        placeholder: false,
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Failed to summarize {}: {} ({})",
                    diff.path, e, e.detail
                );
                placeholder(&diff.path)
            }
        };
        Ok((summary, cut))
    }

    /// Shorten summaries evenly when the synthesis prompt would exceed the budget.
    fn fit_summaries(
        &self,
        summaries: &[FileSummary],
        general_context: &str,
        specific_context: &str,
    ) -> (Vec<FileSummary>, bool) {
        let full = build_synthesis_prompt(summaries, general_context, specific_context);
        if self.budget.fits(&full) {
            return (summaries.to_vec(), false);
        }

        let skeleton: Vec<FileSummary> = summaries
            .iter()
            .map(|s| FileSummary {
                summary: String::new(),
                ..s.clone()
            })
            .collect();
        let overhead = TokenBudget::estimate_tokens(&build_synthesis_prompt(
            &skeleton,
            general_context,
            specific_context,
        ));
        let per_file = self.budget.available_chars(overhead) / summaries.len().max(1);
        warn!(
            "Summaries exceed the token budget, keeping {} characters per file",
            per_file
        );

        let fitted = summaries
            .iter()
            .map(|s| FileSummary {
                summary: s.summary.chars().take(per_file).collect(),
                ..s.clone()
            })
            .collect();
        (fitted, true)
    }

    fn emit(&self, event: GenerationProgress) {
        if let Some(tx) = &self.progress {
            // The receiver may be gone; progress is advisory.
            let _ = tx.send(event);
        }
    }
}

fn placeholder(path: &str) -> FileSummary {
    FileSummary {
        path: path.to_string(),
        summary: placeholder_summary(path),
        placeholder: true,
    }
}

/// Keep each summary on one `- path: summary` line in the synthesis prompt.
fn collapse_lines(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Default)]
struct TokenTally {
    total: Option<u64>,
}

impl TokenTally {
    fn add(&mut self, used: Option<u64>) {
        if let Some(n) = used {
            self.total = Some(self.total.unwrap_or(0) + n);
        }
    }
}
