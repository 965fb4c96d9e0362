//! Prompt construction for per-file summaries and commit message synthesis.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::generate::pipeline::FileSummary;
use crate::git::ChangeKind;

/// Maximum lines of free-text context included in a prompt.
const MAX_CONTEXT_LINES: usize = 50;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("Invalid regex"));

static INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(ignore|disregard|forget) (all )?(the )?(previous|prior|above) (instructions|prompts?|context)|you are now|new instructions:|system prompt:",
    )
    .expect("Invalid regex")
});

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{4,}").expect("Invalid regex"));

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_-]*\s*\n?([\s\S]*?)\n?```$").expect("Invalid regex"));

/// Build the phase-one prompt asking for a short summary of one file's change.
///
/// `diff_text` is passed separately so the caller can fit it to the budget.
pub fn build_summary_prompt(
    path: &str,
    kind: ChangeKind,
    diff_text: &str,
    general_context: &str,
) -> String {
    let context_section = optional_section("Project context", general_context);

    format!(
        r#"You are reviewing one file from a set of changes that will become a single git commit.
Summarize what changed in this file and why it likely changed, in 2 to 4 plain sentences.
Do not list line numbers. Do not quote the diff. Do not write a commit message.
{context_section}
## File
{path} ({kind})

## Diff
```
{diff_text}
```"#
    )
}

/// Build the phase-two prompt that turns ordered file summaries into one commit message.
pub fn build_synthesis_prompt(
    summaries: &[FileSummary],
    general_context: &str,
    specific_context: &str,
) -> String {
    let context_section = optional_section("Project context", general_context);
    let group_section = optional_section("What this change is about", specific_context);

    let summary_lines = summaries
        .iter()
        .map(|s| format!("- {}: {}", s.path, s.summary))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are writing a git commit message for a group of related file changes.
{context_section}{group_section}
## File summaries
{summary_lines}

## Rules
- First line: imperative mood, at most 72 characters, no trailing period
- If the change needs explanation, add a blank line and a short body wrapped at 72 characters
- Describe the change as a whole, not file by file
- Respond with the commit message only, no preamble and no code fences"#
    )
}

fn optional_section(title: &str, text: &str) -> String {
    let text = sanitize_context(text);
    if text.is_empty() {
        String::new()
    } else {
        format!("\n## {title}\n{text}\n")
    }
}

/// Sanitize user-written context for inclusion in a prompt.
///
/// Neutralizes code fences and limits line count on top of [`sanitize_diff`].
pub fn sanitize_context(text: &str) -> String {
    sanitize_diff(text)
        .replace("```", "'''")
        .lines()
        .take(MAX_CONTEXT_LINES)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Sanitize diff text for inclusion in a prompt.
///
/// Removes ANSI escapes and control characters, filters known injection
/// phrases, and collapses long runs of blank lines. Length is not limited
/// here; diffs arrive capped and the budget does the rest.
pub fn sanitize_diff(text: &str) -> String {
    let result = ANSI_ESCAPE.replace_all(text, "");
    let result = remove_control_chars(&result);
    let result = INJECTION.replace_all(&result, "[filtered]");
    BLANK_RUN.replace_all(&result, "\n\n\n").into_owned()
}

fn remove_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Clean raw model output into a commit message.
///
/// Trims, unwraps a surrounding code fence, and strips matching outer quotes.
pub fn clean_message(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    if let Some(caps) = FENCE.captures(&text) {
        text = caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
    }

    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim().to_string();
            break;
        }
    }

    text.trim().to_string()
}
