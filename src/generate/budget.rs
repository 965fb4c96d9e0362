//! Token budget estimation.
//!
//! The estimate is advisory. Providers stay the authority on context-length
//! errors, which come back as [`ErrorKind::RequestTooLarge`](crate::error::ErrorKind).

/// Rough characters-per-token ratio used for estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Percent of the configured maximum usable by the prompt; the rest is left for the response.
pub const PROMPT_SHARE_PERCENT: usize = 95;

/// Marker appended to text cut to fit the budget.
pub const BUDGET_MARKER: &str = "\n... [truncated to fit the model's context]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    max_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// `ceil(chars / 4)`.
    pub fn estimate_tokens(text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    /// `floor(max_tokens * 0.95)`.
    pub fn prompt_limit(&self) -> usize {
        let (hundreds, rest) = (self.max_tokens / 100, self.max_tokens % 100);
        hundreds * PROMPT_SHARE_PERCENT + rest * PROMPT_SHARE_PERCENT / 100
    }

    pub fn fits(&self, prompt: &str) -> bool {
        Self::estimate_tokens(prompt) <= self.prompt_limit()
    }

    /// Characters available to variable content once `overhead_tokens` are spent.
    pub fn available_chars(&self, overhead_tokens: usize) -> usize {
        self.prompt_limit()
            .saturating_sub(overhead_tokens)
            .saturating_mul(CHARS_PER_TOKEN)
    }

    /// Cut `text` so that it plus `overhead_tokens` stays within the prompt limit.
    ///
    /// Returns the (possibly shortened) text and whether it was cut.
    pub fn truncate_to_fit(&self, text: &str, overhead_tokens: usize) -> (String, bool) {
        let available = self.available_chars(overhead_tokens);
        if text.chars().count() <= available {
            return (text.to_string(), false);
        }
        let keep = available.saturating_sub(BUDGET_MARKER.chars().count());
        let mut cut: String = text.chars().take(keep).collect();
        cut.push_str(BUDGET_MARKER);
        (cut, true)
    }
}
