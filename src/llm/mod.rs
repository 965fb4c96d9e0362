//! LLM vendor clients behind a single completion contract.

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod mistral;
pub mod openai;
pub mod provider;
pub mod retry;

pub use provider::{
    Completion, CompletionProvider, CompletionSettings, ProviderClient, RetryingProvider, Vendor,
};
pub use retry::RetryPolicy;
