//! Mistral client (chat-completions compatible).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::{ErrorKind, ProviderError};
use crate::llm::http::{classify_status, mentions_context_length};
use crate::llm::openai::chat_completion;
use crate::llm::provider::{Completion, CompletionProvider, CompletionSettings, Vendor};

const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

pub struct MistralProvider {
    client: Client,
    base_url: String,
}

impl MistralProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for MistralProvider {
    fn vendor(&self) -> Vendor {
        Vendor::Mistral
    }

    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError> {
        chat_completion(
            &self.client,
            Vendor::Mistral,
            &self.base_url,
            prompt,
            settings,
            classify_mistral_status,
        )
        .await
    }
}

/// Mistral rejects oversized prompts with 422 rather than 400.
fn classify_mistral_status(status: StatusCode, body: &str) -> ErrorKind {
    if status == StatusCode::UNPROCESSABLE_ENTITY && mentions_context_length(body) {
        return ErrorKind::RequestTooLarge;
    }
    classify_status(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprocessable_with_length_message_is_too_large() {
        let body = r#"{"message":"Prompt contains 40000 tokens, too many tokens for model"}"#;
        assert_eq!(
            classify_mistral_status(StatusCode::UNPROCESSABLE_ENTITY, body),
            ErrorKind::RequestTooLarge
        );
        assert_eq!(
            classify_mistral_status(StatusCode::UNPROCESSABLE_ENTITY, "{}"),
            ErrorKind::Unknown
        );
    }
}
