//! OpenAI chat-completions client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProviderError};
use crate::llm::http::{classify_status, send_json};
use crate::llm::provider::{Completion, CompletionProvider, CompletionSettings, Vendor};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
}

impl OpenAiProvider {
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
impl CompletionProvider for OpenAiProvider {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }

    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError> {
        chat_completion(
            &self.client,
            Vendor::OpenAi,
            &self.base_url,
            prompt,
            settings,
            classify_openai_status,
        )
        .await
    }
}

/// OpenAI reports quota exhaustion as 429 too, but retrying never helps.
fn classify_openai_status(status: StatusCode, body: &str) -> ErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS && body.contains("insufficient_quota") {
        return ErrorKind::Auth;
    }
    classify_status(status, body)
}

// Chat-completions wire types, shared with the Mistral client.

#[derive(Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoiceMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ChatUsage {
    pub total_tokens: Option<u64>,
}

/// POST `{base_url}/chat/completions` with a single user message.
pub(crate) async fn chat_completion<C>(
    client: &Client,
    vendor: Vendor,
    base_url: &str,
    prompt: &str,
    settings: &CompletionSettings,
    classify: C,
) -> Result<Completion, ProviderError>
where
    C: Fn(StatusCode, &str) -> ErrorKind,
{
    let body = ChatRequest {
        model: &settings.model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature: settings.temperature,
        max_tokens: settings.max_output_tokens,
    };

    let request = client
        .post(format!("{}/chat/completions", base_url))
        .bearer_auth(&settings.api_key)
        .json(&body);

    let response: ChatResponse = send_json(vendor, request, classify).await?;

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::new(vendor, ErrorKind::Unknown, "response had no choices"))?;

    Ok(Completion {
        text,
        tokens_used: response.usage.and_then(|u| u.total_tokens),
    })
}
