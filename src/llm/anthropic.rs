//! Anthropic messages API client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProviderError};
use crate::llm::http::{classify_status, send_json};
use crate::llm::provider::{Completion, CompletionProvider, CompletionSettings, Vendor};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
}

impl AnthropicProvider {
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

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError> {
        let body = MessagesRequest {
            model: &settings.model,
            max_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let response: MessagesResponse =
            send_json(Vendor::Anthropic, request, classify_anthropic_status).await?;

        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        let tokens_used = response.usage.and_then(|u| match (u.input_tokens, u.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
        });

        Ok(Completion { text, tokens_used })
    }
}

/// 529 is Anthropic's "overloaded" status.
fn classify_anthropic_status(status: StatusCode, body: &str) -> ErrorKind {
    if status.as_u16() == 529 || body.contains("overloaded_error") {
        return ErrorKind::ServiceUnavailable;
    }
    if body.contains("rate_limit_error") {
        return ErrorKind::RateLimited;
    }
    if body.contains("authentication_error") || body.contains("permission_error") {
        return ErrorKind::Auth;
    }
    classify_status(status, body)
}
