//! Google Gemini generateContent client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProviderError};
use crate::llm::http::{classify_status, send_json};
use crate::llm::provider::{Completion, CompletionProvider, CompletionSettings, Vendor};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

impl GeminiProvider {
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
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn vendor(&self) -> Vendor {
        Vendor::Gemini
    }

    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
            },
        };

        let request = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, settings.model
            ))
            .header("x-goog-api-key", &settings.api_key)
            .json(&body);

        let response: GenerateResponse =
            send_json(Vendor::Gemini, request, classify_gemini_status).await?;

        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::new(
                Vendor::Gemini,
                ErrorKind::Unknown,
                "response had no candidates (the prompt may have been blocked)",
            )
        })?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(Completion {
            text,
            tokens_used: response.usage_metadata.and_then(|u| u.total_token_count),
        })
    }
}

/// Gemini answers a bad key with 400 `API_KEY_INVALID` and quota with `RESOURCE_EXHAUSTED`.
fn classify_gemini_status(status: StatusCode, body: &str) -> ErrorKind {
    if body.contains("API_KEY_INVALID") || body.contains("API key not valid") {
        return ErrorKind::Auth;
    }
    if body.contains("RESOURCE_EXHAUSTED") {
        return ErrorKind::RateLimited;
    }
    if body.contains("UNAVAILABLE") {
        return ErrorKind::ServiceUnavailable;
    }
    classify_status(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_on_bad_request_is_auth() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        assert_eq!(
            classify_gemini_status(StatusCode::BAD_REQUEST, body),
            ErrorKind::Auth
        );
    }

    #[test]
    fn test_resource_exhausted_is_rate_limited() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_gemini_status(StatusCode::TOO_MANY_REQUESTS, body),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn test_response_without_usage_metadata_parses() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"docs: a"},{"text":"b"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.usage_metadata.is_none());
        assert_eq!(parsed.candidates.len(), 1);
    }
}
