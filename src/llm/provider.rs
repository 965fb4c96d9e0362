//! Provider contract and the closed set of vendor clients.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProviderError};
use crate::llm::anthropic::AnthropicProvider;
use crate::llm::gemini::GeminiProvider;
use crate::llm::http::build_client;
use crate::llm::mistral::MistralProvider;
use crate::llm::openai::OpenAiProvider;
use crate::llm::retry::{RetryPolicy, retry_transient};

/// Prompt used by [`CompletionProvider::test_connection`].
const PING_PROMPT: &str = "Reply with the single word OK.";

/// Supported LLM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[default]
    OpenAi,
    Anthropic,
    Gemini,
    Mistral,
}

impl Vendor {
    pub const ALL: [Vendor; 4] = [
        Vendor::OpenAi,
        Vendor::Anthropic,
        Vendor::Gemini,
        Vendor::Mistral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "OpenAI",
            Vendor::Anthropic => "Anthropic",
            Vendor::Gemini => "Gemini",
            Vendor::Mistral => "Mistral",
        }
    }

    /// Key used in config files and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Anthropic => "anthropic",
            Vendor::Gemini => "gemini",
            Vendor::Mistral => "mistral",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "OPENAI_API_KEY",
            Vendor::Anthropic => "ANTHROPIC_API_KEY",
            Vendor::Gemini => "GEMINI_API_KEY",
            Vendor::Mistral => "MISTRAL_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "gpt-4o-mini",
            Vendor::Anthropic => "claude-3-5-haiku-latest",
            Vendor::Gemini => "gemini-1.5-flash",
            Vendor::Mistral => "mistral-small-latest",
        }
    }

    /// Default prompt budget in tokens (the model's context window).
    pub fn default_max_tokens(&self) -> usize {
        match self {
            Vendor::OpenAi => 128_000,
            Vendor::Anthropic => 200_000,
            Vendor::Gemini => 1_000_000,
            Vendor::Mistral => 32_000,
        }
    }

    pub fn default_max_output_tokens(&self) -> u32 {
        match self {
            Vendor::Gemini => 2048,
            _ => 1024,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Vendor::OpenAi),
            "anthropic" | "claude" => Ok(Vendor::Anthropic),
            "gemini" | "google" => Ok(Vendor::Gemini),
            "mistral" => Ok(Vendor::Mistral),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Per-call settings handed to a provider.
#[derive(Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub api_key: String,
}

impl CompletionSettings {
    /// Same settings with a lower output ceiling.
    pub fn with_output_ceiling(&self, ceiling: u32) -> Self {
        Self {
            max_output_tokens: self.max_output_tokens.min(ceiling),
            ..self.clone()
        }
    }
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Generated text plus whatever usage the vendor reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub tokens_used: Option<u64>,
}

/// Uniform contract every vendor client satisfies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Send one prompt and return the generated text.
    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError>;

    /// Issue a minimal round-trip call to verify credentials and model.
    async fn test_connection(&self, settings: &CompletionSettings) -> Result<(), ProviderError> {
        self.complete(PING_PROMPT, &settings.with_output_ceiling(5))
            .await
            .map(|_| ())
    }
}

/// One variant per vendor, dispatched by `match` instead of by name.
pub enum ProviderClient {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
    Gemini(GeminiProvider),
    Mistral(MistralProvider),
}

/// A [`ProviderClient`] wrapped with retry on transient failures.
pub struct RetryingProvider {
    inner: ProviderClient,
    policy: RetryPolicy,
}

impl ProviderClient {
    /// Build the client for `vendor`, optionally against a non-default endpoint.
    /// Every request is abandoned after `timeout`.
    pub fn for_vendor(
        vendor: Vendor,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = build_client(vendor, timeout)?;
        let client = match vendor {
            Vendor::OpenAi => ProviderClient::OpenAi(match base_url {
                Some(url) => OpenAiProvider::with_base_url(http, url),
                None => OpenAiProvider::new(http),
            }),
            Vendor::Anthropic => ProviderClient::Anthropic(match base_url {
                Some(url) => AnthropicProvider::with_base_url(http, url),
                None => AnthropicProvider::new(http),
            }),
            Vendor::Gemini => ProviderClient::Gemini(match base_url {
                Some(url) => GeminiProvider::with_base_url(http, url),
                None => GeminiProvider::new(http),
            }),
            Vendor::Mistral => ProviderClient::Mistral(match base_url {
                Some(url) => MistralProvider::with_base_url(http, url),
                None => MistralProvider::new(http),
            }),
        };
        Ok(client)
    }

    pub fn with_retry(self, policy: RetryPolicy) -> RetryingProvider {
        RetryingProvider {
            inner: self,
            policy,
        }
    }
}

#[async_trait]
impl CompletionProvider for ProviderClient {
    fn vendor(&self) -> Vendor {
        match self {
            ProviderClient::OpenAi(_) => Vendor::OpenAi,
            ProviderClient::Anthropic(_) => Vendor::Anthropic,
            ProviderClient::Gemini(_) => Vendor::Gemini,
            ProviderClient::Mistral(_) => Vendor::Mistral,
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError> {
        match self {
            ProviderClient::OpenAi(p) => p.complete(prompt, settings).await,
            ProviderClient::Anthropic(p) => p.complete(prompt, settings).await,
            ProviderClient::Gemini(p) => p.complete(prompt, settings).await,
            ProviderClient::Mistral(p) => p.complete(prompt, settings).await,
        }
    }
}

#[async_trait]
impl CompletionProvider for RetryingProvider {
    fn vendor(&self) -> Vendor {
        self.inner.vendor()
    }

    async fn complete(
        &self,
        prompt: &str,
        settings: &CompletionSettings,
    ) -> Result<Completion, ProviderError> {
        retry_transient(&self.policy, || self.inner.complete(prompt, settings)).await
    }

    async fn test_connection(&self, settings: &CompletionSettings) -> Result<(), ProviderError> {
        // Connection checks report the first failure as-is.
        self.inner.test_connection(settings).await
    }
}
