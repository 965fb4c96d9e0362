//! Configuration file and environment overrides.
//!
//! ```toml
//! provider = "anthropic"
//!
//! [providers.anthropic]
//! model = "claude-3-5-sonnet-latest"
//! max_tokens = 200000
//! ```

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::generate::TokenBudget;
use crate::llm::http::request_timeout;
use crate::llm::{CompletionSettings, Vendor};
use crate::state::ProviderSummary;

pub const PROVIDER_ENV_VAR: &str = "GROUPCOMMIT_PROVIDER";
pub const MODEL_ENV_VAR: &str = "GROUPCOMMIT_MODEL";

const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Vendor,
    pub providers: HashMap<Vendor, ProviderConfig>,
    /// Where to keep persisted state instead of `<git_dir>/groupcommit`.
    pub state_dir: Option<PathBuf>,
    /// Per-file diff cap in characters.
    pub max_diff_chars: Option<usize>,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: Option<String>,
    /// Prompt budget in tokens.
    pub max_tokens: Option<usize>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    /// `<config_dir>/groupcommit/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("groupcommit").join("config.toml"))
    }

    /// Load from `path` (which must exist) or from the default location (which may not),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `GROUPCOMMIT_PROVIDER` and `GROUPCOMMIT_MODEL`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(provider) = non_empty_env(PROVIDER_ENV_VAR) {
            self.provider = provider.parse()?;
        }
        if let Some(model) = non_empty_env(MODEL_ENV_VAR) {
            self.providers.entry(self.provider).or_default().model = Some(model);
        }
        Ok(())
    }

    fn provider_config(&self, vendor: Vendor) -> ProviderConfig {
        self.providers.get(&vendor).cloned().unwrap_or_default()
    }

    pub fn model(&self, vendor: Vendor) -> String {
        self.provider_config(vendor)
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| vendor.default_model().to_string())
    }

    pub fn base_url(&self, vendor: Vendor) -> Option<String> {
        self.provider_config(vendor).base_url
    }

    /// API key from the vendor's environment variable, then the config file.
    pub fn api_key(&self, vendor: Vendor) -> Option<String> {
        non_empty_env(vendor.api_key_env()).or_else(|| {
            self.provider_config(vendor)
                .api_key
                .filter(|k| !k.trim().is_empty())
        })
    }

    /// See [`request_timeout`] for how the environment overrides the file.
    pub fn request_timeout(&self, vendor: Vendor) -> Duration {
        request_timeout(self.provider_config(vendor).timeout_secs)
    }

    pub fn token_budget(&self, vendor: Vendor) -> TokenBudget {
        TokenBudget::new(
            self.provider_config(vendor)
                .max_tokens
                .unwrap_or_else(|| vendor.default_max_tokens()),
        )
    }

    /// Settings for a provider call. Fails before any call when no key is configured.
    pub fn completion_settings(&self, vendor: Vendor) -> Result<CompletionSettings, ConfigError> {
        let api_key = self.api_key(vendor).ok_or(ConfigError::MissingApiKey {
            vendor,
            env_var: vendor.api_key_env(),
        })?;
        let provider = self.provider_config(vendor);
        Ok(CompletionSettings {
            model: self.model(vendor),
            temperature: provider.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_output_tokens: provider
                .max_output_tokens
                .unwrap_or_else(|| vendor.default_max_output_tokens()),
            api_key,
        })
    }

    pub fn provider_summary(&self) -> ProviderSummary {
        ProviderSummary {
            vendor: self.provider,
            model: self.model(self.provider),
            api_key_configured: self.api_key(self.provider).is_some(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
