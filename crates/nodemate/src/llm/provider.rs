//! LLM provider trait, provider identifiers, and static descriptors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::LLMError;
use super::types::{ChatResponse, ChatStream, Message};

/// Sampling temperature used when the caller has no preference.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default request timeout for provider calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Claude,
    Gemini,
    Groq,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAI,
        Provider::Claude,
        Provider::Gemini,
        Provider::Groq,
    ];

    /// Identifier used in configuration and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
        }
    }

    /// Short label used to tag errors.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Claude => "Claude",
            Provider::Gemini => "Gemini",
            Provider::Groq => "Groq",
        }
    }

    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        match self {
            Provider::OpenAI => &OPENAI,
            Provider::Claude => &CLAUDE,
            Provider::Gemini => &GEMINI,
            Provider::Groq => &GROQ,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == s)
            .ok_or_else(|| LLMError::UnsupportedProvider(s.to_string()))
    }
}

/// Static per-provider metadata.
#[derive(Debug, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub name: &'static str,
    pub base_url: &'static str,
    pub models: &'static [&'static str],
    pub default_model: &'static str,
    pub key_prefix: &'static str,
    pub max_tokens: u32,
}

impl ProviderDescriptor {
    pub fn supports(&self, model: &str) -> bool {
        self.models.contains(&model)
    }
}

static OPENAI: ProviderDescriptor = ProviderDescriptor {
    name: "OpenAI",
    base_url: "https://api.openai.com/v1",
    models: &[
        "gpt-4-turbo-preview",
        "gpt-4",
        "gpt-3.5-turbo",
        "gpt-4o",
        "gpt-4o-mini",
    ],
    default_model: "gpt-4-turbo-preview",
    key_prefix: "sk-",
    max_tokens: 4096,
};

static CLAUDE: ProviderDescriptor = ProviderDescriptor {
    name: "Anthropic Claude",
    base_url: "https://api.anthropic.com/v1",
    models: &[
        "claude-3-5-sonnet-20241022",
        "claude-3-5-haiku-20241022",
        "claude-3-opus-20240229",
        "claude-3-sonnet-20240229",
        "claude-3-haiku-20240307",
    ],
    default_model: "claude-3-5-sonnet-20241022",
    key_prefix: "sk-ant-",
    max_tokens: 4096,
};

static GEMINI: ProviderDescriptor = ProviderDescriptor {
    name: "Google Gemini",
    base_url: "https://generativelanguage.googleapis.com/v1beta",
    models: &[
        "gemini-2.5-flash",
        "gemini-2.5-flash-lite",
        "gemini-2.5-pro",
        "gemini-2.0-flash-exp",
        "gemini-1.5-pro",
        "gemini-1.5-flash",
    ],
    default_model: "gemini-2.5-flash",
    key_prefix: "AI",
    max_tokens: 8192,
};

static GROQ: ProviderDescriptor = ProviderDescriptor {
    name: "Groq",
    base_url: "https://api.groq.com/openai/v1",
    models: &[
        "llama-3.3-70b-versatile",
        "llama-3.1-70b-versatile",
        "llama-3.1-8b-instant",
        "mixtral-8x7b-32768",
        "gemma2-9b-it",
    ],
    default_model: "llama-3.3-70b-versatile",
    key_prefix: "gsk_",
    max_tokens: 8192,
};

/// Transport settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Overrides the descriptor's base URL (proxies, tests).
    pub base_url: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            base_url: None,
        }
    }
}

impl ClientOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub(crate) fn resolve_base_url(&self, provider: Provider) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| provider.descriptor().base_url.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn build_client(&self) -> Result<Client, LLMError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LLMError::Transport {
                provider: "HTTP client",
                message: e.to_string(),
            })
    }
}

/// Check a model against the provider's supported list.
pub(crate) fn select_model(provider: Provider, model: &str) -> Result<String, LLMError> {
    if provider.descriptor().supports(model) {
        Ok(model.to_string())
    } else {
        Err(LLMError::UnsupportedModel {
            provider: provider.label(),
            model: model.to_string(),
        })
    }
}

/// Capability set implemented by every backend adapter.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Currently selected model.
    fn model(&self) -> &str;

    /// Switch models. Only models from the provider's supported list are accepted.
    fn set_model(&mut self, model: &str) -> Result<(), LLMError>;

    /// Run one request/response round trip.
    async fn chat(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatResponse, LLMError>;

    /// Same request as [`chat`](Self::chat), delivered as incremental text fragments.
    async fn stream(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ChatStream, LLMError>;

    /// Probe the credential with a minimal request. Never fails; any error is `false`.
    async fn validate_key(&self) -> bool;

    fn supported_models(&self) -> Vec<String> {
        self.provider()
            .descriptor()
            .models
            .iter()
            .map(|m| m.to_string())
            .collect()
    }
}
