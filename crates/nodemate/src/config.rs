use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::context::PackageManager;
use crate::llm::{ClientOptions, Provider};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "NODEMATE_CONFIG";

/// Lower bound for `request_timeout_seconds`. A zero deadline would fail
/// every request before it is sent.
pub const MIN_REQUEST_TIMEOUT_SECONDS: u64 = 1;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub providers: BTreeMap<Provider, ProviderSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            model: default_model(),
            request_timeout_seconds: default_request_timeout(),
            preferences: Preferences::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let yaml =
            serde_saphyr::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, yaml).await?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(MIN_REQUEST_TIMEOUT_SECONDS))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::default().with_timeout(self.request_timeout())
    }

    /// Switch the active provider. The model resets to the provider default.
    pub fn set_provider(&mut self, provider: Provider) {
        self.provider = provider;
        self.model = provider.descriptor().default_model.to_string();
    }

    pub fn set_api_key(&mut self, provider: Provider, api_key: &str) {
        self.api_key = api_key.to_string();
        self.providers.entry(provider).or_default().api_key = Some(api_key.to_string());
    }

    pub fn set_model(&mut self, provider: Provider, model: &str) {
        self.model = model.to_string();
        self.providers.entry(provider).or_default().model = Some(model.to_string());
    }

    /// API key with the secret portion masked, for display.
    pub fn masked_api_key(&self) -> String {
        mask_key(&self.api_key)
    }
}

fn default_provider() -> Provider {
    Provider::OpenAI
}

fn default_model() -> String {
    default_provider().descriptor().default_model.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

// ============================================================================
// Preferences
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub package_manager: PackageManagerPreference,
    #[serde(default = "default_true")]
    pub show_thinking: bool,
    #[serde(default = "default_true")]
    pub color_output: bool,
    #[serde(default)]
    pub stream_responses: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            package_manager: PackageManagerPreference::default(),
            show_thinking: true,
            color_output: true,
            stream_responses: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerPreference {
    /// Use whatever the project uses.
    #[default]
    Auto,
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManagerPreference {
    pub const ALL: [PackageManagerPreference; 4] = [
        PackageManagerPreference::Auto,
        PackageManagerPreference::Npm,
        PackageManagerPreference::Pnpm,
        PackageManagerPreference::Yarn,
    ];

    /// Explicit choice, or `None` for auto-detection.
    pub fn fixed(&self) -> Option<PackageManager> {
        match self {
            PackageManagerPreference::Auto => None,
            PackageManagerPreference::Npm => Some(PackageManager::Npm),
            PackageManagerPreference::Pnpm => Some(PackageManager::Pnpm),
            PackageManagerPreference::Yarn => Some(PackageManager::Yarn),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManagerPreference::Auto => "auto",
            PackageManagerPreference::Npm => "npm",
            PackageManagerPreference::Pnpm => "pnpm",
            PackageManagerPreference::Yarn => "yarn",
        }
    }
}

// ============================================================================
// ProviderSettings
// ============================================================================

/// Per-provider overrides kept across provider switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ============================================================================
// ConfigSource
// ============================================================================

/// Read access to resolved settings.
pub trait ConfigSource {
    /// True once an API key has been stored.
    fn has_config(&self) -> bool;

    fn config(&self) -> &Config;

    /// Key for `provider` (the active one when `None`).
    fn api_key(&self, provider: Option<Provider>) -> Option<String>;

    /// Model for `provider` (the active one when `None`), falling back to the
    /// provider default.
    fn model(&self, provider: Option<Provider>) -> String;
}

impl ConfigSource for Config {
    fn has_config(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn config(&self) -> &Config {
        self
    }

    fn api_key(&self, provider: Option<Provider>) -> Option<String> {
        let provider = provider.unwrap_or(self.provider);
        let stored = self
            .providers
            .get(&provider)
            .and_then(|s| s.api_key.as_deref())
            .filter(|k| !k.is_empty());

        match stored {
            Some(key) => Some(key.to_string()),
            None if provider == self.provider && !self.api_key.is_empty() => {
                Some(self.api_key.clone())
            }
            None => None,
        }
    }

    fn model(&self, provider: Option<Provider>) -> String {
        let provider = provider.unwrap_or(self.provider);
        let stored = self
            .providers
            .get(&provider)
            .and_then(|s| s.model.as_deref())
            .filter(|m| !m.is_empty());

        match stored {
            Some(model) => model.to_string(),
            None if provider == self.provider && !self.model.is_empty() => self.model.clone(),
            None => provider.descriptor().default_model.to_string(),
        }
    }
}

// ============================================================================
// Path resolution
// ============================================================================

/// Config file location: explicit path, then `NODEMATE_CONFIG`, then the
/// platform config directory.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("nodemate").join("config.yaml"))
        .ok_or(ConfigError::NoConfigDir)
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("could not determine a config directory; pass --config")]
    NoConfigDir,
}

// ============================================================================
// Tests
// ============================================================================
