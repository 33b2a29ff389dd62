use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::events::{Provider, Voice};

/// Upper bound on chat entries sent with a turn
pub const MAX_HISTORY_WINDOW: usize = 20;

/// Clamp a configured window to `2..=MAX_HISTORY_WINDOW`, rounded down to whole
/// exchanges so it never opens on an assistant message. 0 means the default.
pub fn clamp_history_window(window: usize) -> usize {
    match window {
        0 => MAX_HISTORY_WINDOW,
        n => (n.min(MAX_HISTORY_WINDOW) & !1).max(2),
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// duochat home directory
    pub home: PathBuf,

    /// Where `/save` writes conversation exports
    pub export_dir: PathBuf,

    /// Where synthesized speech is written
    pub speech_dir: PathBuf,

    /// YAML credential store read by the login screen
    pub credentials_path: PathBuf,

    /// Provider selected when a session starts
    pub default_provider: Provider,

    /// Number of chat entries sent to the provider with each turn
    pub history_window: usize,

    /// Provider configuration keyed by provider id (`openai`, `anthropic`)
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Speech preferences
    pub speech: SpeechConfig,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub api_key: Option<String>,
    pub models: Vec<ModelOption>,
}

/// A selectable model with its human-readable label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    pub label: String,
    pub id: String,
}

impl ModelOption {
    fn new(label: &str, id: &str) -> Self {
        Self {
            label: label.to_string(),
            id: id.to_string(),
        }
    }
}

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub tts_enabled: bool,
    pub voice: Voice,
    pub tts_model: String,
    pub transcription_model: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_enabled: false,
            voice: Voice::Nova,
            tts_model: "tts-1".to_string(),
            transcription_model: "whisper-1".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        Self::with_home(home.join(".duochat"))
    }
}

impl Config {
    /// Default configuration rooted at `home`
    pub fn with_home(home: PathBuf) -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(Provider::OpenAi.to_string(), ProviderConfig {
            name: Provider::OpenAi.display_name().to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: Some(Provider::OpenAi.api_key_env().to_string()),
            api_key: None,
            models: vec![
                ModelOption::new("gpt-4o-mini (Fast responses)", "gpt-4o-mini"),
                ModelOption::new("gpt-4o (Advanced model)", "gpt-4o"),
            ],
        });
        providers.insert(Provider::Anthropic.to_string(), ProviderConfig {
            name: Provider::Anthropic.display_name().to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: Some(Provider::Anthropic.api_key_env().to_string()),
            api_key: None,
            models: vec![
                ModelOption::new("claude-3-haiku (Fast responses)", "claude-3-haiku-20240307"),
                ModelOption::new("claude-3-opus (OLD-Advanced model)", "claude-3-opus-20240229"),
                ModelOption::new("claude-3-5-sonnet (Latest-Fast)", "claude-3-5-sonnet-20240620"),
            ],
        });

        Config {
            export_dir: home.join("exports"),
            speech_dir: home.join("audio"),
            credentials_path: home.join("credentials.yaml"),
            home,
            default_provider: Provider::OpenAi,
            history_window: MAX_HISTORY_WINDOW,
            providers,
            speech: SpeechConfig::default(),
        }
    }

    fn default_home() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".duochat"))
    }

    /// Load configuration from `~/.duochat/config.toml`, falling back to defaults
    pub fn load() -> Result<Self> {
        let home = Self::default_home()?;
        fs::create_dir_all(&home).context("Failed to create .duochat directory")?;
        Self::load_from(home)
    }

    /// Load configuration from `<home>/config.toml`
    pub fn load_from(home: PathBuf) -> Result<Self> {
        let config_path = home.join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str(&content)
                .context("Failed to parse config file")?
        } else {
            Config::with_home(home.clone())
        };

        config.home = home;
        config.history_window = clamp_history_window(config.history_window);
        // A provider missing from an older file falls back to its defaults.
        let defaults = Config::with_home(config.home.clone());
        for (provider, provider_config) in defaults.providers {
            config.providers.entry(provider).or_insert(provider_config);
        }

        Ok(config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.home).context("Failed to create .duochat directory")?;
        let config_path = self.config_path();
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .context("Failed to write config file")?;
        Ok(())
    }

    pub fn provider(&self, provider: Provider) -> Option<&ProviderConfig> {
        self.providers.get(provider.as_ref())
    }

    /// Models offered for a provider, in menu order
    pub fn models(&self, provider: Provider) -> &[ModelOption] {
        self.provider(provider)
            .map(|p| p.models.as_slice())
            .unwrap_or(&[])
    }

    /// First model listed for a provider
    pub fn default_model(&self, provider: Provider) -> Option<&str> {
        self.models(provider).first().map(|m| m.id.as_str())
    }

    /// Resolve a model by id or label for a provider
    pub fn model_for(&self, provider: Provider, query: &str) -> Option<&ModelOption> {
        let query = query.trim();
        self.models(provider).iter().find(|m| {
            m.id == query || m.label.eq_ignore_ascii_case(query)
        })
    }

    /// Check if an API key is available for a provider
    pub fn has_api_key(&self, provider: Provider) -> bool {
        self.get_api_key(provider).is_some()
    }

    /// Get API key from config or environment
    pub fn get_api_key(&self, provider: Provider) -> Option<String> {
        let provider_config = self.provider(provider)?;
        provider_config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                let env = provider_config
                    .api_key_env
                    .as_deref()
                    .unwrap_or(provider.api_key_env());
                std::env::var(env).ok().filter(|key| !key.trim().is_empty())
            })
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }
}
