use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const BIND_ENV: &str = "CHATDESK_BIND";
pub const URL_ENV: &str = "CHATDESK_URL";

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer all questions to the best of your ability.";

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    chatdesk_provider::default_max_tokens()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Where the chat client reaches the store
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChatdeskConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl ChatdeskConfig {
    /// Apply `CHATDESK_*` overrides from the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(BIND_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind;
        }
        if let Some(url) = lookup(URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.client.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(anyhow!("server.bind must not be empty"));
        }
        for (field, url) in [
            ("client.base_url", &self.client.base_url),
            ("llm.base_url", &self.llm.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!("{field} must be an http(s) URL, got {url:?}"));
            }
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must not be empty"));
        }
        if self.llm.max_tokens == 0 {
            return Err(anyhow!("llm.max_tokens must be greater than zero"));
        }
        Ok(())
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join("config").join("main.yaml")
}

/// Read `<root>/config/main.yaml` (defaults when absent), apply environment
/// overrides and validate.
pub fn load_config(root: &Path) -> Result<ChatdeskConfig> {
    let path = config_path(root);
    let mut config = if path.is_file() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_config(&content).with_context(|| format!("invalid config {}", path.display()))?
    } else {
        tracing::debug!("no config at {}, using defaults", path.display());
        ChatdeskConfig::default()
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<ChatdeskConfig> {
    // An empty file deserializes to null; treat it as all defaults.
    if content.trim().is_empty() {
        return Ok(ChatdeskConfig::default());
    }
    Ok(serde_yaml::from_str(content)?)
}
