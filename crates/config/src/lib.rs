//! Configuration loading, validation, and management for Toolgate.
//!
//! Loads configuration from `~/.toolgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use toolgate_core::AgentMode;

/// The root configuration structure.
///
/// Maps directly to `~/.toolgate/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default inference provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Tool call budget per run
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Bridge listener
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Who the agent is working for
    #[serde(default)]
    pub context: PromptContext,

    /// User-defined skills
    #[serde(default)]
    pub skills: Vec<SkillConfig>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("rate_limit", &self.rate_limit)
            .field("bridge", &self.bridge)
            .field("context", &self.context)
            .field("skills", &self.skills)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub mode: AgentMode,

    /// Streaming/dispatch cycles allowed per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Provider idle watchdog
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout_secs: u64,

    /// Debounce before the thinking indicator re-arms
    #[serde(default = "default_thinking_idle")]
    pub thinking_idle_ms: u64,
}

fn default_max_iterations() -> u32 {
    100
}
fn default_stream_idle_timeout() -> u64 {
    30
}
fn default_thinking_idle() -> u64 {
    500
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            mode: AgentMode::default(),
            max_iterations: default_max_iterations(),
            stream_idle_timeout_secs: default_stream_idle_timeout(),
            thinking_idle_ms: default_thinking_idle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_calls_per_request")]
    pub max_calls_per_request: u32,

    #[serde(default = "default_calls_per_minute")]
    pub max_calls_per_minute: u32,

    #[serde(default = "default_min_delay")]
    pub min_call_delay_ms: u64,

    /// Spacing for heavy operations (sends, deletes, group changes)
    #[serde(default = "default_heavy_delay")]
    pub heavy_call_delay_ms: u64,
}

fn default_calls_per_request() -> u32 {
    20
}
fn default_calls_per_minute() -> u32 {
    30
}
fn default_min_delay() -> u64 {
    500
}
fn default_heavy_delay() -> u64 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_request: default_calls_per_request(),
            max_calls_per_minute: default_calls_per_minute(),
            min_call_delay_ms: default_min_delay(),
            heavy_call_delay_ms: default_heavy_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_bridge_port")]
    pub port: u16,

    /// Upper bound on a single `execute` request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_bridge_port() -> u16 {
    9716
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_bridge_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// How a skill reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    /// Always in the system prompt
    Knowledge,
    /// Listed; the model fetches the content through the `skills` tools
    Tool,
    /// Injected only when the user writes `/<name>`
    OnDemand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    pub name: String,

    pub kind: SkillKind,

    /// When the skill applies
    #[serde(default)]
    pub context: String,

    pub content: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// Env vars holding a key for one specific provider.
const PROVIDER_KEY_VARS: &[(&str, &str)] = &[
    ("openrouter", "OPENROUTER_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
];

impl AppConfig {
    /// Load configuration from the default path (~/.toolgate/config.toml).
    ///
    /// Environment overrides:
    /// - `TOOLGATE_API_KEY` (generic key, used when none is configured)
    /// - `OPENROUTER_API_KEY`, `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`,
    ///   `GEMINI_API_KEY` (fill that provider's key when unset)
    /// - `TOOLGATE_PROVIDER`, `TOOLGATE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("TOOLGATE_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("TOOLGATE_MODEL") {
            self.default_model = model;
        }
        if self.api_key.is_none() {
            self.api_key = lookup("TOOLGATE_API_KEY");
        }

        for (provider, var) in PROVIDER_KEY_VARS {
            let Some(key) = lookup(var) else { continue };
            let entry = self.providers.entry((*provider).to_string()).or_default();
            if entry.api_key.is_none() {
                entry.api_key = Some(key);
            }
        }
    }

    /// The key to use for `provider`: its own, else the global one.
    pub fn credential_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.stream_idle_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.stream_idle_timeout_secs must be at least 1".into(),
            ));
        }

        if self.rate_limit.max_calls_per_request == 0 || self.rate_limit.max_calls_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit call caps must be at least 1".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for skill in &self.skills {
            if skill.name.is_empty() || skill.name.chars().any(char::is_whitespace) {
                return Err(ConfigError::ValidationError(format!(
                    "skill name '{}' must be non-empty and contain no whitespace",
                    skill.name
                )));
            }
            if !seen.insert(skill.name.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate skill name '{}'",
                    skill.name
                )));
            }
        }

        Ok(())
    }

    /// Check if any API key is available.
    pub fn has_api_key(&self) -> bool {
        self.credential_for(&self.default_provider).is_some()
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            rate_limit: RateLimitConfig::default(),
            bridge: BridgeConfig::default(),
            context: PromptContext::default(),
            skills: vec![],
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
