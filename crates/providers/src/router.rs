//! Provider router: builds one adapter per configured backend and looks
//! them up by identifier.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use toolgate_config::{AppConfig, ProviderConfig};
use toolgate_core::{Provider, ProviderError};
use tracing::warn;

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// The supported inference backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenRouter,
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenRouter,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Build the adapter for this backend, applying per-provider overrides.
    pub fn build(
        self,
        settings: Option<&ProviderConfig>,
        idle_timeout: Duration,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let base_url = settings.and_then(|s| s.api_url.clone());
        let model = settings.and_then(|s| s.default_model.clone());

        let provider: Arc<dyn Provider> = match self {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => {
                let mut p = if self == ProviderKind::OpenRouter {
                    OpenAiCompatProvider::openrouter()?
                } else {
                    OpenAiCompatProvider::openai()?
                };
                p = p.with_idle_timeout(idle_timeout);
                if let Some(url) = base_url {
                    p = p.with_base_url(url);
                }
                if let Some(model) = model {
                    p = p.with_default_model(model);
                }
                Arc::new(p)
            }
            ProviderKind::Anthropic => {
                let mut p = AnthropicProvider::new()?.with_idle_timeout(idle_timeout);
                if let Some(url) = base_url {
                    p = p.with_base_url(url);
                }
                if let Some(model) = model {
                    p = p.with_default_model(model);
                }
                Arc::new(p)
            }
            ProviderKind::Gemini => {
                let mut p = GeminiProvider::new()?.with_idle_timeout(idle_timeout);
                if let Some(url) = base_url {
                    p = p.with_base_url(url);
                }
                if let Some(model) = model {
                    p = p.with_default_model(model);
                }
                Arc::new(p)
            }
        };
        Ok(provider)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(ProviderError::NotConfigured(format!(
                "unknown provider '{other}' (expected openrouter, openai, anthropic or gemini)"
            ))),
        }
    }
}

/// Routes requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build one adapter per configured backend, plus the default.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ProviderError> {
    let default_kind: ProviderKind = config.default_provider.parse()?;
    let idle = Duration::from_secs(config.agent.stream_idle_timeout_secs);
    let mut router = ProviderRouter::new(default_kind.as_str());

    for (name, settings) in &config.providers {
        let kind = match name.parse::<ProviderKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(provider = %name, error = %e, "Skipping unknown provider in config");
                continue;
            }
        };
        router.register(kind.as_str(), kind.build(Some(settings), idle)?);
    }

    if router.get(default_kind.as_str()).is_none() {
        router.register(default_kind.as_str(), default_kind.build(None, idle)?);
    }

    Ok(router)
}
