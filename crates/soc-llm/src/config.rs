//! Environment-driven configuration for LLM provider selection.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// LLM provider configuration, loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI API key (env: `OPENAI_API_KEY`)
    pub openai_api_key: Option<String>,
    /// Anthropic API key (env: `ANTHROPIC_API_KEY`)
    pub anthropic_api_key: Option<String>,
    pub default_provider: String,
    pub default_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            default_provider: "mock".to_string(),
            default_model: "gpt-4".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            default_provider: env::var("SOC_DEFAULT_PROVIDER")
                .unwrap_or_else(|_| "mock".to_string()),
            default_model: env::var("SOC_DEFAULT_MODEL").unwrap_or_else(|_| "gpt-4".to_string()),
        }
    }

    pub fn api_key(&self, provider: &str) -> Option<&str> {
        match provider.to_lowercase().as_str() {
            "openai" => self.openai_api_key.as_deref(),
            "anthropic" => self.anthropic_api_key.as_deref(),
            _ => None,
        }
    }

    pub fn is_configured(&self, provider: &str) -> bool {
        match provider.to_lowercase().as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" => self.anthropic_api_key.is_some(),
            "mock" => true,
            _ => false,
        }
    }

    pub fn available_providers(&self) -> Vec<&str> {
        let mut providers = vec!["mock"];
        if self.openai_api_key.is_some() {
            providers.push("openai");
        }
        if self.anthropic_api_key.is_some() {
            providers.push("anthropic");
        }
        providers
    }
}

/// Top-level runtime configuration for the SOC pipeline.
#[derive(Debug, Clone)]
pub struct SocConfig {
    pub llm: LlmConfig,
    pub debug: bool,
    /// Number of detections that may run SIEM queries concurrently (§4.6).
    pub siem_concurrency: usize,
    /// Per-query SIEM timeout in seconds (§4.6).
    pub siem_timeout_secs: u64,
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            debug: false,
            siem_concurrency: 5,
            siem_timeout_secs: 30,
        }
    }
}

impl SocConfig {
    pub fn from_env() -> Self {
        Self {
            llm: LlmConfig::from_env(),
            debug: env::var("SOC_DEBUG").map(|v| v == "1" || v == "true").unwrap_or(false),
            siem_concurrency: env::var("SOC_SIEM_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            siem_timeout_secs: env::var("SOC_SIEM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_mock_provider() {
        let config = LlmConfig::default();
        assert_eq!(config.default_provider, "mock");
        assert!(config.is_configured("mock"));
    }

    #[test]
    fn available_providers_always_include_mock() {
        let config = LlmConfig::default();
        assert!(config.available_providers().contains(&"mock"));
    }
}
