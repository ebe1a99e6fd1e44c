//! LLM provider trait and common request/response types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soc_core::TokenUsage;
use thiserror::Error;

/// Errors from LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("rate limited")]
    RateLimited,
    #[error("provider not available")]
    NotAvailable,
    #[error("input too large: {0} bytes exceeds maximum {1} bytes")]
    InputTooLarge(usize, usize),
}

/// Maximum allowed prompt size in bytes (100KB, bounds upstream cost and latency).
pub const MAX_PROMPT_SIZE: usize = 100 * 1024;
/// Maximum allowed system prompt size in bytes (10KB).
pub const MAX_SYSTEM_SIZE: usize = 10 * 1024;

/// A request to an LLM, issued by one pipeline stage on behalf of one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    /// System prompt (the agent's role/persona, from the versioned prompt store).
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn simple(prompt: &str) -> Self {
        Self {
            case_id: None,
            system: "You are a helpful assistant.".to_string(),
            prompt: prompt.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }

    pub fn with_role(system: &str, prompt: &str) -> Self {
        Self {
            system: system.to_string(),
            prompt: prompt.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            case_id: None,
        }
    }

    /// Reject oversized inputs before they reach an upstream provider.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.prompt.len() > MAX_PROMPT_SIZE {
            return Err(LlmError::InputTooLarge(self.prompt.len(), MAX_PROMPT_SIZE));
        }
        if self.system.len() > MAX_SYSTEM_SIZE {
            return Err(LlmError::InputTooLarge(self.system.len(), MAX_SYSTEM_SIZE));
        }
        Ok(())
    }
}

/// Response from an LLM, including structured token accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
}

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn is_available(&self) -> bool;

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Convenience wrapper for a one-off prompt with default request settings.
    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.complete(LlmRequest::simple(prompt)).await?;
        Ok(response.content)
    }
}

/// Trait for embedding providers (text-to-vector), used by the similarity engine
/// and the knowledge-base vector store.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}
