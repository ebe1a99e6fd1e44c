//! OpenAI-compatible chat completion provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soc_core::TokenUsage;
use std::time::Instant;

use crate::pricing::ModelPricing;
use crate::provider::{LlmError, LlmProvider, LlmRequest, LlmResponse};

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Talks to the OpenAI chat-completions API (or any OpenAI-compatible endpoint).
#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
    base_url: String,
    pricing: ModelPricing,
}

impl OpenAIProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            pricing: ModelPricing::from_env(),
        }
    }

    /// Point at an OpenAI-compatible endpoint other than OpenAI itself.
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        let mut provider = Self::new(api_key, model);
        provider.base_url = base_url.trim_end_matches('/').to_string();
        provider
    }

    pub fn gpt4(api_key: &str) -> Self {
        Self::new(api_key, "gpt-4")
    }

    pub fn gpt4_turbo(api_key: &str) -> Self {
        Self::new(api_key, "gpt-4-turbo-preview")
    }

    pub fn gpt35(api_key: &str) -> Self {
        Self::new(api_key, "gpt-3.5-turbo")
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/v1/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .is_ok()
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        request.validate()?;
        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);

        let messages = vec![
            Message {
                role: "system".to_string(),
                content: request.system,
            },
            Message {
                role: "user".to_string(),
                content: request.prompt,
            },
        ];

        let openai_request = OpenAIRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "status: {status}, body: {body}"
            )));
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        let (input_tokens, output_tokens, total_tokens) = match api_response.usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens, u.total_tokens),
            None => (0, 0, 0),
        };

        Ok(LlmResponse {
            content,
            model: api_response.model.clone(),
            token_usage: TokenUsage {
                input_tokens,
                output_tokens,
                total_tokens,
                cost_usd: self.pricing.cost_usd(&api_response.model, input_tokens, output_tokens),
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
