//! Mock LLM provider for tests and local development without an upstream API key.

use async_trait::async_trait;
use soc_core::TokenUsage;
use std::time::Instant;

use crate::pricing::ModelPricing;
use crate::provider::{LlmError, LlmProvider, LlmRequest, LlmResponse};

/// A mock LLM provider that returns predefined or content-aware canned responses.
#[derive(Debug)]
pub struct MockProvider {
    pub name: String,
    responses: Vec<String>,
    index: std::sync::atomic::AtomicUsize,
    latency_ms: u64,
}

impl MockProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            name: "mock".to_string(),
            responses,
            index: std::sync::atomic::AtomicUsize::new(0),
            latency_ms: 50,
        }
    }

    pub fn constant(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    /// A mock that inspects the prompt and returns a plausible SOC-agent-shaped response.
    pub fn smart() -> Self {
        Self {
            name: "smart-mock".to_string(),
            responses: vec![],
            index: std::sync::atomic::AtomicUsize::new(0),
            latency_ms: 50,
        }
    }

    fn generate_smart_response(&self, request: &LlmRequest) -> String {
        let prompt_lower = request.prompt.to_lowercase();

        if prompt_lower.contains("triage") || prompt_lower.contains("severity") {
            return "{\"severity\": \"medium\", \"rationale\": \"Multiple failed logins followed by a successful login from an unfamiliar host.\"}".to_string();
        }

        if prompt_lower.contains("correlat") || prompt_lower.contains("similar") {
            return "{\"related_cases\": [], \"summary\": \"No strongly correlated prior cases found.\"}".to_string();
        }

        if prompt_lower.contains("report") || prompt_lower.contains("summarize") {
            return "Summary: investigation complete, no further action required.".to_string();
        }

        format!(
            "Processed request: \"{}\" — analysis complete.",
            &request.prompt[..request.prompt.len().min(50)]
        )
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;

        let content = if self.responses.is_empty() {
            self.generate_smart_response(&request)
        } else {
            let idx = self.index.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.responses[idx % self.responses.len()].clone()
        };

        let input_tokens = (request.prompt.len() / 4) as u32 + (request.system.len() / 4) as u32;
        let output_tokens = (content.len() / 4) as u32;
        let pricing = ModelPricing::with_defaults();

        Ok(LlmResponse {
            content,
            model: self.name.clone(),
            token_usage: TokenUsage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
                cost_usd: pricing.cost_usd("mock", input_tokens, output_tokens),
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl crate::provider::EmbeddingProvider for MockProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.0; 384])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn constant_mock_returns_fixed_response() {
        let mock = MockProvider::constant("Hello, world!");
        let response = mock.ask("test").await.unwrap();
        assert_eq!(response, "Hello, world!");
    }

    #[tokio::test]
    async fn smart_mock_responds_to_triage_prompts() {
        let mock = MockProvider::smart();
        let response = mock.ask("please triage this case").await.unwrap();
        assert!(response.contains("severity"));
    }

    #[tokio::test]
    async fn token_usage_is_populated() {
        let mock = MockProvider::smart();
        let response = mock.complete(LlmRequest::simple("hello there")).await.unwrap();
        assert!(response.token_usage.total_tokens > 0);
        assert_eq!(response.token_usage.cost_usd, 0.0);
    }
}
