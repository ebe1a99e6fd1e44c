//! Integration tests that require a real LLM API.
//!
//! Run with: cargo test -p soc-llm --test llm_integration -- --ignored

use soc_llm::{LlmProvider, LlmRequest, OpenAIProvider};

#[tokio::test]
#[ignore = "Requires OPENAI_API_KEY"]
async fn openai_real_request_returns_content() {
    let api_key =
        std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set for this test");

    let provider = OpenAIProvider::gpt35(&api_key);

    assert!(provider.is_available().await, "OpenAI should be available");

    let request = LlmRequest {
        case_id: None,
        prompt: "What is 2 + 2? Answer with just the number.".to_string(),
        system: "You are a helpful assistant. Be extremely concise.".to_string(),
        temperature: 0.0,
        max_tokens: 10,
    };

    let response = provider.complete(request).await;
    assert!(response.is_ok(), "request should succeed: {:?}", response);

    let response = response.unwrap();
    assert!(!response.content.is_empty());
    assert!(response.content.contains('4'));
    assert!(response.token_usage.total_tokens > 0);
}

#[tokio::test]
#[ignore = "Makes real API call"]
async fn invalid_api_key_fails() {
    let provider = OpenAIProvider::gpt35("invalid-key-12345");
    let response = provider.ask("Hello").await;
    assert!(response.is_err(), "should fail with invalid key");
}

#[tokio::test]
async fn mock_provider_returns_a_response() {
    use soc_llm::MockProvider;

    let mock = MockProvider::smart();
    let response = mock.ask("What should we triage first?").await;
    assert!(response.is_ok());
    assert!(!response.unwrap().is_empty());
}
