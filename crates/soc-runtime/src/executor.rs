//! Agent executor: runs one agent's five-step `execute()` contract.
//!
//! fetch prompt+version -> format -> call the LLM -> defensively parse into the
//! agent's output schema -> build, hash, and append the audit step.

use std::sync::Arc;

use soc_core::{AgentIdentity, AuditEvent, AutonomyLevel, TokenUsage};
use soc_llm::{LlmError, LlmProvider, LlmRequest};
use soc_persist::{AuditStore, PromptStore, StorageBackend, StorageError};

use crate::agent::{parse_agent_output, AgentOutput, AgentRole};

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The fixed `(name, role, model)` identity of one pipeline-stage agent.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub role: AgentRole,
    pub model: String,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, role: AgentRole, model: impl Into<String>) -> Self {
        Self { name: name.into(), role, model: model.into() }
    }

    /// Fold the stage's inputs into its prompt template. Agent-specific templating
    /// beyond this (e.g. few-shot examples) lives in the template text itself.
    pub fn format_prompt(&self, template: &str, inputs: &serde_json::Value) -> String {
        format!(
            "{template}\n\nCase context (JSON):\n{}",
            serde_json::to_string(inputs).unwrap_or_else(|_| "{}".to_string())
        )
    }
}

/// The result of one agent's `execute()` call: its parsed output plus the audit
/// step that was appended for it.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: AgentOutput,
    pub step: AuditEvent,
}

/// Runs agents against a prompt store, an LLM provider, and an audit chain.
pub struct AgentExecutor<B: StorageBackend + ?Sized> {
    llm: Arc<dyn LlmProvider>,
    prompt_store: Arc<PromptStore<B>>,
    audit_store: Arc<AuditStore<B>>,
}

impl<B: StorageBackend + ?Sized> AgentExecutor<B> {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompt_store: Arc<PromptStore<B>>,
        audit_store: Arc<AuditStore<B>>,
    ) -> Self {
        Self { llm, prompt_store, audit_store }
    }

    /// Run one agent's execute() contract for a case and append the resulting step.
    pub async fn execute(
        &self,
        case_id: &str,
        agent: &AgentDefinition,
        inputs: serde_json::Value,
        autonomy_level: AutonomyLevel,
    ) -> Result<ExecutionResult, ExecutorError> {
        let prompt_version = self.prompt_store.get(agent.role.as_str()).await?;
        let formatted = agent.format_prompt(&prompt_version.template, &inputs);
        let identity = AgentIdentity { name: agent.name.clone(), role: agent.role.as_str().to_string(), model: agent.model.clone() };

        let request = LlmRequest::with_role(agent.role.as_str(), &formatted);
        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                let output = AgentOutput::Raw { text: String::new(), parse_error: format!("llm call failed: {e}") };
                let event = AuditEvent::new(
                    case_id,
                    0,
                    identity,
                    Some(prompt_version.version.clone()),
                    autonomy_level,
                    inputs,
                    Vec::new(),
                    vec![format!("llm call failed: {e}")],
                    serde_json::json!({"error": e.to_string()}),
                    TokenUsage::ZERO,
                );
                let step = self.audit_store.append(event).await?;
                return Ok(ExecutionResult { output, step });
            }
        };

        let output = parse_agent_output(agent.role, &response.content);
        let outputs_json = serde_json::to_value(&output).unwrap_or(serde_json::Value::Null);

        let observations = match &output {
            AgentOutput::Raw { parse_error, .. } => {
                vec![format!("response did not match the {} schema: {parse_error}", agent.role.as_str())]
            }
            _ => Vec::new(),
        };

        let event = AuditEvent::new(
            case_id,
            0,
            identity,
            Some(prompt_version.version.clone()),
            autonomy_level,
            inputs,
            Vec::new(),
            observations,
            outputs_json,
            response.token_usage,
        );

        let step = self.audit_store.append(event).await?;
        Ok(ExecutionResult { output, step })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use soc_llm::LlmResponse;
    use soc_persist::MemoryBackend;

    #[derive(Debug)]
    struct MockLlm;

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn name(&self) -> &str {
            "mock"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                content: serde_json::json!({
                    "severity": "medium",
                    "priority": 3,
                    "entities": [],
                    "escalation_needed": false,
                    "initial_steps": [],
                    "summary": "test",
                    "hypotheses": []
                })
                .to_string(),
                model: "mock".to_string(),
                token_usage: TokenUsage { input_tokens: 10, output_tokens: 5, total_tokens: 15, cost_usd: 0.001 },
                latency_ms: 1,
            })
        }
    }

    #[tokio::test]
    async fn execute_appends_a_parsed_step_to_the_audit_chain() {
        let backend = Arc::new(MemoryBackend::new());
        let executor = AgentExecutor::new(
            Arc::new(MockLlm),
            Arc::new(PromptStore::new(backend.clone())),
            Arc::new(AuditStore::new(backend)),
        );

        let agent = AgentDefinition::new("triage-1", AgentRole::Triage, "mock");
        let result = executor
            .execute("case-1", &agent, serde_json::json!({"raw": "data"}), AutonomyLevel::Autonomous)
            .await
            .unwrap();

        match result.output {
            AgentOutput::Triage { severity, .. } => assert_eq!(severity, "medium"),
            other => panic!("expected Triage output, got {other:?}"),
        }
        assert_eq!(result.step.agent.name, "triage-1");
        assert!(result.step.prompt_version.is_some());
    }

    #[derive(Debug)]
    struct FailingLlm;

    #[async_trait]
    impl LlmProvider for FailingLlm {
        fn name(&self) -> &str {
            "failing"
        }

        async fn is_available(&self) -> bool {
            false
        }

        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            Err(LlmError::RequestFailed("provider is down".to_string()))
        }
    }

    #[tokio::test]
    async fn execute_still_appends_a_step_when_the_llm_call_fails() {
        let backend = Arc::new(MemoryBackend::new());
        let executor = AgentExecutor::new(
            Arc::new(FailingLlm),
            Arc::new(PromptStore::new(backend.clone())),
            Arc::new(AuditStore::new(backend)),
        );

        let agent = AgentDefinition::new("triage-1", AgentRole::Triage, "mock");
        let result = executor
            .execute("case-1", &agent, serde_json::json!({"raw": "data"}), AutonomyLevel::Autonomous)
            .await
            .unwrap();

        match result.output {
            AgentOutput::Raw { parse_error, .. } => assert!(parse_error.contains("llm call failed")),
            other => panic!("expected Raw output, got {other:?}"),
        }
        assert_eq!(result.step.token_usage, TokenUsage::ZERO);
        assert_eq!(result.step.outputs["error"], "request failed: provider is down");
        assert!(result.step.observations.iter().any(|o| o.contains("llm call failed")));
    }
}
