//! # soc-runtime
//!
//! Tokio-based case-enrichment pipeline: agent execution, the approval gate, entity
//! normalization, SIEM query fan-out, similarity search, and the stage orchestrator
//! that ties them together.

pub mod adapters;
pub mod agent;
pub mod eligibility;
pub mod entity_normalizer;
pub mod executor;
pub mod gate;
pub mod orchestrator;
pub mod siem_executor;
pub mod similarity;

pub use adapters::{
    CaseRecordClient, HttpCaseRecordClient, HttpSiemClient, NoopCaseRecordClient, NoopSiemClient, RawCase, classify_rule_type,
};
pub use agent::{AgentOutput, AgentRole, parse_agent_output};
pub use eligibility::{deduplicate_queries, is_fact_or_profile, select_eligible_detections, EligibilityBreakdown};
pub use entity_normalizer::{normalize_from_raw, NormalizedEntity};
pub use executor::{AgentDefinition, AgentExecutor, ExecutionResult, ExecutorError};
pub use gate::{Gate, GateError, InMemoryGate, WaitOutcome};
pub use orchestrator::{Orchestrator, OrchestratorConfig, PipelineResult};
pub use siem_executor::{build_queries, SiemClient, SiemExecutor, SiemQuery, SiemResult};
pub use similarity::{find_similar, maintain_entity_indices, CandidateCase, SimilarCase, SimilarityContext};
