//! Pipeline orchestrator: drives a case through the fixed six-stage pipeline,
//! threading each stage's artifacts into the next and waiting on approval gates
//! where the case's autonomy level requires one.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use soc_core::{AgentIdentity, AuditEvent, AuditEventType, AutonomyLevel, CaseStatus, Detection, EntityBag, TokenUsage};
use soc_llm::LlmProvider;
use soc_persist::{AuditStore, CaseReport, CaseStore, KvStore, PromptStore, StorageBackend};
use tokio::sync::RwLock;

use crate::adapters::CaseRecordClient;
use crate::agent::{AgentOutput, AgentRole, IocSet};
use crate::eligibility::{deduplicate_queries, is_fact_or_profile, select_eligible_detections};
use crate::entity_normalizer::normalize_from_raw;
use crate::executor::{AgentDefinition, AgentExecutor};
use crate::gate::{Gate, WaitOutcome};
use crate::siem_executor::{build_queries, SiemClient, SiemExecutor};
use crate::similarity::{find_similar, maintain_entity_indices, CandidateCase, SimilarityContext};

/// Fixed stage order; `enrichment` is the last stage run when `max_depth == 1`.
const DEEP_STAGES: [&str; 6] = ["triage", "enrichment", "investigation", "correlation", "response", "reporting"];

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_depth: u8,
    pub include_raw_logs: bool,
    pub model: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_depth: 3, include_raw_logs: false, model: "gpt-4".to_string() }
    }
}

/// The structured result of one full `process()` call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineResult {
    pub case_id: String,
    pub status: CaseStatus,
    pub entities: EntityBag,
    pub related_cases: Vec<String>,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub steps_count: usize,
    pub pipeline_results: std::collections::BTreeMap<String, serde_json::Value>,
    pub triage_assessment: Option<serde_json::Value>,
    pub investigation_summary: Option<serde_json::Value>,
    pub attack_story: Option<serde_json::Value>,
    pub containment_actions: Vec<serde_json::Value>,
    pub ioc_set: IocSet,
    pub final_report: Option<CaseReport>,
}

fn stage_role(stage: &str) -> AgentRole {
    match stage {
        "triage" => AgentRole::Triage,
        "enrichment" => AgentRole::Enrichment,
        "investigation" => AgentRole::Investigation,
        "correlation" => AgentRole::Correlation,
        "response" => AgentRole::Response,
        "reporting" => AgentRole::Reporting,
        _ => unreachable!("not a pipeline stage: {stage}"),
    }
}

/// Union `extra` into `base` in place; entity bags never shrink across stages.
fn merge_entities(base: &mut EntityBag, extra: &EntityBag) {
    for v in &extra.users {
        base.users.insert(v.clone());
    }
    for v in &extra.hosts {
        base.hosts.insert(v.clone());
    }
    for v in &extra.ips {
        base.ips.insert(v.clone());
    }
    for v in &extra.domains {
        base.domains.insert(v.clone());
    }
}

/// Drives cases through the pipeline, holding `Arc`-shared store handles plus an
/// in-flight case registry so a case cannot be double-processed concurrently.
pub struct Orchestrator<B: KvStore + 'static + ?Sized> {
    pub config: OrchestratorConfig,
    executor: AgentExecutor<B>,
    audit_store: Arc<AuditStore<B>>,
    case_store: Arc<CaseStore<B>>,
    gate: Arc<dyn Gate>,
    backend: Arc<B>,
    siem_executor: SiemExecutor<dyn SiemClient>,
    case_record_client: Arc<dyn CaseRecordClient>,
    in_flight: RwLock<HashSet<String>>,
}

impl<B: KvStore + 'static + ?Sized> Orchestrator<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompt_store: Arc<PromptStore<B>>,
        audit_store: Arc<AuditStore<B>>,
        case_store: Arc<CaseStore<B>>,
        gate: Arc<dyn Gate>,
        backend: Arc<B>,
        siem_client: Arc<dyn SiemClient>,
        case_record_client: Arc<dyn CaseRecordClient>,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = AgentExecutor::new(llm, prompt_store, audit_store.clone());
        let siem_executor = SiemExecutor::new(siem_client);
        Self {
            config,
            executor,
            audit_store,
            case_store,
            gate,
            backend,
            siem_executor,
            case_record_client,
            in_flight: RwLock::new(HashSet::new()),
        }
    }

    pub async fn is_in_flight(&self, case_id: &str) -> bool {
        self.in_flight.read().await.contains(case_id)
    }

    /// Wait on an approval gate for `stage`, honoring the case's autonomy level.
    /// `Ok(())` means the stage should proceed; `Err` carries the terminal outcome
    /// that stopped it (rejected, expired, or the wait itself was cancelled).
    async fn await_approval(&self, case_id: &str, stage: &str, autonomy_level: AutonomyLevel) -> Result<(), WaitOutcome> {
        if !autonomy_level.requires_approval_for_stage(stage) {
            return Ok(());
        }

        let approval_id = self
            .gate
            .request(case_id, stage, &format!("approval required before stage '{stage}'"), autonomy_level)
            .await;
        let timeout = autonomy_level.approval_timeout().to_std().unwrap_or(Duration::from_secs(900));

        match self.gate.wait_for(approval_id, timeout).await {
            WaitOutcome::Approved => Ok(()),
            other => Err(other),
        }
    }

    /// Drive one case through the pipeline end to end.
    pub async fn process(
        &self,
        case_id: &str,
        autonomy_level: AutonomyLevel,
        max_depth: u8,
    ) -> Result<PipelineResult, String> {
        self.in_flight.write().await.insert(case_id.to_string());
        let result = self.process_inner(case_id, autonomy_level, max_depth).await;
        self.in_flight.write().await.remove(case_id);
        result
    }

    async fn process_inner(
        &self,
        case_id: &str,
        autonomy_level: AutonomyLevel,
        max_depth: u8,
    ) -> Result<PipelineResult, String> {
        let case = self
            .case_store
            .get(case_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("case {case_id} not found"))?;

        let stages: &[&str] = if max_depth > 1 { &DEEP_STAGES } else { &DEEP_STAGES[..2] };

        let detections: Vec<Detection> =
            serde_json::from_value(case.raw_data.get("detections").cloned().unwrap_or(serde_json::Value::Array(Vec::new())))
                .unwrap_or_default();

        let mut pipeline_results = std::collections::BTreeMap::new();
        let mut entities = case.entities.clone();
        let mut related_cases: Vec<String> = Vec::new();
        let mut ioc_set = IocSet::default();
        let mut triage_assessment = None;
        let mut investigation_summary = None;
        let mut attack_story = None;
        let mut containment_actions = Vec::new();
        let mut final_report: Option<CaseReport> = None;
        let mut stages_run = 0usize;
        let mut stage_errors = 0usize;

        for &stage in stages {
            if let Err(outcome) = self.await_approval(case_id, stage, autonomy_level).await {
                let observation = match outcome {
                    WaitOutcome::Rejected => "approval_rejected",
                    WaitOutcome::Expired => "approval_expired",
                    WaitOutcome::Cancelled => "approval_cancelled",
                    WaitOutcome::Approved => unreachable!("approved is not an abort outcome"),
                };
                pipeline_results.insert(stage.to_string(), serde_json::json!({"error": observation}));

                let identity = AgentIdentity {
                    name: format!("{stage}-agent"),
                    role: stage_role(stage).as_str().to_string(),
                    model: self.config.model.clone(),
                };
                let event = AuditEvent::new_typed(
                    AuditEventType::StageSkipped,
                    case_id,
                    0,
                    identity,
                    None,
                    autonomy_level,
                    serde_json::json!({"stage": stage}),
                    Vec::new(),
                    vec![observation.to_string()],
                    serde_json::json!({"stage": stage, "outcome": observation}),
                    TokenUsage::ZERO,
                );
                self.audit_store.append(event).await.map_err(|e| e.to_string())?;
                break;
            }

            let mut inputs = serde_json::json!({
                "case_id": case_id,
                "raw_data": case.raw_data,
                "entities": entities,
                "prior_results": pipeline_results,
            });

            let mut computed = serde_json::Map::new();

            if stage == "triage" {
                let (normalized_bag, details) = normalize_from_raw(&case.raw_data);
                merge_entities(&mut entities, &normalized_bag);
                inputs["entities"] = serde_json::to_value(&entities).unwrap_or_default();
                computed.insert("normalized_entities".to_string(), serde_json::to_value(&normalized_bag).unwrap_or_default());
                computed.insert("normalization_details".to_string(), serde_json::to_value(&details).unwrap_or_default());
            }

            if stage == "investigation" {
                let (eligible, breakdown) = select_eligible_detections(&detections);
                let groups = deduplicate_queries(&eligible);
                let queries = build_queries(&groups);
                let siem_results = self.siem_executor.run_queries(&queries).await;
                inputs["siem_queries"] = serde_json::to_value(&queries.iter().map(|q| &q.event_filter).collect::<Vec<_>>()).unwrap_or_default();
                inputs["siem_results"] = serde_json::to_value(&siem_results).unwrap_or_default();
                computed.insert("siem_results".to_string(), serde_json::to_value(&siem_results).unwrap_or_default());
                computed.insert("eligibility_breakdown".to_string(), serde_json::to_value(&breakdown).unwrap_or_default());
            }

            if stage == "enrichment" {
                maintain_entity_indices(self.backend.as_ref(), case_id, &entities).await.map_err(|e| e.to_string())?;

                let case_store = self.case_store.clone();
                let similar = find_similar(
                    self.backend.as_ref(),
                    case_id,
                    &entities,
                    &SimilarityContext::default(),
                    None,
                    None,
                    move |ids| async move {
                        let mut out = Vec::new();
                        for id in ids {
                            if let Ok(Some(c)) = case_store.get(&id).await {
                                out.push(CandidateCase { case_id: id, bag: c.entities, context: SimilarityContext::default() });
                            }
                        }
                        out
                    },
                )
                .await
                .map_err(|e| e.to_string())?;

                let candidate_ids: Vec<String> = similar.iter().map(|s| s.case_id.clone()).collect();
                related_cases.extend(candidate_ids.iter().cloned());

                let raw_cases = self.case_record_client.fetch_cases(&candidate_ids).await;
                let (kept, skipped): (Vec<_>, Vec<_>) =
                    raw_cases.into_iter().partition(|rc| is_fact_or_profile(&rc.rule_name, &rc.rule_type));
                let rule_filter_summary = serde_json::json!({
                    "total": kept.len() + skipped.len(),
                    "kept": kept.len(),
                    "skipped": skipped.len(),
                });

                let related_json: Vec<serde_json::Value> = similar
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "case_id": s.case_id,
                            "score": s.score,
                            "matched_entities": s.matched_entities.iter().map(|(t, v)| format!("{}:{v}", t.as_str())).collect::<Vec<_>>(),
                        })
                    })
                    .collect();

                inputs["related_cases"] = serde_json::to_value(&related_json).unwrap_or_default();
                inputs["kept_cases"] = serde_json::to_value(&kept).unwrap_or_default();
                inputs["skipped_cases"] = serde_json::to_value(&skipped).unwrap_or_default();
                inputs["rule_filter_summary"] = rule_filter_summary.clone();

                computed.insert("related_cases".to_string(), serde_json::to_value(&related_json).unwrap_or_default());
                computed.insert("kept_cases".to_string(), serde_json::to_value(&kept).unwrap_or_default());
                computed.insert("skipped_cases".to_string(), serde_json::to_value(&skipped).unwrap_or_default());
                computed.insert("rule_filter_summary".to_string(), rule_filter_summary);
            }

            let agent = AgentDefinition::new(format!("{stage}-agent"), stage_role(stage), self.config.model.clone());
            let execution = match self.executor.execute(case_id, &agent, inputs, autonomy_level).await {
                Ok(r) => r,
                Err(e) => {
                    stages_run += 1;
                    stage_errors += 1;
                    pipeline_results.insert(stage.to_string(), serde_json::json!({"error": e.to_string()}));
                    continue;
                }
            };
            stages_run += 1;

            if let AgentOutput::Raw { ref parse_error, .. } = execution.output {
                if parse_error.starts_with("llm call failed") {
                    stage_errors += 1;
                }
            }

            let mut output_json = serde_json::to_value(&execution.output).unwrap_or(serde_json::Value::Null);
            if let serde_json::Value::Object(ref mut map) = output_json {
                map.extend(computed);
            }
            pipeline_results.insert(stage.to_string(), output_json.clone());

            match execution.output {
                AgentOutput::Triage { .. } => triage_assessment = Some(output_json),
                AgentOutput::Investigation { ioc_set: stage_iocs, .. } => {
                    ioc_set = stage_iocs;
                    investigation_summary = Some(output_json);
                }
                AgentOutput::Correlation { .. } => attack_story = Some(output_json),
                AgentOutput::Response { containment_actions: actions, .. } => {
                    containment_actions = actions
                        .into_iter()
                        .map(|a| serde_json::to_value(a).unwrap_or(serde_json::Value::Null))
                        .collect();
                }
                AgentOutput::Reporting { ref incident_report, ref executive_summary, .. } => {
                    let report = CaseReport {
                        case_id: case_id.to_string(),
                        incident_report: incident_report.clone(),
                        executive_summary: executive_summary.clone(),
                        generated_at: chrono::Utc::now(),
                    };
                    self.case_store.put_report(&report).await.map_err(|e| e.to_string())?;
                    final_report = Some(report);
                }
                AgentOutput::Enrichment { ref enriched_entities, .. } => {
                    merge_entities(&mut entities, enriched_entities);
                }
                _ => {}
            }
        }

        self.case_store.update_entities(case_id, entities.clone()).await.map_err(|e| e.to_string())?;

        let status = if stages_run > 0 && stage_errors == stages_run {
            CaseStatus::Failed
        } else if stage_errors > 0 {
            CaseStatus::Partial
        } else {
            CaseStatus::Closed
        };
        self.case_store.update_status(case_id, status).await.map_err(|e| e.to_string())?;

        let final_report = final_report.or_else(|| {
            triage_assessment.as_ref().map(|t| {
                let summary = t.get("summary").and_then(|s| s.as_str()).unwrap_or("pipeline ended before a full report was produced");
                CaseReport {
                    case_id: case_id.to_string(),
                    incident_report: summary.to_string(),
                    executive_summary: summary.to_string(),
                    generated_at: chrono::Utc::now(),
                }
            })
        });

        let chain = self.audit_store.get_chain(case_id).await.map_err(|e| e.to_string())?;
        let total_cost_usd = chain.iter().map(|s| s.token_usage.cost_usd).sum();
        let total_tokens = chain.iter().map(|s| s.token_usage.total_tokens as u64).sum();
        let steps_count = chain.len();

        Ok(PipelineResult {
            case_id: case_id.to_string(),
            status,
            entities,
            related_cases,
            total_cost_usd,
            total_tokens,
            steps_count,
            pipeline_results,
            triage_assessment,
            investigation_summary,
            attack_story,
            containment_actions,
            ioc_set,
            final_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{NoopCaseRecordClient, NoopSiemClient};
    use crate::gate::InMemoryGate;
    use async_trait::async_trait;
    use soc_core::{Case, TokenUsage as CoreTokenUsage};
    use soc_llm::{LlmError, LlmRequest, LlmResponse};
    use soc_persist::MemoryBackend;

    #[derive(Debug)]
    struct StageAwareMockLlm;

    #[async_trait]
    impl LlmProvider for StageAwareMockLlm {
        fn name(&self) -> &str {
            "mock"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
            let content = match request.system.as_str() {
                "triage" => serde_json::json!({
                    "severity": "high", "priority": 1, "entities": [], "escalation_needed": true,
                    "initial_steps": [], "summary": "test", "hypotheses": []
                }),
                "enrichment" => serde_json::json!({
                    "related_items": [], "kept_cases": [], "skipped_cases": [],
                    "enriched_entities": {"users": [], "hosts": [], "ips": [], "domains": []},
                    "rule_filter_summary": {"total": 0, "kept": 0, "skipped": 0}
                }),
                _ => serde_json::json!({}),
            };
            Ok(LlmResponse {
                content: content.to_string(),
                model: "mock".into(),
                token_usage: CoreTokenUsage { input_tokens: 1, output_tokens: 1, total_tokens: 2, cost_usd: 0.0001 },
                latency_ms: 1,
            })
        }
    }

    async fn build_orchestrator() -> (Orchestrator<MemoryBackend>, Arc<CaseStore<MemoryBackend>>) {
        let backend = Arc::new(MemoryBackend::new());
        let case_store = Arc::new(CaseStore::new(backend.clone()));
        let orchestrator = Orchestrator::new(
            Arc::new(StageAwareMockLlm),
            Arc::new(PromptStore::new(backend.clone())),
            Arc::new(AuditStore::new(backend.clone())),
            case_store.clone(),
            Arc::new(InMemoryGate::new()),
            backend.clone(),
            Arc::new(NoopSiemClient) as Arc<dyn SiemClient>,
            Arc::new(NoopCaseRecordClient) as Arc<dyn CaseRecordClient>,
            OrchestratorConfig::default(),
        );
        (orchestrator, case_store)
    }

    #[tokio::test]
    async fn shallow_pipeline_runs_only_triage_and_enrichment() {
        let (orchestrator, case_store) = build_orchestrator().await;
        let case = Case::new("case-1", "tenant-a", "x", AutonomyLevel::Autonomous, serde_json::json!({}));
        case_store.put(&case).await.unwrap();

        let result = orchestrator.process("case-1", AutonomyLevel::Autonomous, 1).await.unwrap();
        assert_eq!(result.pipeline_results.len(), 2);
        assert!(result.pipeline_results.contains_key("triage"));
        assert!(result.pipeline_results.contains_key("enrichment"));
        assert!(result.triage_assessment.is_some());
    }

    #[tokio::test]
    async fn deep_pipeline_runs_all_six_stages_autonomously() {
        let (orchestrator, case_store) = build_orchestrator().await;
        let case = Case::new("case-2", "tenant-a", "x", AutonomyLevel::Autonomous, serde_json::json!({}));
        case_store.put(&case).await.unwrap();

        let result = orchestrator.process("case-2", AutonomyLevel::Autonomous, 3).await.unwrap();
        assert_eq!(result.pipeline_results.len(), 6);
        assert_eq!(result.status, CaseStatus::Closed);
        assert!(result.final_report.is_some());
    }

    #[tokio::test]
    async fn rejected_approval_aborts_remaining_stages_and_leaves_an_audit_trail() {
        let backend = Arc::new(MemoryBackend::new());
        let case_store = Arc::new(CaseStore::new(backend.clone()));
        let audit_store = Arc::new(AuditStore::new(backend.clone()));
        let gate = Arc::new(InMemoryGate::new());
        let orchestrator = Orchestrator::new(
            Arc::new(StageAwareMockLlm),
            Arc::new(PromptStore::new(backend.clone())),
            audit_store.clone(),
            case_store.clone(),
            gate.clone(),
            backend.clone(),
            Arc::new(NoopSiemClient) as Arc<dyn SiemClient>,
            Arc::new(NoopCaseRecordClient) as Arc<dyn CaseRecordClient>,
            OrchestratorConfig::default(),
        );

        let case = Case::new("case-3", "tenant-a", "x", AutonomyLevel::Manual, serde_json::json!({}));
        case_store.put(&case).await.unwrap();

        let handle = tokio::spawn(async move { orchestrator.process("case-3", AutonomyLevel::Manual, 3).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending = gate.list_pending(Some("case-3")).await;
        assert_eq!(pending.len(), 1);
        gate.decide(pending[0].id, false, "analyst1", Some("not authorized".to_string())).await.unwrap();

        let result = handle.await.unwrap();
        assert_eq!(result.pipeline_results.len(), 1);
        assert!(result.pipeline_results.contains_key("triage"));

        let chain = audit_store.get_chain("case-3").await.unwrap();
        let skip_event = chain.iter().find(|e| e.event_type == AuditEventType::StageSkipped).unwrap();
        assert!(skip_event.observations.iter().any(|o| o == "approval_rejected"));
    }
}
