//! Agent identity and the per-stage structured output contract.
//!
//! Every pipeline stage is one agent role with a fixed output schema. The LLM
//! response is parsed defensively: a well-formed match on the role's schema produces
//! the typed variant, anything else falls back to [`AgentOutput::Raw`] with the parse
//! error recorded for the audit trail, rather than aborting the stage.

use serde::{Deserialize, Serialize};
use soc_core::EntityBag;

/// The seven agent roles threaded through the case-enrichment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Triage,
    Enrichment,
    Investigation,
    Correlation,
    Response,
    Reporting,
    Knowledge,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Enrichment => "enrichment",
            Self::Investigation => "investigation",
            Self::Correlation => "correlation",
            Self::Response => "response",
            Self::Reporting => "reporting",
            Self::Knowledge => "knowledge",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedItem {
    pub case_id: String,
    pub similarity_score: f64,
    pub matched_entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFilterSummary {
    pub total: usize,
    pub kept: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiemResultSummary {
    pub case_id: String,
    pub detection_rule: String,
    pub query_executed: String,
    pub events_found: usize,
    pub query_duration_ms: u64,
    pub raw_events: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub ts: String,
    #[serde(default)]
    pub actor: Option<String>,
    pub event: String,
    pub src: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IocSet {
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub hashes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackPattern {
    pub pattern: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub mitre_tactic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackStory {
    pub narrative: String,
    pub phases: Vec<String>,
    pub duration_minutes: u64,
    pub sophistication: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MitreMapping {
    #[serde(default)]
    pub tactics: Vec<String>,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub kill_chain: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainmentAction {
    pub action: String,
    pub target: String,
    pub priority: String,
    pub justification: String,
    pub urgency: String,
    pub impact: String,
}

/// Defensively-parsed structured output of one agent step, tagged by role so the
/// orchestrator can thread each stage's artifact into the next without a downcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "agent")]
pub enum AgentOutput {
    #[serde(rename = "triage")]
    Triage {
        severity: String,
        priority: u8,
        entities: Vec<TriageEntity>,
        escalation_needed: bool,
        initial_steps: Vec<String>,
        summary: String,
        hypotheses: Vec<String>,
    },
    #[serde(rename = "enrichment")]
    Enrichment {
        related_items: Vec<RelatedItem>,
        kept_cases: Vec<serde_json::Value>,
        skipped_cases: Vec<serde_json::Value>,
        enriched_entities: EntityBag,
        rule_filter_summary: RuleFilterSummary,
    },
    #[serde(rename = "investigation")]
    Investigation {
        siem_results: Vec<SiemResultSummary>,
        timeline_events: Vec<TimelineEvent>,
        ioc_set: IocSet,
        correlation_findings: Vec<String>,
        attack_patterns: Vec<AttackPattern>,
    },
    #[serde(rename = "correlation")]
    Correlation {
        attack_story: AttackStory,
        mitre_mapping: MitreMapping,
        threat_actor_profile: String,
        detection_gaps: Vec<String>,
        confidence_assessment: f64,
    },
    #[serde(rename = "response")]
    Response {
        containment_actions: Vec<ContainmentAction>,
        remediation_steps: Vec<String>,
        monitoring_enhancements: Vec<String>,
        evidence_preservation: Vec<String>,
        priority_matrix: serde_json::Value,
    },
    #[serde(rename = "reporting")]
    Reporting {
        incident_report: String,
        executive_summary: String,
        technical_analysis: String,
        timeline: Vec<TimelineEvent>,
        iocs: IocSet,
        recommendations: Vec<String>,
        report_metadata: serde_json::Value,
    },
    #[serde(rename = "knowledge")]
    Knowledge { operation: String, detail: serde_json::Value },
    /// The LLM's response did not match its role's schema; the raw text is kept so
    /// downstream stages degrade gracefully instead of aborting the case.
    Raw { text: String, parse_error: String },
}

/// Parse an LLM response into the structured output for `role`, falling back to
/// [`AgentOutput::Raw`] on any schema mismatch.
pub fn parse_agent_output(role: AgentRole, raw: &str) -> AgentOutput {
    let tagged = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(mut value) => {
            if let Some(obj) = value.as_object_mut() {
                obj.insert("agent".to_string(), serde_json::Value::String(role.as_str().to_string()));
            }
            value
        }
        Err(e) => {
            return AgentOutput::Raw { text: raw.to_string(), parse_error: e.to_string() };
        }
    };

    match serde_json::from_value::<AgentOutput>(tagged) {
        Ok(output) => output,
        Err(e) => AgentOutput::Raw { text: raw.to_string(), parse_error: e.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_triage_json_parses_into_the_typed_variant() {
        let raw = serde_json::json!({
            "severity": "high",
            "priority": 2,
            "entities": [],
            "escalation_needed": true,
            "initial_steps": ["isolate host"],
            "summary": "suspicious logon",
            "hypotheses": []
        })
        .to_string();

        match parse_agent_output(AgentRole::Triage, &raw) {
            AgentOutput::Triage { severity, escalation_needed, .. } => {
                assert_eq!(severity, "high");
                assert!(escalation_needed);
            }
            other => panic!("expected Triage, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_degrades_to_raw_instead_of_erroring() {
        let raw = "not json at all";
        match parse_agent_output(AgentRole::Triage, raw) {
            AgentOutput::Raw { text, parse_error } => {
                assert_eq!(text, raw);
                assert!(!parse_error.is_empty());
            }
            other => panic!("expected Raw, got {other:?}"),
        }
    }

    #[test]
    fn schema_mismatch_for_the_role_degrades_to_raw() {
        let raw = serde_json::json!({"unexpected": "shape"}).to_string();
        match parse_agent_output(AgentRole::Response, &raw) {
            AgentOutput::Raw { .. } => {}
            other => panic!("expected Raw, got {other:?}"),
        }
    }
}
