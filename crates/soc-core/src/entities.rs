//! Case, entity, and approval data model (§3 of the specification).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// How much latitude the pipeline has to act without a human in the loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Every stage transition requires an explicit human approval.
    Manual,
    /// Low-risk stages proceed automatically; response/investigation require approval.
    Supervised,
    /// The pipeline runs end to end without approval gates.
    Autonomous,
    /// Approvals only at named checkpoints (`critical_finding`, `containment_action`).
    Research,
}

impl AutonomyLevel {
    /// Approval-wait timeout for this autonomy level, per the design notes.
    pub fn approval_timeout(&self) -> chrono::Duration {
        match self {
            Self::Manual => chrono::Duration::minutes(30),
            Self::Supervised | Self::Research => chrono::Duration::minutes(15),
            Self::Autonomous => chrono::Duration::minutes(15),
        }
    }

    /// Whether stages at this level ever pause for a human decision.
    pub fn requires_approval_gates(&self) -> bool {
        !matches!(self, Self::Autonomous)
    }

    /// Stages that require an approval before starting, given the fixed critical set
    /// (`response`, `investigation`) configured for `supervised` mode.
    pub fn requires_approval_for_stage(&self, stage: &str) -> bool {
        match self {
            Self::Autonomous => false,
            Self::Manual => true,
            Self::Supervised => matches!(stage, "response" | "investigation"),
            // `investigation` surfaces critical findings, `response` carries the containment
            // actions; these are the stages the orchestrator actually names when it asks for
            // approval, so `research` gates on them directly rather than on checkpoint labels
            // nothing ever passes in.
            Self::Research => matches!(stage, "investigation" | "response"),
        }
    }
}

/// Lifecycle state of a case moving through the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Triaging,
    Enriching,
    Investigating,
    Correlating,
    AwaitingApproval,
    Responding,
    Reporting,
    /// All attempted stages ran successfully (or were skipped by design).
    #[serde(rename = "completed")]
    Closed,
    /// Some stages errored and some succeeded.
    Partial,
    /// Every attempted stage errored.
    Failed,
}

/// A SOC case: the unit of work the pipeline processes end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    pub status: CaseStatus,
    pub autonomy_level: AutonomyLevel,
    pub raw_data: serde_json::Value,
    pub entities: EntityBag,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Case {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        title: impl Into<String>,
        autonomy_level: AutonomyLevel,
        raw_data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            title: title.into(),
            status: CaseStatus::Open,
            autonomy_level,
            raw_data,
            entities: EntityBag::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The kind of entity extracted from a case's raw detection data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Host,
    Ip,
    Domain,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Host => "hosts",
            Self::Ip => "ips",
            Self::Domain => "domains",
        }
    }

    /// Per-type weight used by the weighted-Jaccard similarity score.
    pub fn similarity_weight(&self) -> f64 {
        match self {
            Self::User => 0.5,
            Self::Ip => 0.35,
            Self::Host => 0.15,
            Self::Domain => 0.10,
        }
    }
}

/// A single normalized entity pulled from case data, with a confidence score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub entity_type: EntityType,
    pub value: String,
    pub raw_value: String,
    pub confidence: f64,
}

impl Entity {
    pub fn new(
        entity_type: EntityType,
        value: impl Into<String>,
        raw_value: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            entity_type,
            value: value.into(),
            raw_value: raw_value.into(),
            confidence,
        }
    }
}

/// All entities normalized out of a case, grouped by type, deduplicated by normalized value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EntityBag {
    pub users: BTreeSet<String>,
    pub hosts: BTreeSet<String>,
    pub ips: BTreeSet<String>,
    pub domains: BTreeSet<String>,
}

impl EntityBag {
    pub fn insert(&mut self, entity_type: EntityType, value: String) {
        match entity_type {
            EntityType::User => self.users.insert(value),
            EntityType::Host => self.hosts.insert(value),
            EntityType::Ip => self.ips.insert(value),
            EntityType::Domain => self.domains.insert(value),
        };
    }

    pub fn get(&self, entity_type: EntityType) -> &BTreeSet<String> {
        match entity_type {
            EntityType::User => &self.users,
            EntityType::Host => &self.hosts,
            EntityType::Ip => &self.ips,
            EntityType::Domain => &self.domains,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.hosts.is_empty() && self.ips.is_empty() && self.domains.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len() + self.hosts.len() + self.ips.len() + self.domains.len()
    }
}

/// A raw SIEM detection rule attached to a case, before eligibility filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub detection_id: String,
    pub rule_name: String,
    pub rule_type: String,
    pub event_filter: String,
    pub from_time: i64,
    pub to_time: i64,
}

/// A detection that passed eligibility filtering and is ready for SIEM query execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibleDetection {
    pub detection_id: String,
    pub rule_name: String,
    pub event_filter: String,
    pub from_time: i64,
    pub to_time: i64,
}

impl From<Detection> for EligibleDetection {
    fn from(d: Detection) -> Self {
        Self {
            detection_id: d.detection_id,
            rule_name: d.rule_name,
            event_filter: d.event_filter,
            from_time: d.from_time,
            to_time: d.to_time,
        }
    }
}

/// Decision state of a human approval gate bound to a case + pipeline stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    /// Approved, Rejected, and Expired are terminal; only Pending may transition further.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A human approval gate for one case at one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub case_id: String,
    pub stage: String,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub reason: Option<String>,
}

impl Approval {
    pub fn new(case_id: impl Into<String>, stage: impl Into<String>, timeout: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            case_id: case_id.into(),
            stage: stage.into(),
            status: ApprovalStatus::Pending,
            requested_at: now,
            expires_at: now + timeout,
            decided_at: None,
            decided_by: None,
            reason: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && now >= self.expires_at
    }
}

/// A versioned prompt template for one agent role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub agent_role: String,
    pub version: String,
    pub template: String,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<String>,
}

impl PromptVersion {
    /// Increment the numeric suffix of a version string: `"v1.0"` -> `"v1.1"`.
    pub fn next_version(current: &str) -> String {
        let trimmed = current.trim_start_matches('v');
        match trimmed.rsplit_once('.') {
            Some((major, minor)) => match minor.parse::<u32>() {
                Ok(n) => format!("v{major}.{}", n + 1),
                Err(_) => format!("{current}.1"),
            },
            None => format!("{current}.1"),
        }
    }
}

/// A fact learned during case investigation, persisted for future similarity matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub knowledge_id: String,
    pub case_id: String,
    pub summary: String,
    pub entities: EntityBag,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_bump_increments_minor() {
        assert_eq!(PromptVersion::next_version("v1.0"), "v1.1");
        assert_eq!(PromptVersion::next_version("v1.9"), "v1.10");
    }

    #[test]
    fn approval_expires_after_timeout() {
        let approval = Approval::new("case-1", "response", chrono::Duration::minutes(15));
        assert!(!approval.is_expired(Utc::now()));
        assert!(approval.is_expired(Utc::now() + chrono::Duration::minutes(16)));
    }

    #[test]
    fn entity_bag_dedupes_by_value() {
        let mut bag = EntityBag::default();
        bag.insert(EntityType::User, "alice".into());
        bag.insert(EntityType::User, "alice".into());
        assert_eq!(bag.users.len(), 1);
    }
}
