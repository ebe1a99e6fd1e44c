//! Hash-chained audit step types.
//!
//! An [`AuditEvent`] ("agent step") is the unit of the tamper-evident log the pipeline
//! orchestrator appends to for every agent invocation. Hashing follows the wire contract:
//! canonical JSON (RFC 8785 JCS) of the hashable fields, folded with `prev_hash` as
//! `sha256(prev_hash || "||" || canonical)`, or `sha256(canonical)` for the first step
//! in a case.

use crate::entities::AutonomyLevel;
use crate::merkle::Hash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-call token accounting, priced per model (see the cost table in `soc-llm`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
}

impl TokenUsage {
    pub const ZERO: TokenUsage = TokenUsage {
        input_tokens: 0,
        output_tokens: 0,
        total_tokens: 0,
        cost_usd: 0.0,
    };
}

impl Default for TokenUsage {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Identifies the agent that produced a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentIdentity {
    pub name: String,
    pub role: String,
    pub model: String,
}

/// The kind of audit event recorded. Most rows are `AgentStep`; the remainder cover
/// lifecycle and compliance events outside the per-agent pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    AgentStep,
    ApprovalRequested,
    ApprovalDecided,
    StageSkipped,
    CaseCompleted,
    CaseFailed,
    HumanOverride,
    Custom(String),
}

/// Who (or what) is attributed with an audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ActorType {
    Agent(String),
    Human(String),
    #[default]
    System,
}

impl ActorType {
    /// Pseudonymize a human actor id with SHA-256 so raw identifiers never land in the log.
    pub fn pseudonymize(&self) -> Self {
        match self {
            Self::Human(id) => {
                use sha2::{Digest, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(id.as_bytes());
                Self::Human(hex::encode(hasher.finalize()))
            }
            other => other.clone(),
        }
    }
}

/// An Ed25519 signature over a step's hash, `"ed25519:" || hex(sig)` per the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signature {
    pub signer_id: String,
    pub signed_at: DateTime<Utc>,
    pub signature_hex: String,
}

impl Signature {
    pub fn create(
        signer_id: impl Into<String>,
        message: &[u8],
        signing_key: &ed25519_dalek::SigningKey,
    ) -> Self {
        use ed25519_dalek::Signer;
        let signature = signing_key.sign(message);
        Self {
            signer_id: signer_id.into(),
            signed_at: Utc::now(),
            signature_hex: hex::encode(signature.to_bytes()),
        }
    }

    /// Render the `"ed25519:" || hex` wire form.
    pub fn as_wire_string(&self) -> String {
        format!("ed25519:{}", self.signature_hex)
    }

    pub fn verify(
        &self,
        message: &[u8],
        verifying_key: &ed25519_dalek::VerifyingKey,
    ) -> Result<bool, String> {
        let sig_bytes = match hex::decode(&self.signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let sig_array: [u8; 64] = match sig_bytes.try_into() {
            Ok(arr) => arr,
            Err(_) => return Ok(false),
        };
        let signature = ed25519_dalek::Signature::from_bytes(&sig_array);
        match verifying_key.verify_strict(message, &signature) {
            Ok(()) => Ok(true),
            Err(e) => Err(format!("signature verification failed: {e}")),
        }
    }
}

/// One row in the hash-linked audit log: a single agent invocation for a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub step_id: Uuid,
    pub event_type: AuditEventType,
    pub case_id: String,
    pub timestamp: DateTime<Utc>,
    pub sequence_number: u64,
    pub agent: AgentIdentity,
    pub prompt_version: Option<String>,
    pub autonomy_level: AutonomyLevel,
    pub inputs: serde_json::Value,
    pub plan: Vec<String>,
    pub observations: Vec<String>,
    pub outputs: serde_json::Value,
    pub token_usage: TokenUsage,
    pub actor: ActorType,

    pub prev_hash: Option<Hash>,
    pub hash: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// The subset of an [`AuditEvent`]'s fields that feed the hash — excludes `hash` and
/// `signature` per the integrity invariant, and any field that isn't reproducible.
#[derive(Serialize)]
struct HashableFields<'a> {
    event_type: &'a AuditEventType,
    case_id: &'a str,
    sequence_number: u64,
    agent: &'a AgentIdentity,
    prompt_version: &'a Option<String>,
    autonomy_level: &'a AutonomyLevel,
    inputs: &'a serde_json::Value,
    plan: &'a [String],
    observations: &'a [String],
    outputs: &'a serde_json::Value,
    token_usage: TokenUsage,
    actor: &'a ActorType,
}

/// Public parameters used to construct a not-yet-hashed step. Mirrors [`HashableFields`]
/// so callers (the agent runtime) can compute a hash before an `AuditEvent` exists.
pub struct HashParams<'a> {
    pub event_type: &'a AuditEventType,
    pub case_id: &'a str,
    pub sequence_number: u64,
    pub agent: &'a AgentIdentity,
    pub prompt_version: &'a Option<String>,
    pub autonomy_level: &'a AutonomyLevel,
    pub inputs: &'a serde_json::Value,
    pub plan: &'a [String],
    pub observations: &'a [String],
    pub outputs: &'a serde_json::Value,
    pub token_usage: TokenUsage,
    pub actor: &'a ActorType,
}

impl AuditEvent {
    const SENSITIVE_FIELDS: &'static [&'static str] = &[
        "password",
        "secret",
        "token",
        "api_key",
        "apikey",
        "key",
        "authorization",
        "auth",
        "credential",
        "private_key",
        "privatekey",
    ];

    /// Redact sensitive-looking keys from a JSON value before it is hashed or persisted.
    pub fn sanitize_data(value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(mut map) => {
                for key in map.keys().cloned().collect::<Vec<_>>() {
                    let lower_key = key.to_lowercase();
                    if Self::SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                        map.insert(key, serde_json::Value::String("[REDACTED]".to_string()));
                    } else if let Some(v) = map.remove(&key) {
                        map.insert(key, Self::sanitize_data(v));
                    }
                }
                serde_json::Value::Object(map)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(Self::sanitize_data).collect())
            }
            other => other,
        }
    }

    /// Canonical JSON (RFC 8785 JCS) of the hashable fields, sorted keys, no whitespace.
    fn canonical_bytes(params: &HashParams) -> Vec<u8> {
        let fields = HashableFields {
            event_type: params.event_type,
            case_id: params.case_id,
            sequence_number: params.sequence_number,
            agent: params.agent,
            prompt_version: params.prompt_version,
            autonomy_level: params.autonomy_level,
            inputs: params.inputs,
            plan: params.plan,
            observations: params.observations,
            outputs: params.outputs,
            token_usage: params.token_usage,
            actor: params.actor,
        };
        match serde_jcs::to_vec(&fields) {
            Ok(bytes) => bytes,
            Err(_) => format!(
                "{:?}:{}:{}:{:?}:{:?}:{:?}",
                fields.event_type,
                fields.case_id,
                fields.sequence_number,
                fields.inputs,
                fields.outputs,
                fields.actor,
            )
            .into_bytes(),
        }
    }

    /// `hash = sha256(canonical)` when there is no prior step, else
    /// `hash = sha256(prev_hash || "||" || canonical)`.
    pub fn compute_hash(params: &HashParams, prev_hash: Option<&Hash>) -> Hash {
        let canonical = Self::canonical_bytes(params);
        match prev_hash {
            None => Hash::digest(&canonical),
            Some(prev) => {
                let mut buf = Vec::with_capacity(prev.to_hex().len() + 2 + canonical.len());
                buf.extend_from_slice(prev.to_hex().as_bytes());
                buf.extend_from_slice(b"||");
                buf.extend_from_slice(&canonical);
                Hash::digest(&buf)
            }
        }
    }

    /// Build a fully-hashed step record for the first step in a case (`prev_hash = None`).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        case_id: impl Into<String>,
        sequence_number: u64,
        agent: AgentIdentity,
        prompt_version: Option<String>,
        autonomy_level: AutonomyLevel,
        inputs: serde_json::Value,
        plan: Vec<String>,
        observations: Vec<String>,
        outputs: serde_json::Value,
        token_usage: TokenUsage,
    ) -> Self {
        Self::chained(
            case_id,
            sequence_number,
            agent,
            prompt_version,
            autonomy_level,
            inputs,
            plan,
            observations,
            outputs,
            token_usage,
            None,
        )
    }

    /// Build a fully-hashed step record chained onto `prev_hash`.
    #[allow(clippy::too_many_arguments)]
    pub fn chained(
        case_id: impl Into<String>,
        sequence_number: u64,
        agent: AgentIdentity,
        prompt_version: Option<String>,
        autonomy_level: AutonomyLevel,
        inputs: serde_json::Value,
        plan: Vec<String>,
        observations: Vec<String>,
        outputs: serde_json::Value,
        token_usage: TokenUsage,
        prev_hash: Option<Hash>,
    ) -> Self {
        Self::chained_typed(
            AuditEventType::AgentStep,
            case_id,
            sequence_number,
            agent,
            prompt_version,
            autonomy_level,
            inputs,
            plan,
            observations,
            outputs,
            token_usage,
            prev_hash,
        )
    }

    /// Like [`Self::new`], but for event types other than `AgentStep` (approvals, stage
    /// skips, case-lifecycle markers).
    #[allow(clippy::too_many_arguments)]
    pub fn new_typed(
        event_type: AuditEventType,
        case_id: impl Into<String>,
        sequence_number: u64,
        agent: AgentIdentity,
        prompt_version: Option<String>,
        autonomy_level: AutonomyLevel,
        inputs: serde_json::Value,
        plan: Vec<String>,
        observations: Vec<String>,
        outputs: serde_json::Value,
        token_usage: TokenUsage,
    ) -> Self {
        Self::chained_typed(
            event_type,
            case_id,
            sequence_number,
            agent,
            prompt_version,
            autonomy_level,
            inputs,
            plan,
            observations,
            outputs,
            token_usage,
            None,
        )
    }

    /// Like [`Self::chained`], but lets the caller pick the event type.
    #[allow(clippy::too_many_arguments)]
    pub fn chained_typed(
        event_type: AuditEventType,
        case_id: impl Into<String>,
        sequence_number: u64,
        agent: AgentIdentity,
        prompt_version: Option<String>,
        autonomy_level: AutonomyLevel,
        inputs: serde_json::Value,
        plan: Vec<String>,
        observations: Vec<String>,
        outputs: serde_json::Value,
        token_usage: TokenUsage,
        prev_hash: Option<Hash>,
    ) -> Self {
        let case_id = case_id.into();
        let inputs = Self::sanitize_data(inputs);
        let outputs = Self::sanitize_data(outputs);
        let actor = ActorType::System;

        let params = HashParams {
            event_type: &event_type,
            case_id: &case_id,
            sequence_number,
            agent: &agent,
            prompt_version: &prompt_version,
            autonomy_level: &autonomy_level,
            inputs: &inputs,
            plan: &plan,
            observations: &observations,
            outputs: &outputs,
            token_usage,
            actor: &actor,
        };
        let hash = Self::compute_hash(&params, prev_hash.as_ref());

        Self {
            step_id: Uuid::new_v4(),
            event_type,
            case_id,
            timestamp: Utc::now(),
            sequence_number,
            agent,
            prompt_version,
            autonomy_level,
            inputs,
            plan,
            observations,
            outputs,
            token_usage,
            actor,
            prev_hash,
            hash,
            signature: None,
        }
    }

    /// Recompute this event's hash from its own fields, to check it against `self.hash`.
    pub fn recompute_hash(&self) -> Hash {
        let params = HashParams {
            event_type: &self.event_type,
            case_id: &self.case_id,
            sequence_number: self.sequence_number,
            agent: &self.agent,
            prompt_version: &self.prompt_version,
            autonomy_level: &self.autonomy_level,
            inputs: &self.inputs,
            plan: &self.plan,
            observations: &self.observations,
            outputs: &self.outputs,
            token_usage: self.token_usage,
            actor: &self.actor,
        };
        Self::compute_hash(&params, self.prev_hash.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_agent() -> AgentIdentity {
        AgentIdentity {
            name: "triage".into(),
            role: "Triage Analyst".into(),
            model: "gpt-4".into(),
        }
    }

    #[test]
    fn first_step_has_no_prev_hash() {
        let event = AuditEvent::new(
            "case-1",
            0,
            sample_agent(),
            Some("v1.0".into()),
            AutonomyLevel::Autonomous,
            serde_json::json!({"entities": []}),
            vec![],
            vec![],
            serde_json::json!({"severity": "low"}),
            TokenUsage::ZERO,
        );
        assert!(event.prev_hash.is_none());
        assert_eq!(event.recompute_hash(), event.hash);
    }

    #[test]
    fn chained_step_folds_prev_hash() {
        let first = AuditEvent::new(
            "case-1",
            0,
            sample_agent(),
            Some("v1.0".into()),
            AutonomyLevel::Autonomous,
            serde_json::json!({}),
            vec![],
            vec![],
            serde_json::json!({}),
            TokenUsage::ZERO,
        );
        let second = AuditEvent::chained(
            "case-1",
            1,
            sample_agent(),
            Some("v1.0".into()),
            AutonomyLevel::Autonomous,
            serde_json::json!({}),
            vec![],
            vec![],
            serde_json::json!({}),
            TokenUsage::ZERO,
            Some(first.hash.clone()),
        );
        assert_eq!(second.prev_hash, Some(first.hash));
        assert_eq!(second.recompute_hash(), second.hash);
    }

    #[test]
    fn tamper_changes_hash() {
        let mut event = AuditEvent::new(
            "case-1",
            0,
            sample_agent(),
            Some("v1.0".into()),
            AutonomyLevel::Autonomous,
            serde_json::json!({}),
            vec![],
            vec![],
            serde_json::json!({"severity": "low"}),
            TokenUsage::ZERO,
        );
        let original_hash = event.hash.clone();
        event.outputs = serde_json::json!({"severity": "critical"});
        assert_ne!(event.recompute_hash(), original_hash);
    }

    #[test]
    fn sanitize_redacts_sensitive_fields() {
        let data = serde_json::json!({"api_key": "sk-123", "nested": {"password": "hunter2"}, "ok": "value"});
        let sanitized = AuditEvent::sanitize_data(data);
        assert_eq!(sanitized["api_key"], "[REDACTED]");
        assert_eq!(sanitized["nested"]["password"], "[REDACTED]");
        assert_eq!(sanitized["ok"], "value");
    }

    #[test]
    fn pseudonymize_hashes_human_actor() {
        let actor = ActorType::Human("analyst@example.com".into());
        let pseudo = actor.pseudonymize();
        match pseudo {
            ActorType::Human(id) => assert_ne!(id, "analyst@example.com"),
            _ => panic!("expected Human variant"),
        }
    }
}
