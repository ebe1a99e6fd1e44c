//! Hash-chained audit store: append-only per-case log with Merkle verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soc_core::{AuditEvent, Hash, MerkleTree};
use std::sync::Arc;

use crate::backend::{StorageBackend, StorageError, StorageExt};

/// Append-only, hash-chained audit log, scoped per case.
#[derive(Debug)]
pub struct AuditStore<B: StorageBackend + ?Sized> {
    backend: Arc<B>,
    prefix: String,
    last_hash: tokio::sync::RwLock<std::collections::HashMap<String, Hash>>,
    sequence_counters: tokio::sync::RwLock<std::collections::HashMap<String, u64>>,
}

impl<B: StorageBackend + ?Sized> AuditStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            prefix: "audit:".to_string(),
            last_hash: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            sequence_counters: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }

    fn step_key(&self, case_id: &str, step_id: uuid::Uuid) -> String {
        format!("{}case:{}:step:{}", self.prefix, case_id, step_id)
    }

    fn chain_key(&self, case_id: &str) -> String {
        format!("{}case:{}:chain", self.prefix, case_id)
    }

    /// Append one agent step to a case's chain, filling in `prev_hash`/`sequence_number`.
    pub async fn append(&self, mut event: AuditEvent) -> Result<AuditEvent, StorageError> {
        let case_id = event.case_id.clone();

        let mut last_hash_guard = self.last_hash.write().await;
        let mut seq_guard = self.sequence_counters.write().await;

        let prev_hash = last_hash_guard.get(&case_id).cloned();
        let seq = seq_guard.entry(case_id.clone()).or_insert(0);
        event.sequence_number = *seq;
        event.prev_hash = prev_hash.clone();
        event.hash = event.recompute_hash();
        *seq += 1;

        self.backend.set(&self.step_key(&case_id, event.step_id), &event).await?;

        let mut chain: Vec<uuid::Uuid> = self
            .backend
            .get(&self.chain_key(&case_id))
            .await?
            .unwrap_or_default();
        chain.push(event.step_id);
        self.backend.set(&self.chain_key(&case_id), &chain).await?;

        last_hash_guard.insert(case_id, event.hash.clone());

        Ok(event)
    }

    pub async fn get(&self, case_id: &str, step_id: uuid::Uuid) -> Result<Option<AuditEvent>, StorageError> {
        self.backend.get(&self.step_key(case_id, step_id)).await
    }

    /// All steps for a case in chain order.
    pub async fn get_chain(&self, case_id: &str) -> Result<Vec<AuditEvent>, StorageError> {
        let chain: Vec<uuid::Uuid> = self
            .backend
            .get(&self.chain_key(case_id))
            .await?
            .unwrap_or_default();

        let mut events = Vec::new();
        for id in chain {
            if let Some(event) = self.get(case_id, id).await? {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub async fn build_merkle_tree(&self, case_id: &str) -> Result<MerkleTree, StorageError> {
        let events = self.get_chain(case_id).await?;
        let leaves: Vec<(String, Hash)> = events
            .iter()
            .map(|e| (e.step_id.to_string(), e.hash.clone()))
            .collect();
        Ok(MerkleTree::from_leaves(leaves))
    }

    /// Recompute every step's hash and check it against both the stored hash and the
    /// previous step's hash, to detect tampering anywhere in the chain.
    pub async fn verify_chain(&self, case_id: &str) -> Result<bool, StorageError> {
        Ok(self.verify_integrity(case_id).await?.valid)
    }

    /// Like [`Self::verify_chain`], but scans the full chain instead of stopping at the
    /// first failure, and reports which steps failed and why.
    pub async fn verify_integrity(&self, case_id: &str) -> Result<IntegrityResult, StorageError> {
        let events = self.get_chain(case_id).await?;
        let total_steps = events.len();
        let mut errors = Vec::new();

        for (i, event) in events.iter().enumerate() {
            if event.recompute_hash() != event.hash {
                tracing::warn!(case_id, step_id = %event.step_id, "audit step hash mismatch");
                errors.push(IntegrityError { step_index: i, step_id: event.step_id, reason: "hash mismatch".to_string() });
                continue;
            }

            if i == 0 {
                if event.prev_hash.is_some() {
                    tracing::warn!(case_id, "chain integrity failed: first step has a prev_hash");
                    errors.push(IntegrityError {
                        step_index: i,
                        step_id: event.step_id,
                        reason: "first step has a prev_hash".to_string(),
                    });
                }
            } else {
                let expected = &events[i - 1].hash;
                if event.prev_hash.as_ref() != Some(expected) {
                    tracing::warn!(case_id, step_id = %event.step_id, "chain integrity failed: prev_hash mismatch");
                    errors.push(IntegrityError {
                        step_index: i,
                        step_id: event.step_id,
                        reason: "prev_hash mismatch".to_string(),
                    });
                }
            }
        }

        let failed_steps = errors.iter().map(|e| e.step_index).collect::<std::collections::HashSet<_>>().len();
        Ok(IntegrityResult { valid: errors.is_empty(), total_steps, verified_steps: total_steps - failed_steps, errors })
    }

    pub async fn export(&self, case_id: &str) -> Result<AuditExport, StorageError> {
        let events = self.get_chain(case_id).await?;
        let merkle_tree = self.build_merkle_tree(case_id).await?;
        let verified = self.verify_chain(case_id).await.unwrap_or(false);

        Ok(AuditExport {
            case_id: case_id.to_string(),
            events,
            merkle_root: merkle_tree.root_hash().map(|h| h.to_string()),
            exported_at: Utc::now(),
            verified,
        })
    }
}

/// One step that failed recomputation during [`AuditStore::verify_integrity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityError {
    pub step_index: usize,
    pub step_id: uuid::Uuid,
    pub reason: String,
}

/// The result of a full-chain integrity scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityResult {
    pub valid: bool,
    pub total_steps: usize,
    pub verified_steps: usize,
    pub errors: Vec<IntegrityError>,
}

/// A full audit trail export for one case, for compliance reporting or investigator review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub case_id: String,
    pub events: Vec<AuditEvent>,
    pub merkle_root: Option<String>,
    pub exported_at: DateTime<Utc>,
    pub verified: bool,
}

impl AuditExport {
    /// One JSON object per line, in chain order.
    pub fn to_jsonl(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use soc_core::{AgentIdentity, AutonomyLevel, TokenUsage};

    fn step(case_id: &str) -> AuditEvent {
        AuditEvent::new(
            case_id,
            0,
            AgentIdentity { name: "triage".into(), role: "Triage Analyst".into(), model: "gpt-4".into() },
            Some("v1.0".into()),
            AutonomyLevel::Autonomous,
            serde_json::json!({}),
            vec![],
            vec![],
            serde_json::json!({}),
            TokenUsage::ZERO,
        )
    }

    #[tokio::test]
    async fn steps_chain_within_a_case_and_stay_isolated_across_cases() {
        let backend = Arc::new(MemoryBackend::new());
        let store = AuditStore::new(backend);

        store.append(step("case-1")).await.unwrap();
        store.append(step("case-1")).await.unwrap();
        store.append(step("case-2")).await.unwrap();

        let chain1 = store.get_chain("case-1").await.unwrap();
        let chain2 = store.get_chain("case-2").await.unwrap();

        assert_eq!(chain1.len(), 2);
        assert_eq!(chain2.len(), 1);
        assert!(chain1[0].prev_hash.is_none());
        assert_eq!(chain1[1].prev_hash, Some(chain1[0].hash.clone()));

        assert!(store.verify_chain("case-1").await.unwrap());
        assert!(store.verify_chain("case-2").await.unwrap());
    }

    #[tokio::test]
    async fn tampered_step_fails_verification() {
        let backend = Arc::new(MemoryBackend::new());
        let store = AuditStore::new(backend.clone());

        let first = store.append(step("case-1")).await.unwrap();
        store.append(step("case-1")).await.unwrap();

        let mut tampered = first.clone();
        tampered.outputs = serde_json::json!({"tampered": true});
        backend.set(&store.step_key("case-1", tampered.step_id), &tampered).await.unwrap();

        assert!(!store.verify_chain("case-1").await.unwrap());
    }

    #[tokio::test]
    async fn verify_integrity_reports_the_tampered_step_index() {
        let backend = Arc::new(MemoryBackend::new());
        let store = AuditStore::new(backend.clone());

        store.append(step("case-1")).await.unwrap();
        let second = store.append(step("case-1")).await.unwrap();
        store.append(step("case-1")).await.unwrap();

        let mut tampered = second.clone();
        tampered.outputs = serde_json::json!({"tampered": true});
        backend.set(&store.step_key("case-1", tampered.step_id), &tampered).await.unwrap();

        let result = store.verify_integrity("case-1").await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.total_steps, 3);
        assert!(result.errors.iter().any(|e| e.step_index == 1));
    }
}
