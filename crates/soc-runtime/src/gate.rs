//! Human approval gate: a `pending -> approved|rejected|expired` state machine.
//!
//! Stages gated by [`soc_core::AutonomyLevel::requires_approval_for_stage`] call
//! [`Gate::request`] and suspend on [`Gate::wait_for`] until a human decides or the
//! approval's timeout elapses.

use async_trait::async_trait;
use soc_core::{Approval, ApprovalStatus, AutonomyLevel};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("approval not found: {0}")]
    NotFound(Uuid),
    #[error("approval {0} was already decided")]
    AlreadyDecided(Uuid),
}

/// Outcome of waiting on a pending approval: either it reached a terminal state, or
/// the wait itself was cancelled (the approval remains pending for operator cleanup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

impl From<ApprovalStatus> for WaitOutcome {
    fn from(status: ApprovalStatus) -> Self {
        match status {
            ApprovalStatus::Approved => Self::Approved,
            ApprovalStatus::Rejected => Self::Rejected,
            ApprovalStatus::Expired => Self::Expired,
            ApprovalStatus::Pending => unreachable!("pending is not a terminal wait outcome"),
        }
    }
}

/// The human-in-the-loop approval gate contract.
#[async_trait]
pub trait Gate: Send + Sync {
    async fn request(
        &self,
        case_id: &str,
        stage: &str,
        description: &str,
        autonomy_level: AutonomyLevel,
    ) -> Uuid;

    async fn decide(
        &self,
        approval_id: Uuid,
        approved: bool,
        by: &str,
        reason: Option<String>,
    ) -> Result<(), GateError>;

    async fn wait_for(&self, approval_id: Uuid, timeout: Duration) -> WaitOutcome;

    async fn list_pending(&self, case_id: Option<&str>) -> Vec<Approval>;
}

struct PendingEntry {
    approval: Approval,
    #[allow(dead_code)]
    description: String,
    notify: Arc<Notify>,
}

/// In-memory reference implementation of [`Gate`]. Production deployments back this
/// with a persisted approval table so pending requests survive a restart; the state
/// machine and wake-up semantics are identical either way.
#[derive(Default)]
pub struct InMemoryGate {
    entries: RwLock<HashMap<Uuid, PendingEntry>>,
}

impl InMemoryGate {
    pub fn new() -> Self {
        Self::default()
    }

    async fn expire_if_due(&self, approval_id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&approval_id) {
            if entry.approval.status == ApprovalStatus::Pending && entry.approval.is_expired(chrono::Utc::now()) {
                entry.approval.status = ApprovalStatus::Expired;
                entry.approval.decided_at = Some(chrono::Utc::now());
                entry.notify.notify_waiters();
            }
        }
    }
}

#[async_trait]
impl Gate for InMemoryGate {
    async fn request(
        &self,
        case_id: &str,
        stage: &str,
        description: &str,
        autonomy_level: AutonomyLevel,
    ) -> Uuid {
        let approval = Approval::new(case_id, stage, autonomy_level.approval_timeout());
        let id = approval.id;
        self.entries.write().await.insert(
            id,
            PendingEntry { approval, description: description.to_string(), notify: Arc::new(Notify::new()) },
        );
        id
    }

    async fn decide(
        &self,
        approval_id: Uuid,
        approved: bool,
        by: &str,
        reason: Option<String>,
    ) -> Result<(), GateError> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&approval_id).ok_or(GateError::NotFound(approval_id))?;

        if entry.approval.status.is_terminal() {
            return Err(GateError::AlreadyDecided(approval_id));
        }

        entry.approval.status = if approved { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
        entry.approval.decided_at = Some(chrono::Utc::now());
        entry.approval.decided_by = Some(by.to_string());
        entry.approval.reason = reason;
        entry.notify.notify_waiters();
        Ok(())
    }

    async fn wait_for(&self, approval_id: Uuid, timeout: Duration) -> WaitOutcome {
        let notify = match self.entries.read().await.get(&approval_id) {
            Some(entry) => entry.notify.clone(),
            None => return WaitOutcome::Expired,
        };

        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            self.expire_if_due(approval_id).await;

            if let Some(entry) = self.entries.read().await.get(&approval_id) {
                if entry.approval.status.is_terminal() {
                    return entry.approval.status.into();
                }
            } else {
                return WaitOutcome::Expired;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                self.expire_if_due(approval_id).await;
                return self
                    .entries
                    .read()
                    .await
                    .get(&approval_id)
                    .map(|e| e.approval.status.into())
                    .unwrap_or(WaitOutcome::Expired);
            }

            let poll_interval = Duration::from_secs(1).min(remaining);
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    async fn list_pending(&self, case_id: Option<&str>) -> Vec<Approval> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| &e.approval)
            .filter(|a| a.status == ApprovalStatus::Pending)
            .filter(|a| case_id.map(|c| a.case_id == c).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decide_resolves_a_waiting_call() {
        let gate = InMemoryGate::new();
        let id = gate.request("case-1", "response", "contain host", AutonomyLevel::Manual).await;

        let gate = Arc::new(gate);
        let waiter_gate = gate.clone();
        let waiter = tokio::spawn(async move { waiter_gate.wait_for(id, Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.decide(id, true, "analyst1", None).await.unwrap();

        assert_eq!(waiter.await.unwrap(), WaitOutcome::Approved);
    }

    #[tokio::test]
    async fn decide_is_not_idempotent_on_a_terminal_approval() {
        let gate = InMemoryGate::new();
        let id = gate.request("case-1", "response", "contain host", AutonomyLevel::Manual).await;
        gate.decide(id, true, "analyst1", None).await.unwrap();
        let second = gate.decide(id, false, "analyst2", None).await;
        assert!(matches!(second, Err(GateError::AlreadyDecided(_))));
    }

    #[tokio::test]
    async fn wait_for_times_out_without_a_decision() {
        let gate = InMemoryGate::new();
        let id = gate.request("case-1", "investigation", "look into host", AutonomyLevel::Manual).await;
        let outcome = gate.wait_for(id, Duration::from_millis(50)).await;
        assert_eq!(outcome, WaitOutcome::Expired);
    }

    #[tokio::test]
    async fn list_pending_filters_by_case() {
        let gate = InMemoryGate::new();
        gate.request("case-1", "response", "x", AutonomyLevel::Manual).await;
        gate.request("case-2", "response", "y", AutonomyLevel::Manual).await;

        let pending = gate.list_pending(Some("case-1")).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].case_id, "case-1");
    }
}
