//! Queue Backend Trait

use async_trait::async_trait;
use uuid::Uuid;
use crate::job::{JobEntry, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Job not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Enqueue a job payload, scoped to the tenant/case that owns it.
    async fn enqueue(
        &self,
        tenant_id: &str,
        job_type: &str,
        payload: serde_json::Value,
        delay_secs: Option<u64>,
    ) -> Result<Uuid, QueueError>;

    /// Pull next available job
    async fn dequeue(&self) -> Result<Option<JobEntry>, QueueError>;

    /// Update job status (ack/nack)
    /// `delay_secs` is used for retries - how long to wait before the job is available again
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
        delay_secs: Option<u64>,
    ) -> Result<(), QueueError>;

    /// Get job status, scoped to the tenant that enqueued it
    async fn get_status(&self, tenant_id: &str, id: Uuid) -> Result<JobStatus, QueueError>;

    /// Fetch the full job entry, scoped to the tenant that enqueued it
    async fn get_job(&self, tenant_id: &str, id: Uuid) -> Result<JobEntry, QueueError>;

    /// Record a job's result payload once it completes
    async fn set_result(&self, id: Uuid, result: serde_json::Value) -> Result<(), QueueError>;
}
