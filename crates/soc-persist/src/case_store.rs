//! Case record storage: the KV-backed home for `Case` rows and their final reports.

use soc_core::{Case, CaseStatus, EntityBag};
use std::sync::Arc;

use crate::backend::{StorageBackend, StorageError, StorageExt};

/// A completed case's final report, as persisted once the reporting stage finishes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CaseReport {
    pub case_id: String,
    pub incident_report: String,
    pub executive_summary: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Stores case rows and their terminal reports, keyed by tenant + case id.
#[derive(Debug)]
pub struct CaseStore<B: StorageBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: StorageBackend + ?Sized> CaseStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    fn case_key(&self, case_id: &str) -> String {
        format!("case:{case_id}")
    }

    fn report_key(&self, case_id: &str) -> String {
        format!("case:{case_id}:report")
    }

    pub async fn put(&self, case: &Case) -> Result<(), StorageError> {
        self.backend.set(&self.case_key(&case.id), case).await
    }

    pub async fn get(&self, case_id: &str) -> Result<Option<Case>, StorageError> {
        self.backend.get(&self.case_key(case_id)).await
    }

    pub async fn update_status(&self, case_id: &str, status: CaseStatus) -> Result<(), StorageError> {
        let mut case = self.get(case_id).await?.ok_or_else(|| StorageError::NotFound(case_id.to_string()))?;
        case.status = status;
        case.updated_at = chrono::Utc::now();
        self.put(&case).await
    }

    pub async fn update_entities(&self, case_id: &str, entities: EntityBag) -> Result<(), StorageError> {
        let mut case = self.get(case_id).await?.ok_or_else(|| StorageError::NotFound(case_id.to_string()))?;
        case.entities = entities;
        case.updated_at = chrono::Utc::now();
        self.put(&case).await
    }

    pub async fn put_report(&self, report: &CaseReport) -> Result<(), StorageError> {
        self.backend.set(&self.report_key(&report.case_id), report).await
    }

    pub async fn get_report(&self, case_id: &str) -> Result<Option<CaseReport>, StorageError> {
        self.backend.get(&self.report_key(case_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use soc_core::AutonomyLevel;

    #[tokio::test]
    async fn put_then_get_round_trips_a_case() {
        let store = CaseStore::new(Arc::new(MemoryBackend::new()));
        let case = Case::new("case-1", "tenant-a", "suspicious logon", AutonomyLevel::Autonomous, serde_json::json!({}));
        store.put(&case).await.unwrap();

        let fetched = store.get("case-1").await.unwrap().unwrap();
        assert_eq!(fetched.title, "suspicious logon");
    }

    #[tokio::test]
    async fn update_status_persists_the_new_status() {
        let store = CaseStore::new(Arc::new(MemoryBackend::new()));
        let case = Case::new("case-1", "tenant-a", "x", AutonomyLevel::Autonomous, serde_json::json!({}));
        store.put(&case).await.unwrap();

        store.update_status("case-1", CaseStatus::Closed).await.unwrap();
        let fetched = store.get("case-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, CaseStatus::Closed);
    }
}
