use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use soc_api::{routes::router, state::AppState};
use soc_core::{AutonomyLevel, Case};
use soc_llm::{EmbeddingProvider, LlmProvider, MockProvider};
use soc_persist::{
    AuditStore, CaseStore, KvStore, MemoryBackend, MemoryGraphStore, MemoryVectorStore,
    PromptStore, DEFAULT_DIMENSION,
};
use soc_queue::{MemoryQueue, QueueBackend, WorkerConfig, WorkerPool};
use soc_runtime::{
    CaseRecordClient, Gate, InMemoryGate, NoopCaseRecordClient, NoopSiemClient, Orchestrator,
    OrchestratorConfig, SiemClient,
};

async fn setup_state() -> AppState {
    let backend: Arc<dyn KvStore> = Arc::new(MemoryBackend::new());
    let case_store = Arc::new(CaseStore::new(backend.clone()));
    let audit_store = Arc::new(AuditStore::new(backend.clone()));
    let prompt_store = Arc::new(PromptStore::new(backend.clone()));
    let gate: Arc<dyn Gate> = Arc::new(InMemoryGate::new());
    let llm: Arc<dyn LlmProvider> = Arc::new(MockProvider::smart());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockProvider::smart());

    let orchestrator = Arc::new(Orchestrator::new(
        llm,
        prompt_store.clone(),
        audit_store.clone(),
        case_store.clone(),
        gate.clone(),
        backend.clone(),
        Arc::new(NoopSiemClient) as Arc<dyn SiemClient>,
        Arc::new(NoopCaseRecordClient) as Arc<dyn CaseRecordClient>,
        OrchestratorConfig::default(),
    ));

    let queue_backend: Arc<dyn QueueBackend> = Arc::new(MemoryQueue::default());
    let queue = Arc::new(WorkerPool::new_with_arc(queue_backend, WorkerConfig::default()));

    AppState::new(
        backend,
        case_store,
        audit_store,
        prompt_store,
        orchestrator,
        Arc::new(MemoryGraphStore::new()),
        Arc::new(MemoryVectorStore::new(DEFAULT_DIMENSION)),
        embedder,
        gate,
        queue,
    )
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_ok() {
    let state = setup_state().await;
    let app = router().with_state(state);

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn prompt_update_then_get_round_trips() {
    let state = setup_state().await;
    let app = router().with_state(state);

    let update_req = Request::builder()
        .method("POST")
        .uri("/prompts/triage")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({"content": "New triage instructions", "modified_by": "analyst-1"})
                .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(update_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["prompt"]["content"], "New triage instructions");

    let get_req = Request::builder()
        .uri("/prompts/triage/latest")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(get_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["prompt"]["content"], "New triage instructions");
}

#[tokio::test]
async fn audit_trail_is_empty_and_verifies_for_a_fresh_case() {
    let state = setup_state().await;
    let app = router().with_state(state);

    let req = Request::builder()
        .uri("/audit/case-does-not-exist")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_steps"], 0);

    let req = Request::builder()
        .uri("/audit/verify/case-does-not-exist")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["integrity_valid"], true);
}

#[tokio::test]
async fn approval_decide_flow_approves_a_pending_request() {
    let state = setup_state().await;
    let approval_id = state
        .gate()
        .request("case-1", "response", "containment action needs sign-off", AutonomyLevel::Supervised)
        .await;

    let app = router().with_state(state);

    let list_req = Request::builder()
        .uri("/api/approvals")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(list_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let pending = body_json(response).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let decide_req = Request::builder()
        .method("POST")
        .uri(format!("/api/approvals/{approval_id}/approve"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(decide_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "approved");

    let list_req = Request::builder()
        .uri("/api/approvals")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(list_req).await.unwrap();
    let pending = body_json(response).await;
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn knowledge_ingest_then_search_round_trips() {
    let state = setup_state().await;
    let app = router().with_state(state);

    let ingest_req = Request::builder()
        .method("POST")
        .uri("/knowledge/ingest")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "title": "Credential stuffing playbook",
                "content": "Rotate credentials and force re-authentication across all sessions",
                "type": "playbook",
                "tags": ["credentials", "containment"]
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(ingest_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ingested = body_json(response).await;
    assert_eq!(ingested["status"], "ingested");
    assert!(ingested["knowledge_id"].as_str().is_some());

    let search_req = Request::builder()
        .uri("/knowledge/search?query=credential%20stuffing&limit=5")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(search_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let results = body_json(response).await;
    assert!(results.as_array().unwrap().len() <= 5);
}

#[tokio::test]
async fn active_cases_filters_out_closed_ones() {
    let state = setup_state().await;

    let open_case = Case::new("case-open", "tenant-a", "suspicious logon", AutonomyLevel::Autonomous, serde_json::json!({}));
    state.case_store().put(&open_case).await.unwrap();

    let mut closed_case = Case::new("case-closed", "tenant-a", "resolved phishing report", AutonomyLevel::Autonomous, serde_json::json!({}));
    closed_case.status = soc_core::CaseStatus::Closed;
    state.case_store().put(&closed_case).await.unwrap();

    let app = router().with_state(state);

    let req = Request::builder()
        .uri("/api/cases/active")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let active = body_json(response).await;
    let active_ids: Vec<&str> = active.as_array().unwrap().iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(active_ids, vec!["case-open"]);

    let req = Request::builder()
        .uri("/api/cases/all")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let all = body_json(response).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}
