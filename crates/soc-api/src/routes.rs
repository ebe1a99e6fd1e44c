//! HTTP route handlers implementing the external interface (§6 of the design notes).

use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use soc_core::{Approval, AuditEvent, AutonomyLevel, Case, EntityBag, KnowledgeItem};
use soc_llm::EmbeddingProvider;
use soc_persist::{CaseReport, GraphSnapshot, GraphStore, NodeKind, StorageBackend, StorageExt, VectorEmbedding, VectorStoreBackend};
use soc_runtime::GateError;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const KNOWLEDGE_COLLECTION: &str = "knowledge_base";

fn gate_error_to_api(e: GateError) -> ApiError {
    match e {
        GateError::NotFound(id) => ApiError::NotFound(format!("approval {id} not found")),
        GateError::AlreadyDecided(id) => ApiError::Conflict(format!("approval {id} already decided")),
    }
}

// ---------- enrichment ----------

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnrichRequest {
    #[serde(default = "default_autonomy")]
    pub autonomy_level: AutonomyLevel,
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,
    #[serde(default)]
    pub include_raw_logs: bool,
}

fn default_autonomy() -> AutonomyLevel {
    AutonomyLevel::Supervised
}

fn default_max_depth() -> u8 {
    3
}

#[utoipa::path(post, path = "/cases/{case_id}/enrich", responses((status = 200, description = "pipeline result for the case")))]
pub async fn enrich_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(body): Json<EnrichRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    // include_raw_logs scopes what the caller attached to the case's raw_data before
    // submission; the pipeline itself always reads whatever raw_data the case carries.
    let _ = body.include_raw_logs;

    let result = state
        .orchestrator()
        .process(&case_id, body.autonomy_level, body.max_depth)
        .await
        .map_err(ApiError::Internal)?;

    serde_json::to_value(result).map(Json).map_err(|e| ApiError::Internal(e.to_string()))
}

// ---------- audit trail ----------

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditResponse {
    pub case_id: String,
    pub audit_trail: Vec<AuditEvent>,
    pub total_steps: usize,
}

#[utoipa::path(get, path = "/audit/{case_id}", responses((status = 200, description = "the case's audit trail")))]
pub async fn get_audit(State(state): State<AppState>, Path(case_id): Path<String>) -> ApiResult<Json<AuditResponse>> {
    let audit_trail = state.audit_store().get_chain(&case_id).await.map_err(ApiError::from)?;
    let total_steps = audit_trail.len();
    Ok(Json(AuditResponse { case_id, audit_trail, total_steps }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditVerifyResponse {
    pub case_id: String,
    pub valid: bool,
    pub total_steps: usize,
    pub verified_steps: usize,
    pub errors: Vec<soc_persist::IntegrityError>,
}

#[utoipa::path(get, path = "/audit/verify/{case_id}", responses((status = 200, description = "hash-chain integrity check")))]
pub async fn verify_audit(State(state): State<AppState>, Path(case_id): Path<String>) -> ApiResult<Json<AuditVerifyResponse>> {
    let result = state.audit_store().verify_integrity(&case_id).await.map_err(ApiError::from)?;
    Ok(Json(AuditVerifyResponse {
        case_id,
        valid: result.valid,
        total_steps: result.total_steps,
        verified_steps: result.verified_steps,
        errors: result.errors,
    }))
}

// ---------- prompts ----------

#[derive(Debug, Deserialize)]
pub struct PromptQuery {
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptBody {
    pub content: String,
    pub version: String,
    pub created_at: chrono::DateTime<Utc>,
    pub modified_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub agent: String,
    pub prompt: PromptBody,
    pub version: String,
}

pub async fn get_prompt(
    State(state): State<AppState>,
    Path(agent_name): Path<String>,
    Query(q): Query<PromptQuery>,
) -> ApiResult<Json<PromptResponse>> {
    let prompt = state
        .prompt_store()
        .get_info(&agent_name, q.version.as_deref())
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("no prompt version for agent '{agent_name}'")))?;

    Ok(Json(PromptResponse {
        agent: agent_name,
        version: prompt.version.clone(),
        prompt: PromptBody {
            content: prompt.template,
            version: prompt.version,
            created_at: prompt.created_at,
            modified_by: prompt.modified_by,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePromptRequest {
    pub content: String,
    pub modified_by: String,
}

pub async fn update_prompt(
    State(state): State<AppState>,
    Path(agent_name): Path<String>,
    Json(body): Json<UpdatePromptRequest>,
) -> ApiResult<Json<PromptResponse>> {
    let prompt = state
        .prompt_store()
        .update(&agent_name, body.content, Some(body.modified_by))
        .await
        .map_err(ApiError::from)?;

    Ok(Json(PromptResponse {
        agent: agent_name,
        version: prompt.version.clone(),
        prompt: PromptBody {
            content: prompt.template,
            version: prompt.version,
            created_at: prompt.created_at,
            modified_by: prompt.modified_by,
        },
    }))
}

pub async fn get_latest_prompt(State(state): State<AppState>, Path(agent_name): Path<String>) -> ApiResult<Json<PromptResponse>> {
    let prompt = state.prompt_store().get(&agent_name).await.map_err(ApiError::from)?;

    Ok(Json(PromptResponse {
        agent: agent_name,
        version: prompt.version.clone(),
        prompt: PromptBody {
            content: prompt.template,
            version: prompt.version,
            created_at: prompt.created_at,
            modified_by: prompt.modified_by,
        },
    }))
}

// ---------- cases ----------

async fn list_cases(state: &AppState, active_only: bool) -> ApiResult<Vec<Case>> {
    let backend = state.backend();
    let keys = backend.list_keys("case:").await.map_err(ApiError::from)?;

    let mut cases = Vec::new();
    for key in keys {
        if key.contains(":report") {
            continue;
        }
        if let Some(case) = backend.get::<Case>(&key).await.map_err(ApiError::from)? {
            let is_active = !matches!(
                case.status,
                soc_core::CaseStatus::Closed | soc_core::CaseStatus::Partial | soc_core::CaseStatus::Failed
            );
            if !active_only || is_active {
                cases.push(case);
            }
        }
    }
    cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(cases)
}

pub async fn list_active_cases(State(state): State<AppState>) -> ApiResult<Json<Vec<Case>>> {
    Ok(Json(list_cases(&state, true).await?))
}

pub async fn list_all_cases(State(state): State<AppState>) -> ApiResult<Json<Vec<Case>>> {
    Ok(Json(list_cases(&state, false).await?))
}

#[derive(Debug, Serialize)]
pub struct CaseAnalysisResponse {
    pub case: Case,
    pub audit_trail: Vec<AuditEvent>,
}

pub async fn get_case_analysis(State(state): State<AppState>, Path(case_id): Path<String>) -> ApiResult<Json<CaseAnalysisResponse>> {
    let case = state
        .case_store()
        .get(&case_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("case {case_id} not found")))?;
    let audit_trail = state.audit_store().get_chain(&case_id).await.map_err(ApiError::from)?;
    Ok(Json(CaseAnalysisResponse { case, audit_trail }))
}

pub async fn get_case_reports(State(state): State<AppState>, Path(case_id): Path<String>) -> ApiResult<Json<Vec<CaseReport>>> {
    let report = state.case_store().get_report(&case_id).await.map_err(ApiError::from)?;
    Ok(Json(report.into_iter().collect()))
}

pub async fn download_report(
    State(state): State<AppState>,
    Path((case_id, report_type)): Path<(String, String)>,
) -> ApiResult<String> {
    let report = state
        .case_store()
        .get_report(&case_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("no report for case {case_id}")))?;

    match report_type.as_str() {
        "incident" | "incident_report" => Ok(report.incident_report),
        "executive" | "executive_summary" => Ok(report.executive_summary),
        other => Err(ApiError::BadRequest(format!("unknown report type: {other}"))),
    }
}

// ---------- approvals ----------

#[derive(Debug, Deserialize)]
pub struct ApprovalListQuery {
    #[allow(dead_code)]
    pub status: Option<String>,
}

/// `InMemoryGate::list_pending` only retains approvals still awaiting a decision, so
/// `?status=pending` and the unfiltered form return the same set here; there is no
/// retained history of approved/rejected/expired approvals to filter against.
pub async fn list_approvals(State(state): State<AppState>, Query(_q): Query<ApprovalListQuery>) -> Json<Vec<Approval>> {
    Json(state.gate().list_pending(None).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub decision: Decision,
    pub reason: Option<String>,
}

pub async fn decide_approval(
    State(state): State<AppState>,
    Path(approval_id): Path<Uuid>,
    Json(body): Json<DecideRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let approved = matches!(body.decision, Decision::Approved);
    state.gate().decide(approval_id, approved, "api", body.reason).await.map_err(gate_error_to_api)?;
    Ok(Json(serde_json::json!({"status": if approved { "approved" } else { "rejected" }})))
}

pub async fn approve_approval(State(state): State<AppState>, Path(approval_id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    state.gate().decide(approval_id, true, "api", None).await.map_err(gate_error_to_api)?;
    Ok(Json(serde_json::json!({"status": "approved"})))
}

pub async fn reject_approval(State(state): State<AppState>, Path(approval_id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    state.gate().decide(approval_id, false, "api", None).await.map_err(gate_error_to_api)?;
    Ok(Json(serde_json::json!({"status": "rejected"})))
}

// ---------- token stats ----------

#[derive(Debug, Serialize)]
pub struct DailyUsage {
    pub date: String,
    pub tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct StageUsage {
    pub stage: String,
    pub tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct TokenStatsResponse {
    pub daily_usage: Vec<DailyUsage>,
    pub total_today: u64,
    pub cost_today: f64,
    pub usage_by_stage: Vec<StageUsage>,
}

pub async fn get_token_stats(State(state): State<AppState>) -> ApiResult<Json<TokenStatsResponse>> {
    let backend = state.backend();
    let keys = backend.list_keys("case:").await.map_err(ApiError::from)?;
    let today = Utc::now().date_naive();

    let mut by_day: BTreeMap<String, (u64, f64)> = BTreeMap::new();
    let mut by_stage: BTreeMap<String, (u64, f64)> = BTreeMap::new();
    let mut total_today = 0u64;
    let mut cost_today = 0.0;

    for key in keys {
        let Some(case_id) = key.strip_prefix("case:").filter(|rest| !rest.contains(':')) else {
            continue;
        };

        for event in state.audit_store().get_chain(case_id).await.map_err(ApiError::from)? {
            let day = event.timestamp.date_naive();
            let day_entry = by_day.entry(day.to_string()).or_insert((0, 0.0));
            day_entry.0 += event.token_usage.total_tokens as u64;
            day_entry.1 += event.token_usage.cost_usd;

            let stage_entry = by_stage.entry(event.agent.role.clone()).or_insert((0, 0.0));
            stage_entry.0 += event.token_usage.total_tokens as u64;
            stage_entry.1 += event.token_usage.cost_usd;

            if day == today {
                total_today += event.token_usage.total_tokens as u64;
                cost_today += event.token_usage.cost_usd;
            }
        }
    }

    Ok(Json(TokenStatsResponse {
        daily_usage: by_day.into_iter().map(|(date, (tokens, cost_usd))| DailyUsage { date, tokens, cost_usd }).collect(),
        total_today,
        cost_today,
        usage_by_stage: by_stage.into_iter().map(|(stage, (tokens, cost_usd))| StageUsage { stage, tokens, cost_usd }).collect(),
    }))
}

// ---------- knowledge graph ----------

#[utoipa::path(get, path = "/api/knowledge-graph", responses((status = 200, description = "the full case/rule/entity/knowledge graph")))]
pub async fn get_knowledge_graph(State(state): State<AppState>) -> Json<GraphSnapshot> {
    Json(state.graph_store().snapshot().await)
}

// ---------- knowledge ingest/search ----------

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub knowledge_id: String,
}

pub async fn ingest_knowledge(State(state): State<AppState>, Json(body): Json<IngestRequest>) -> ApiResult<Json<IngestResponse>> {
    let knowledge_id = Uuid::new_v4().to_string();
    // Open question: vector-store ids for knowledge items are UUIDv5 of a fixed
    // namespace + the knowledge id, so the vector row's id is reproducible from the
    // knowledge id alone even though the KV record above is always overwritten.
    let vector_id = Uuid::new_v5(&Uuid::NAMESPACE_URL, knowledge_id.as_bytes()).to_string();

    let item = KnowledgeItem {
        knowledge_id: knowledge_id.clone(),
        case_id: String::new(),
        summary: body.content.clone(),
        entities: EntityBag::default(),
        metadata: BTreeMap::from([
            ("title".to_string(), serde_json::Value::String(body.title.clone())),
            ("type".to_string(), serde_json::Value::String(body.item_type.clone())),
            ("tags".to_string(), serde_json::json!(body.tags)),
        ]),
        created_at: Utc::now(),
    };
    state.backend().set(&format!("knowledge:{knowledge_id}"), &item).await.map_err(ApiError::from)?;

    let vector = state.embedder().embed(&body.content).await.map_err(ApiError::from)?;
    state
        .vector_store()
        .ensure_collection(KNOWLEDGE_COLLECTION, vector.len())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .vector_store()
        .add(
            KNOWLEDGE_COLLECTION,
            VectorEmbedding {
                id: vector_id,
                vector,
                payload_id: Some(knowledge_id.clone()),
                metadata: HashMap::from([("title".to_string(), body.title.clone())]),
            },
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    state
        .graph_store()
        .merge_node(
            NodeKind::KnowledgeItem,
            &knowledge_id,
            HashMap::from([("title".to_string(), body.title), ("type".to_string(), body.item_type)]),
        )
        .await;

    Ok(Json(IngestResponse { status: "ingested".to_string(), knowledge_id }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub knowledge_id: String,
    pub score: f32,
    pub item: Option<KnowledgeItem>,
}

pub async fn search_knowledge(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> ApiResult<Json<Vec<SearchResult>>> {
    let vector = state.embedder().embed(&q.query).await.map_err(ApiError::from)?;
    let hits = state
        .vector_store()
        .search(KNOWLEDGE_COLLECTION, &vector, q.limit)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut results = Vec::with_capacity(hits.len());
    for (score, embedding) in hits {
        let knowledge_id = embedding.payload_id.unwrap_or_default();
        let item = state.backend().get::<KnowledgeItem>(&format!("knowledge:{knowledge_id}")).await.map_err(ApiError::from)?;
        results.push(SearchResult { knowledge_id, score, item });
    }
    Ok(Json(results))
}

// ---------- health ----------

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "liveness check")))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub components: Vec<ComponentHealth>,
}

pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let components = vec![ComponentHealth { name: "store".to_string(), healthy: state.backend().is_healthy().await }];
    let status = if components.iter().all(|c| c.healthy) { "ok" } else { "degraded" };
    Json(DetailedHealthResponse { status: status.to_string(), version: env!("CARGO_PKG_VERSION").to_string(), components })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cases/{case_id}/enrich", post(enrich_case))
        .route("/audit/{case_id}", get(get_audit))
        .route("/audit/verify/{case_id}", get(verify_audit))
        .route("/prompts/{agent_name}", get(get_prompt).post(update_prompt))
        .route("/prompts/{agent_name}/latest", get(get_latest_prompt))
        .route("/api/cases/active", get(list_active_cases))
        .route("/api/cases/all", get(list_all_cases))
        .route("/api/cases/{case_id}/analysis", get(get_case_analysis))
        .route("/api/cases/{case_id}/reports", get(get_case_reports))
        .route("/api/reports/{case_id}/download/{report_type}", get(download_report))
        .route("/api/approvals", get(list_approvals))
        .route("/api/approvals/{approval_id}/decide", post(decide_approval))
        .route("/api/approvals/{approval_id}/approve", post(approve_approval))
        .route("/api/approvals/{approval_id}/reject", post(reject_approval))
        .route("/api/stats/tokens", get(get_token_stats))
        .route("/api/knowledge-graph", get(get_knowledge_graph))
        .route("/knowledge/ingest", post(ingest_knowledge))
        .route("/knowledge/search", get(search_knowledge))
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
}
