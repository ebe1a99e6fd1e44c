//! SOC API server: builds the shared [`AppState`] from the environment and
//! runs the axum app with graceful shutdown.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::compression::CompressionLayer;

use crate::error::ApiError;
use crate::middleware::{
    body_limit_layer, cors_layer, request_id_middleware, timeout_layer, tracing_middleware,
};
use crate::state::AppState;
use soc_llm::{EmbeddingProvider, LlmProvider, MockProvider, OpenAIProvider};
use soc_persist::{
    AuditStore, CaseStore, GraphStore, KvStore, MemoryBackend, MemoryGraphStore, MemoryVectorStore,
    PromptStore, SqliteBackend, VectorStoreBackend, DEFAULT_DIMENSION,
};
use soc_queue::{MemoryQueue, QueueBackend, WorkerConfig, WorkerPool};
use soc_runtime::{
    CaseRecordClient, Gate, HttpCaseRecordClient, HttpSiemClient, InMemoryGate,
    NoopCaseRecordClient, NoopSiemClient, Orchestrator, OrchestratorConfig, SiemClient,
};

/// Server configuration, loaded from `SOC_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub timeout: Duration,
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".parse().unwrap(),
            timeout: Duration::from_secs(30),
            max_body_size: 4 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("SOC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let timeout_secs: u64 = std::env::var("SOC_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(30);

        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            timeout: Duration::from_secs(timeout_secs),
            ..Default::default()
        }
    }
}

/// The SOC case-enrichment API server.
pub struct SocApiServer {
    config: ServerConfig,
    app_state: AppState,
}

impl SocApiServer {
    /// Build the server, wiring a SQLite-backed store when `DATABASE_URL` is
    /// set and falling back to an in-memory backend otherwise (tests, local
    /// dev). The LLM provider follows the same pattern: `OPENAI_API_KEY`
    /// selects [`OpenAIProvider`], absence falls back to [`MockProvider`].
    pub async fn new(config: ServerConfig) -> Result<Self, ApiError> {
        let backend: Arc<dyn KvStore> = match std::env::var("DATABASE_URL") {
            Ok(url) => Arc::new(
                SqliteBackend::new(&url)
                    .await
                    .map_err(|e| ApiError::Internal(format!("storage init failed: {e}")))?,
            ),
            Err(_) => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage backend");
                Arc::new(MemoryBackend::new())
            }
        };

        let case_store = Arc::new(CaseStore::new(backend.clone()));
        let audit_store = Arc::new(AuditStore::new(backend.clone()));
        let prompt_store = Arc::new(PromptStore::new(backend.clone()));

        let gate: Arc<dyn Gate> = Arc::new(InMemoryGate::new());

        let llm: Arc<dyn LlmProvider> = if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            tracing::info!("initializing OpenAI provider");
            Arc::new(OpenAIProvider::new(&key, "gpt-4"))
        } else {
            tracing::warn!("OPENAI_API_KEY not set, using mock LLM provider");
            Arc::new(MockProvider::smart())
        };

        // MockProvider is the only EmbeddingProvider impl in this workspace;
        // knowledge-base embeddings don't yet have a real-provider path.
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockProvider::smart());

        let siem_client: Arc<dyn SiemClient> =
            match (std::env::var("SIEM_API_URL"), std::env::var("SIEM_API_TOKEN")) {
                (Ok(url), Ok(token)) => {
                    tracing::info!("initializing HTTP SIEM client");
                    Arc::new(HttpSiemClient::new(&url, &token))
                }
                _ => {
                    tracing::warn!("SIEM_API_URL/SIEM_API_TOKEN not set, using a no-op SIEM client");
                    Arc::new(NoopSiemClient)
                }
            };

        let case_record_client: Arc<dyn CaseRecordClient> = match (
            std::env::var("CASE_RECORD_API_URL"),
            std::env::var("CASE_RECORD_API_TOKEN"),
        ) {
            (Ok(url), Ok(token)) => {
                tracing::info!("initializing HTTP case-record client");
                Arc::new(HttpCaseRecordClient::new(&url, &token))
            }
            _ => {
                tracing::warn!("CASE_RECORD_API_URL/CASE_RECORD_API_TOKEN not set, using a no-op case-record client");
                Arc::new(NoopCaseRecordClient)
            }
        };

        let orchestrator = Arc::new(Orchestrator::new(
            llm,
            prompt_store.clone(),
            audit_store.clone(),
            case_store.clone(),
            gate.clone(),
            backend.clone(),
            siem_client,
            case_record_client,
            OrchestratorConfig::default(),
        ));

        let graph_store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let vector_store: Arc<dyn VectorStoreBackend> =
            Arc::new(MemoryVectorStore::new(DEFAULT_DIMENSION));

        let queue_backend: Arc<dyn QueueBackend> = Arc::new(MemoryQueue::default());
        let queue = Arc::new(WorkerPool::new_with_arc(queue_backend, WorkerConfig::default()));

        let app_state = AppState::new(
            backend,
            case_store,
            audit_store,
            prompt_store,
            orchestrator,
            graph_store,
            vector_store,
            embedder,
            gate,
            queue,
        );

        Ok(Self { config, app_state })
    }

    /// The fully layered router: routes plus CORS, compression, body limits,
    /// timeouts, request ids, and tracing.
    pub fn router(&self) -> Router {
        crate::routes::router()
            .with_state(self.app_state.clone())
            .layer(CompressionLayer::new())
            .layer(body_limit_layer(self.config.max_body_size))
            .layer(timeout_layer(self.config.timeout))
            .layer(cors_layer())
            .layer(middleware::from_fn(request_id_middleware))
            .layer(middleware::from_fn(tracing_middleware))
    }

    /// Run the server until a shutdown signal arrives, draining in-flight
    /// requests and stopping the background worker pool.
    pub async fn run(self) -> Result<(), ApiError> {
        let app = self.router();
        let addr = self.config.addr;

        let queue = self.app_state.queue();
        tokio::spawn(async move {
            queue.start().await;
        });

        tracing::info!("SOC API listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::Internal(format!("bind failed: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::Internal(format!("server error: {e}")))?;

        tracing::info!("server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Initialize the tracing subscriber from `RUST_LOG`, defaulting to info.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,soc_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_on_8080() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
