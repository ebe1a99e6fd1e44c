//! Application state: centralizes access to the store adapters, the orchestrator,
//! and the background job queue shared across handlers.

use std::sync::Arc;

use soc_llm::EmbeddingProvider;
use soc_persist::{AuditStore, CaseStore, GraphStore, KvStore, PromptStore, VectorStoreBackend};
use soc_queue::{QueueBackend, WorkerPool};
use soc_runtime::{Gate, Orchestrator};

#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn KvStore>,
    case_store: Arc<CaseStore<dyn KvStore>>,
    audit_store: Arc<AuditStore<dyn KvStore>>,
    prompt_store: Arc<PromptStore<dyn KvStore>>,
    orchestrator: Arc<Orchestrator<dyn KvStore>>,
    graph_store: Arc<dyn GraphStore>,
    vector_store: Arc<dyn VectorStoreBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    gate: Arc<dyn Gate>,
    queue: Arc<WorkerPool<dyn QueueBackend>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Arc<dyn KvStore>,
        case_store: Arc<CaseStore<dyn KvStore>>,
        audit_store: Arc<AuditStore<dyn KvStore>>,
        prompt_store: Arc<PromptStore<dyn KvStore>>,
        orchestrator: Arc<Orchestrator<dyn KvStore>>,
        graph_store: Arc<dyn GraphStore>,
        vector_store: Arc<dyn VectorStoreBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        gate: Arc<dyn Gate>,
        queue: Arc<WorkerPool<dyn QueueBackend>>,
    ) -> Self {
        Self {
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
        }
    }

    pub fn backend(&self) -> Arc<dyn KvStore> {
        self.backend.clone()
    }

    pub fn case_store(&self) -> Arc<CaseStore<dyn KvStore>> {
        self.case_store.clone()
    }

    pub fn audit_store(&self) -> Arc<AuditStore<dyn KvStore>> {
        self.audit_store.clone()
    }

    pub fn prompt_store(&self) -> Arc<PromptStore<dyn KvStore>> {
        self.prompt_store.clone()
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator<dyn KvStore>> {
        self.orchestrator.clone()
    }

    pub fn graph_store(&self) -> Arc<dyn GraphStore> {
        self.graph_store.clone()
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStoreBackend> {
        self.vector_store.clone()
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        self.embedder.clone()
    }

    pub fn gate(&self) -> Arc<dyn Gate> {
        self.gate.clone()
    }

    pub fn queue(&self) -> Arc<WorkerPool<dyn QueueBackend>> {
        self.queue.clone()
    }
}
