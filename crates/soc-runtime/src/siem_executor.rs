//! Bounded-concurrency SIEM query execution with result caching.
//!
//! Eligible detections sharing an `event_filter` are grouped into a single query whose
//! time window spans the group (see [`crate::eligibility::deduplicate_queries`]); each
//! query is cached by a hash of its filter and window, and results are fanned back out
//! to every detection that contributed to the group.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use soc_core::EligibleDetection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 3;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAGE_LIMIT: usize = 1000;

/// A client capable of executing one SIEM query. Implemented by the HTTP adapter that
/// talks to the actual SIEM; a fake implementation drives the unit tests below.
#[async_trait::async_trait]
pub trait SiemClient: Send + Sync {
    async fn search_events(
        &self,
        event_filter: &str,
        from_ms: i64,
        to_ms: i64,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, String>;
}

/// A merged query built from one or more detections sharing an `event_filter`.
#[derive(Debug, Clone)]
pub struct SiemQuery {
    pub query_hash: String,
    pub event_filter: String,
    pub from_ms: i64,
    pub to_ms: i64,
    pub source_detection_ids: Vec<String>,
}

/// Result of executing one [`SiemQuery`], shaped per the external query-executor contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiemResult {
    pub query_id: String,
    pub events: Vec<serde_json::Value>,
    pub total_count: usize,
    pub execution_time_ms: u64,
    pub query_hash: String,
    pub source_detection_ids: Vec<String>,
    pub pagination_info: PaginationInfo,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub limit: usize,
    pub has_more: bool,
}

/// Executes SIEM queries with cross-call caching and bounded fan-out concurrency.
pub struct SiemExecutor<C: SiemClient + ?Sized> {
    client: Arc<C>,
    cache: tokio::sync::RwLock<HashMap<String, SiemResult>>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    page_limit: usize,
}

fn query_hash(event_filter: &str, from_ms: i64, to_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{event_filter}:{from_ms}:{to_ms}").as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Build one merged query per distinct `event_filter`, widening the time window to
/// span every contributing detection.
pub fn build_queries(groups: &[(String, Vec<EligibleDetection>)]) -> Vec<SiemQuery> {
    groups
        .iter()
        .map(|(event_filter, detections)| {
            let from_ms = detections.iter().map(|d| d.from_time).min().unwrap_or(0);
            let to_ms = detections.iter().map(|d| d.to_time).max().unwrap_or(0);
            SiemQuery {
                query_hash: query_hash(event_filter, from_ms, to_ms),
                event_filter: event_filter.clone(),
                from_ms,
                to_ms,
                source_detection_ids: detections.iter().map(|d| d.detection_id.clone()).collect(),
            }
        })
        .collect()
}

impl<C: SiemClient + ?Sized> SiemExecutor<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self::with_config(client, DEFAULT_MAX_CONCURRENT_QUERIES, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_PAGE_LIMIT)
    }

    pub fn with_config(client: Arc<C>, max_concurrent: usize, timeout_secs: u64, page_limit: usize) -> Self {
        Self {
            client,
            cache: tokio::sync::RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            timeout: Duration::from_secs(timeout_secs),
            page_limit,
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    async fn execute_single(&self, query: &SiemQuery) -> SiemResult {
        if let Some(cached) = self.cache.read().await.get(&query.query_hash) {
            return cached.clone();
        }

        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        let started = std::time::Instant::now();

        let outcome = tokio::time::timeout(
            self.timeout,
            self.client
                .search_events(&query.event_filter, query.from_ms, query.to_ms, self.page_limit),
        )
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(events)) => {
                let total_count = events.len();
                let has_more = events.len() >= self.page_limit;
                SiemResult {
                    query_id: query.query_hash.clone(),
                    events,
                    total_count,
                    execution_time_ms: elapsed_ms,
                    query_hash: query.query_hash.clone(),
                    source_detection_ids: query.source_detection_ids.clone(),
                    pagination_info: PaginationInfo { limit: self.page_limit, has_more },
                    error: None,
                }
            }
            Ok(Err(e)) => SiemResult {
                query_id: query.query_hash.clone(),
                events: Vec::new(),
                total_count: 0,
                execution_time_ms: elapsed_ms,
                query_hash: query.query_hash.clone(),
                source_detection_ids: query.source_detection_ids.clone(),
                pagination_info: PaginationInfo { limit: self.page_limit, has_more: false },
                error: Some(e),
            },
            Err(_) => SiemResult {
                query_id: query.query_hash.clone(),
                events: Vec::new(),
                total_count: 0,
                execution_time_ms: elapsed_ms,
                query_hash: query.query_hash.clone(),
                source_detection_ids: query.source_detection_ids.clone(),
                pagination_info: PaginationInfo { limit: self.page_limit, has_more: false },
                error: Some("query timed out".to_string()),
            },
        };

        if result.error.is_none() {
            self.cache.write().await.insert(query.query_hash.clone(), result.clone());
        }

        result
    }

    /// Execute every query concurrently, bounded by the configured semaphore width.
    pub async fn run_queries(&self, queries: &[SiemQuery]) -> Vec<SiemResult> {
        let futures = queries.iter().map(|q| self.execute_single(q));
        futures::future::join_all(futures).await
    }

    /// Fan a result set back out to a per-detection view: every detection that
    /// contributed to a merged query sees that query's full result.
    pub fn fan_out(results: &[SiemResult]) -> HashMap<String, SiemResult> {
        let mut by_detection = HashMap::new();
        for result in results {
            for detection_id in &result.source_detection_ids {
                by_detection.insert(detection_id.clone(), result.clone());
            }
        }
        by_detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soc_core::EligibleDetection;

    struct FakeClient {
        events: Vec<serde_json::Value>,
    }

    #[async_trait::async_trait]
    impl SiemClient for FakeClient {
        async fn search_events(
            &self,
            _event_filter: &str,
            _from_ms: i64,
            _to_ms: i64,
            _limit: usize,
        ) -> Result<Vec<serde_json::Value>, String> {
            Ok(self.events.clone())
        }
    }

    struct FailingClient;

    #[async_trait::async_trait]
    impl SiemClient for FailingClient {
        async fn search_events(
            &self,
            _event_filter: &str,
            _from_ms: i64,
            _to_ms: i64,
            _limit: usize,
        ) -> Result<Vec<serde_json::Value>, String> {
            Err("siem unavailable".to_string())
        }
    }

    fn detection(id: &str, filter: &str, from: i64, to: i64) -> EligibleDetection {
        EligibleDetection {
            detection_id: id.into(),
            rule_name: "factX".into(),
            event_filter: filter.into(),
            from_time: from,
            to_time: to,
        }
    }

    #[tokio::test]
    async fn builds_one_query_per_distinct_filter_widening_window() {
        let groups = vec![(
            "user=alice".to_string(),
            vec![detection("d1", "user=alice", 100, 200), detection("d2", "user=alice", 50, 150)],
        )];
        let queries = build_queries(&groups);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].from_ms, 50);
        assert_eq!(queries[0].to_ms, 200);
        assert_eq!(queries[0].source_detection_ids, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn caches_successful_results_by_query_hash() {
        let client = Arc::new(FakeClient { events: vec![serde_json::json!({"id": 1})] });
        let executor = SiemExecutor::new(client);
        let query = SiemQuery {
            query_hash: "abc123".into(),
            event_filter: "user=alice".into(),
            from_ms: 0,
            to_ms: 1,
            source_detection_ids: vec!["d1".into()],
        };

        let first = executor.execute_single(&query).await;
        assert_eq!(first.total_count, 1);
        assert!(executor.cache.read().await.contains_key("abc123"));
    }

    #[tokio::test]
    async fn failures_are_not_cached_and_surface_as_error() {
        let client = Arc::new(FailingClient);
        let executor = SiemExecutor::new(client);
        let query = SiemQuery {
            query_hash: "fail1".into(),
            event_filter: "user=bob".into(),
            from_ms: 0,
            to_ms: 1,
            source_detection_ids: vec!["d2".into()],
        };

        let result = executor.execute_single(&query).await;
        assert!(result.error.is_some());
        assert!(result.events.is_empty());
        assert!(!executor.cache.read().await.contains_key("fail1"));
    }

    #[tokio::test]
    async fn fan_out_assigns_shared_query_result_to_every_contributing_detection() {
        let result = SiemResult {
            query_id: "q1".into(),
            events: vec![],
            total_count: 0,
            execution_time_ms: 5,
            query_hash: "q1".into(),
            source_detection_ids: vec!["d1".into(), "d2".into()],
            pagination_info: PaginationInfo { limit: 1000, has_more: false },
            error: None,
        };
        let by_detection = SiemExecutor::<FakeClient>::fan_out(&[result]);
        assert_eq!(by_detection.len(), 2);
        assert!(by_detection.contains_key("d1"));
        assert!(by_detection.contains_key("d2"));
    }
}
