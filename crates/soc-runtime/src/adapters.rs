//! Thin HTTP adapters to the two external systems the pipeline depends on but
//! doesn't own: the SIEM query endpoint and the case-record store that holds the
//! raw alerts the enrichment stage dedupes against. Shaped like `soc_llm`'s
//! `OpenAIProvider`: a `reqwest::Client`, bearer auth, JSON (de)serialization,
//! explicit error mapping instead of panics.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::siem_executor::SiemClient;

/// Talks to the SIEM's query API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSiemClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpSiemClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.trim_end_matches('/').to_string(), token: token.to_string() }
    }
}

#[derive(Debug, Deserialize)]
struct SiemSearchResponse {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    events: Vec<Value>,
}

#[async_trait]
impl SiemClient for HttpSiemClient {
    async fn search_events(
        &self,
        event_filter: &str,
        from_ms: i64,
        to_ms: i64,
        limit: usize,
    ) -> Result<Vec<Value>, String> {
        let from_iso = chrono::DateTime::from_timestamp_millis(from_ms).unwrap_or_default().to_rfc3339();
        let to_iso = chrono::DateTime::from_timestamp_millis(to_ms).unwrap_or_default().to_rfc3339();

        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .bearer_auth(&self.token)
            .query(&[
                ("event_filter", event_filter),
                ("from", from_iso.as_str()),
                ("to", to_iso.as_str()),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| format!("siem connection failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("siem query failed: status {status}, body {body}"));
        }

        let parsed: SiemSearchResponse =
            response.json().await.map_err(|e| format!("siem response was not valid JSON: {e}"))?;
        let _ = parsed.count;
        Ok(parsed.events)
    }
}

/// A raw case record as returned by the case-record store, consumed by the
/// enrichment stage to decide which candidates to keep or skip.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawCase {
    pub case_id: String,
    pub rule_name: String,
    #[serde(default)]
    pub rule_type: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// Classifies a `rule_type` from a `rule_name` prefix when the record omits it.
pub fn classify_rule_type(rule_name: &str) -> String {
    let lower = rule_name.to_lowercase();
    if lower.starts_with("fact") {
        "factfeature".to_string()
    } else if lower.starts_with("prof") {
        "profilefeature".to_string()
    } else {
        "unknown".to_string()
    }
}

/// A client capable of fetching raw case records by id. Implemented by the HTTP
/// adapter that talks to the case-record store; a fake drives unit tests.
#[async_trait]
pub trait CaseRecordClient: Send + Sync {
    async fn fetch_cases(&self, ids: &[String]) -> Vec<RawCase>;
}

/// Talks to the case-record store's bulk-fetch endpoint over HTTP. On any
/// failure (connection, non-2xx status, malformed body) returns an empty list
/// per the adapter contract, rather than propagating the error into the pipeline.
#[derive(Debug, Clone)]
pub struct HttpCaseRecordClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpCaseRecordClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.trim_end_matches('/').to_string(), token: token.to_string() }
    }
}

#[derive(Debug, Deserialize)]
struct FetchCasesResponse {
    #[serde(default)]
    cases: Vec<RawCase>,
}

#[async_trait]
impl CaseRecordClient for HttpCaseRecordClient {
    async fn fetch_cases(&self, ids: &[String]) -> Vec<RawCase> {
        let response = match self
            .client
            .post(format!("{}/cases/fetch", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return Vec::new(),
        };

        let mut parsed: FetchCasesResponse = match response.json().await {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };

        for case in &mut parsed.cases {
            if case.rule_type.is_empty() {
                case.rule_type = classify_rule_type(&case.rule_name);
            }
        }
        parsed.cases
    }
}

/// A [`SiemClient`] for when no SIEM endpoint is configured: every query returns no
/// events, rather than the pipeline silently skipping SIEM execution altogether.
#[derive(Debug, Clone, Default)]
pub struct NoopSiemClient;

#[async_trait]
impl SiemClient for NoopSiemClient {
    async fn search_events(&self, _event_filter: &str, _from_ms: i64, _to_ms: i64, _limit: usize) -> Result<Vec<Value>, String> {
        Ok(Vec::new())
    }
}

/// A [`CaseRecordClient`] for when no case-record store is configured. Mirrors
/// [`HttpCaseRecordClient`]'s own "return empty on failure" contract.
#[derive(Debug, Clone, Default)]
pub struct NoopCaseRecordClient;

#[async_trait]
impl CaseRecordClient for NoopCaseRecordClient {
    async fn fetch_cases(&self, _ids: &[String]) -> Vec<RawCase> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rule_type_matches_fact_and_prof_prefixes() {
        assert_eq!(classify_rule_type("fact_bruteforce"), "factfeature");
        assert_eq!(classify_rule_type("profile_anomaly"), "profilefeature");
        assert_eq!(classify_rule_type("behavioral_oddness"), "unknown");
    }
}
