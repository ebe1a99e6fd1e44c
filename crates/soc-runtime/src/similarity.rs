//! Weighted-Jaccard similarity search over entity-inverted indices.
//!
//! Candidate cases are found by unioning the inverted index `idx:entity:{type}:{value}`
//! for every entity in the target bag, then scored by a per-type weighted Jaccard sum
//! with small bonuses for a shared rule id or a nearby timestamp.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use soc_core::{EntityBag, EntityType};
use soc_persist::{KvStore, StorageError};
use std::collections::HashSet;

const ENTITY_INDEX_TTL_SECS: u64 = 30 * 24 * 3600;
const CACHE_TTL_SECS: u64 = 24 * 3600;
const DEFAULT_MIN_SIMILARITY: f64 = 0.3;
const DEFAULT_LIMIT: usize = 10;
const RULE_MATCH_BONUS: f64 = 0.1;
const TIME_WINDOW_BONUS: f64 = 0.1;
const DEFAULT_TIME_WINDOW_HOURS: i64 = 48;

const TYPES: [EntityType; 4] = [EntityType::User, EntityType::Ip, EntityType::Host, EntityType::Domain];

fn index_key(entity_type: EntityType, value: &str) -> String {
    format!("idx:entity:{}:{}", entity_type.as_str(), value.to_lowercase())
}

/// A scored candidate case returned by [`find_similar`].
#[derive(Debug, Clone)]
pub struct SimilarCase {
    pub case_id: String,
    pub score: f64,
    pub matched_entities: Vec<(EntityType, String)>,
}

/// Add `case_id` to the inverted index for every entity in `bag`, refreshing each
/// key's TTL. Called whenever a case's entity bag is committed.
pub async fn maintain_entity_indices<S: KvStore + ?Sized>(
    store: &S,
    case_id: &str,
    bag: &EntityBag,
) -> Result<(), StorageError> {
    for entity_type in TYPES {
        for value in bag.get(entity_type) {
            let key = index_key(entity_type, value);
            store.sadd(&key, case_id).await?;
            store.expire(&key, ENTITY_INDEX_TTL_SECS).await?;
        }
    }
    Ok(())
}

async fn candidate_cases<S: KvStore + ?Sized>(
    store: &S,
    bag: &EntityBag,
    exclude_case_id: &str,
) -> Result<HashSet<String>, StorageError> {
    let mut candidates = HashSet::new();
    for entity_type in TYPES {
        for value in bag.get(entity_type) {
            let members = store.smembers(&index_key(entity_type, value)).await?;
            candidates.extend(members);
        }
    }
    candidates.remove(exclude_case_id);
    Ok(candidates)
}

fn jaccard(a: &std::collections::BTreeSet<String>, b: &std::collections::BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn weighted_jaccard(target: &EntityBag, candidate: &EntityBag) -> (f64, Vec<(EntityType, String)>) {
    let mut score = 0.0;
    let mut matched = Vec::new();

    for entity_type in TYPES {
        let t = target.get(entity_type);
        let c = candidate.get(entity_type);
        if !t.is_empty() && !c.is_empty() {
            score += entity_type.similarity_weight() * jaccard(t, c);
            for value in t.intersection(c) {
                matched.push((entity_type, value.clone()));
            }
        }
    }

    (score, matched)
}

/// Deterministic cache key for a target bag's similarity search against one case.
pub fn cache_key(case_id: &str, bag: &EntityBag) -> String {
    let serialized = serde_json::to_string(bag).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(case_id.as_bytes());
    hasher.update(b":");
    hasher.update(serialized.as_bytes());
    format!("simcache:{}", hex::encode(hasher.finalize()))
}

/// Parameters that feed the rule-id/timestamp similarity bonuses.
#[derive(Debug, Clone, Default)]
pub struct SimilarityContext {
    pub rule_id: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// A candidate case's bag plus the bonus-relevant metadata, as read back from the case store.
pub struct CandidateCase {
    pub case_id: String,
    pub bag: EntityBag,
    pub context: SimilarityContext,
}

/// Find the top-`limit` most similar cases to `target_bag`, excluding `case_id` itself.
/// `fetch_candidates` resolves the candidate case_ids (from the inverted index union)
/// into full `CandidateCase` records — the caller supplies this since it requires a
/// case-store round trip this module has no direct dependency on.
pub async fn find_similar<S, F, Fut>(
    store: &S,
    case_id: &str,
    target_bag: &EntityBag,
    target_context: &SimilarityContext,
    min_similarity: Option<f64>,
    limit: Option<usize>,
    fetch_candidates: F,
) -> Result<Vec<SimilarCase>, StorageError>
where
    S: KvStore + ?Sized,
    F: FnOnce(Vec<String>) -> Fut,
    Fut: std::future::Future<Output = Vec<CandidateCase>>,
{
    let candidate_ids = candidate_cases(store, target_bag, case_id).await?;
    if candidate_ids.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = fetch_candidates(candidate_ids.into_iter().collect()).await;
    let min_similarity = min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY);

    let mut scored: Vec<SimilarCase> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let (mut score, matched) = weighted_jaccard(target_bag, &candidate.bag);

            if let (Some(a), Some(b)) = (&target_context.rule_id, &candidate.context.rule_id) {
                if a == b {
                    score += RULE_MATCH_BONUS;
                }
            }
            if let (Some(a), Some(b)) = (target_context.observed_at, candidate.context.observed_at) {
                if (a - b).num_hours().abs() <= DEFAULT_TIME_WINDOW_HOURS {
                    score += TIME_WINDOW_BONUS;
                }
            }

            (score >= min_similarity).then_some(SimilarCase {
                case_id: candidate.case_id,
                score,
                matched_entities: matched,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit.unwrap_or(DEFAULT_LIMIT));
    Ok(scored)
}

/// Cache a similarity result set under [`cache_key`] with the standard 24h TTL.
pub async fn cache_result<S: KvStore + ?Sized>(
    store: &S,
    key: &str,
    case_ids: &[String],
) -> Result<(), StorageError> {
    let serialized = serde_json::to_string(case_ids).map_err(|e| StorageError::Serialization(e.to_string()))?;
    store.setex(key, &serialized, CACHE_TTL_SECS).await
}

pub async fn cached_result<S: KvStore + ?Sized>(
    store: &S,
    key: &str,
) -> Result<Option<Vec<String>>, StorageError> {
    match store.get_string(key).await? {
        Some(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soc_persist::MemoryBackend;

    fn bag(users: &[&str], ips: &[&str]) -> EntityBag {
        let mut b = EntityBag::default();
        for u in users {
            b.insert(EntityType::User, u.to_string());
        }
        for ip in ips {
            b.insert(EntityType::Ip, ip.to_string());
        }
        b
    }

    #[test]
    fn weighted_jaccard_weighs_users_higher_than_ips() {
        let target = bag(&["alice"], &["10.0.0.1"]);
        let same_user = bag(&["alice"], &["10.0.0.99"]);
        let same_ip = bag(&["bob"], &["10.0.0.1"]);

        let (score_user, _) = weighted_jaccard(&target, &same_user);
        let (score_ip, _) = weighted_jaccard(&target, &same_ip);
        assert!(score_user > score_ip);
    }

    #[tokio::test]
    async fn maintain_then_find_recovers_candidates_by_shared_entity() {
        let store = MemoryBackend::new();
        let target = bag(&["alice"], &["10.0.0.1"]);
        let other = bag(&["alice"], &["10.0.0.2"]);

        maintain_entity_indices(&store, "case-1", &target).await.unwrap();
        maintain_entity_indices(&store, "case-2", &other).await.unwrap();

        let candidate_cases = vec![CandidateCase {
            case_id: "case-2".into(),
            bag: other.clone(),
            context: SimilarityContext::default(),
        }];

        let results = find_similar(
            &store,
            "case-1",
            &target,
            &SimilarityContext::default(),
            None,
            None,
            |_ids| async move { candidate_cases },
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].case_id, "case-2");
    }
}
