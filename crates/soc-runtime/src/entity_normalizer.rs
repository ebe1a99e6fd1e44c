//! Entity extraction and normalization from raw case/detection JSON.
//!
//! Walks a fixed field-fallback list per entity type (first match wins), validates
//! IPs/hostnames, and folds results into a deduplicated [`EntityBag`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use soc_core::{Entity, EntityBag, EntityType};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

const USER_FIELDS: &[&str] = &[
    "user",
    "username",
    "user_name",
    "email_address",
    "source_user_entity_id",
    "user_entities.email_address",
    "user_entities.username",
    "user_entity.name",
];

const HOST_FIELDS: &[&str] = &[
    "src_host",
    "dest_host",
    "host",
    "hostname",
    "host_name",
    "device_entities.host_name",
    "device_entities.hostname",
    "endpoint.hostname",
    "computer_name",
];

const IP_FIELDS: &[&str] = &[
    "src_ip",
    "dest_ip",
    "ip",
    "ip_address",
    "source_ip",
    "destination_ip",
    "src_endpoint.ip",
    "dest_endpoint.ip",
    "endpoint.ip_address",
    "network.source_ip",
    "network.dest_ip",
];

const DOMAIN_FIELDS: &[&str] = &["domain", "dns_domain", "fqdn", "host_domain", "src_domain", "dest_domain"];

fn fqdn_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$").unwrap()
    })
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap())
}

fn uem_prefix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^UEM\d+\\(.+)$").unwrap())
}

/// One normalized entity with its provenance, mirroring the audit detail the
/// original Python `NormalizedEntity` dataclass recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEntity {
    pub entity_type: EntityType,
    pub value: String,
    pub original_field: String,
    pub confidence: f64,
    pub validation_passed: bool,
    pub original_value: String,
}

/// Look up a dotted field path (`"user_entities.email_address"`) in a JSON object,
/// taking the first element when a path segment resolves to an array.
fn get_nested<'a>(data: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = data;
    for key in path.split('.') {
        if let Some(arr) = current.as_array() {
            current = arr.first()?;
        }
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

fn value_to_string(value: &serde_json::Value) -> Option<String> {
    let value = match value.as_array() {
        Some(arr) => arr.first()?,
        None => value,
    };
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn extract_first(data: &serde_json::Value, fields: &[&str]) -> Option<(String, String)> {
    for field in fields {
        let found = data.get(*field).or_else(|| get_nested(data, field));
        if let Some(v) = found.and_then(value_to_string) {
            return Some((field.to_string(), v));
        }
    }
    None
}

pub fn validate_ip(value: &str) -> bool {
    value.parse::<Ipv4Addr>().is_ok() || value.parse::<Ipv6Addr>().is_ok()
}

pub fn validate_hostname(value: &str) -> bool {
    !value.is_empty() && value.len() <= 253 && fqdn_pattern().is_match(&value.to_lowercase())
}

fn validate_email(value: &str) -> bool {
    email_pattern().is_match(value)
}

fn normalize_user_value(value: &str) -> String {
    if let Some(caps) = uem_prefix_pattern().captures(value) {
        return caps[1].to_string();
    }
    if value.contains('@') && validate_email(value) {
        if let Some((local, _)) = value.split_once('@') {
            return local.to_lowercase();
        }
    }
    value.to_lowercase()
}

fn normalize_host_value(value: &str) -> String {
    value.to_lowercase()
}

fn normalize_domain_value(value: &str) -> String {
    value.to_lowercase().trim_start_matches('.').to_string()
}

/// Extract and normalize every entity type out of raw case/detection data, returning
/// both the deduplicated bag (for storage/indexing) and the detailed per-entity
/// records (for the audit observation list).
pub fn normalize_from_raw(data: &serde_json::Value) -> (EntityBag, Vec<NormalizedEntity>) {
    let mut bag = EntityBag::default();
    let mut details = Vec::new();

    if let Some((field, raw)) = extract_first(data, USER_FIELDS) {
        let value = normalize_user_value(&raw);
        if !value.is_empty() {
            bag.insert(EntityType::User, value.clone());
            details.push(NormalizedEntity {
                entity_type: EntityType::User,
                value,
                original_field: field,
                confidence: 0.9,
                validation_passed: true,
                original_value: raw,
            });
        }
    }

    for field in HOST_FIELDS {
        let Some(found) = data.get(*field).or_else(|| get_nested(data, field)) else { continue };
        let values: Vec<&serde_json::Value> = found.as_array().map(|a| a.iter().collect()).unwrap_or_else(|| vec![found]);
        for v in values {
            let Some(raw) = value_to_string(v) else { continue };
            let value = normalize_host_value(&raw);
            if bag.hosts.contains(&value) {
                continue;
            }
            let valid = validate_hostname(&value);
            bag.insert(EntityType::Host, value.clone());
            details.push(NormalizedEntity {
                entity_type: EntityType::Host,
                value,
                original_field: field.to_string(),
                confidence: 0.8,
                validation_passed: valid,
                original_value: raw,
            });
        }
    }

    for field in IP_FIELDS {
        let Some(found) = data.get(*field).or_else(|| get_nested(data, field)) else { continue };
        let values: Vec<&serde_json::Value> = found.as_array().map(|a| a.iter().collect()).unwrap_or_else(|| vec![found]);
        for v in values {
            let Some(raw) = value_to_string(v) else { continue };
            if bag.ips.contains(&raw) {
                continue;
            }
            let valid = validate_ip(&raw);
            bag.insert(EntityType::Ip, raw.clone());
            details.push(NormalizedEntity {
                entity_type: EntityType::Ip,
                value: raw.clone(),
                original_field: field.to_string(),
                confidence: if valid { 0.9 } else { 0.5 },
                validation_passed: valid,
                original_value: raw,
            });
        }
    }

    for field in DOMAIN_FIELDS {
        let Some(raw) = extract_first(data, &[field]).map(|(_, v)| v) else { continue };
        let value = normalize_domain_value(&raw);
        if bag.domains.contains(&value) {
            continue;
        }
        let valid = validate_hostname(&value);
        bag.insert(EntityType::Domain, value.clone());
        details.push(NormalizedEntity {
            entity_type: EntityType::Domain,
            value,
            original_field: field.to_string(),
            confidence: if valid { 0.8 } else { 0.5 },
            validation_passed: valid,
            original_value: raw,
        });
    }

    (bag, details)
}

/// Flatten valid normalized entities into plain `Entity` records, for callers that
/// don't need the full provenance detail.
pub fn to_entities(details: &[NormalizedEntity]) -> Vec<Entity> {
    details
        .iter()
        .filter(|d| d.validation_passed)
        .map(|d| Entity::new(d.entity_type, d.value.clone(), d.original_value.clone(), d.confidence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_user_from_email_local_part() {
        let data = json!({"email_address": "Alice.Smith@example.com"});
        let (bag, _) = normalize_from_raw(&data);
        assert!(bag.users.contains("alice.smith"));
    }

    #[test]
    fn strips_uem_domain_prefix() {
        let data = json!({"user": "UEM123\\jdoe"});
        let (bag, _) = normalize_from_raw(&data);
        assert!(bag.users.contains("jdoe"));
    }

    #[test]
    fn validates_ip_addresses() {
        let data = json!({"src_ip": "10.0.0.5", "dest_ip": "not-an-ip"});
        let (bag, details) = normalize_from_raw(&data);
        assert!(bag.ips.contains("10.0.0.5"));
        assert!(bag.ips.contains("not-an-ip"));
        let invalid = details.iter().find(|d| d.value == "not-an-ip").unwrap();
        assert!(!invalid.validation_passed);
        assert_eq!(invalid.confidence, 0.5);
    }

    #[test]
    fn nested_field_fallback_resolves_dotted_path() {
        let data = json!({"device_entities": [{"host_name": "WebServer01"}]});
        let (bag, _) = normalize_from_raw(&data);
        assert!(bag.hosts.contains("webserver01"));
    }
}
