//! Key-value storage backend trait and the in-memory reference implementation.
//!
//! [`StorageBackend`] covers plain JSON get/set; [`KvStore`] extends it with the
//! hash/set/TTL primitives the case store, entity indices, and similarity cache need
//! (§4.10 of the design notes): `hset`/`hgetall` for per-case field storage,
//! `sadd`/`smembers` for entity-to-case indices, `setex`/`expire` for TTL'd cache entries.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Generic JSON key-value storage backend (object safe).
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn is_healthy(&self) -> bool;

    async fn set_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;

    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Typed get/set convenience methods layered over any [`StorageBackend`].
#[async_trait]
pub trait StorageExt {
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError>;
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>;
}

#[async_trait]
impl<S: StorageBackend + ?Sized> StorageExt for S {
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set_value(key, json).await
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_value(key).await? {
            Some(json) => {
                let value = serde_json::from_value(json).map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

/// Hash/set/TTL primitives used by the case store, entity indices, and similarity cache.
#[async_trait]
pub trait KvStore: StorageBackend {
    /// Set one field of a hash stored at `key`.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;

    /// Get every field of a hash stored at `key`.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;

    /// Add a member to the set stored at `key`.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StorageError>;

    /// Get every member of the set stored at `key`.
    async fn smembers(&self, key: &str) -> Result<HashSet<String>, StorageError>;

    /// Set an absolute expiry (seconds since epoch) on `key`. No-op if the key has no TTL support.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StorageError>;

    /// Set a plain string value at `key` with a TTL in seconds.
    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StorageError>;

    /// Get a plain string value previously stored with [`Self::setex`], honoring expiry.
    async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError>;
}

#[derive(Debug, Clone)]
struct ExpiringEntry<T> {
    value: T,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl<T> ExpiringEntry<T> {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(t) => chrono::Utc::now() < t,
            None => true,
        }
    }
}

/// In-memory storage backend used in tests and local development.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: tokio::sync::RwLock<HashMap<String, serde_json::Value>>,
    hashes: tokio::sync::RwLock<HashMap<String, HashMap<String, String>>>,
    sets: tokio::sync::RwLock<HashMap<String, ExpiringEntry<HashSet<String>>>>,
    strings: tokio::sync::RwLock<HashMap<String, ExpiringEntry<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn set_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.read().await.contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .data
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl KvStore for MemoryBackend {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        self.hashes
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        Ok(self.hashes.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StorageError> {
        let mut sets = self.sets.write().await;
        let entry = sets.entry(key.to_string()).or_insert_with(|| ExpiringEntry {
            value: HashSet::new(),
            expires_at: None,
        });
        entry.value.insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, StorageError> {
        let sets = self.sets.read().await;
        match sets.get(key) {
            Some(entry) if entry.is_live() => Ok(entry.value.clone()),
            _ => Ok(HashSet::new()),
        }
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StorageError> {
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        if let Some(entry) = self.sets.write().await.get_mut(key) {
            entry.expires_at = Some(expires_at);
        }
        if let Some(entry) = self.strings.write().await.get_mut(key) {
            entry.expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StorageError> {
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        self.strings.write().await.insert(
            key.to_string(),
            ExpiringEntry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        let strings = self.strings.read().await;
        match strings.get(key) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn memory_backend_round_trips_typed_values() {
        let backend = MemoryBackend::new();
        let data = TestData { name: "test".to_string(), value: 42 };

        backend.set("test:1", &data).await.unwrap();
        let retrieved: Option<TestData> = backend.get("test:1").await.unwrap();
        assert_eq!(retrieved, Some(data));

        assert!(backend.exists("test:1").await.unwrap());
        assert!(!backend.exists("test:2").await.unwrap());

        let keys = backend.list_keys("test:").await.unwrap();
        assert_eq!(keys, vec!["test:1"]);

        assert!(backend.delete("test:1").await.unwrap());
        assert!(!backend.exists("test:1").await.unwrap());
    }

    #[tokio::test]
    async fn memory_backend_supports_hash_and_set_ops() {
        let backend = MemoryBackend::new();
        backend.hset("case:1", "status", "open").await.unwrap();
        backend.hset("case:1", "title", "suspicious login").await.unwrap();
        let fields = backend.hgetall("case:1").await.unwrap();
        assert_eq!(fields.get("status"), Some(&"open".to_string()));

        backend.sadd("idx:entity:user:alice", "case-1").await.unwrap();
        backend.sadd("idx:entity:user:alice", "case-2").await.unwrap();
        let members = backend.smembers("idx:entity:user:alice").await.unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn setex_value_disappears_after_expiry() {
        let backend = MemoryBackend::new();
        backend.setex("sim:abc", "cached", 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(backend.get_string("sim:abc").await.unwrap(), None);
    }
}
