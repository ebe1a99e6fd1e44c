//! SQLite-backed [`StorageBackend`]/[`KvStore`] implementation.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::info;

use crate::backend::{KvStore, StorageBackend, StorageError};

/// SQLite configuration options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub url: String,
    pub max_connections: u32,
    pub wal_mode: bool,
    pub foreign_keys: bool,
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:soc.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            foreign_keys: true,
            busy_timeout_secs: 5,
        }
    }
}

/// SQLite storage backend: kv_store for JSON blobs, kv_hashes/kv_sets/kv_strings for
/// the case-store/entity-index/similarity-cache primitives.
#[derive(Debug)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        let config = SqliteConfig {
            url: url.to_string(),
            ..Default::default()
        };
        Self::new_with_config(config).await
    }

    pub async fn new_with_config(config: SqliteConfig) -> Result<Self, StorageError> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if config.foreign_keys {
            options = options.pragma("foreign_keys", "ON");
        }
        options = options.pragma("busy_timeout", config.busy_timeout_secs.to_string());
        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(url = %config.url, wal = config.wal_mode, "connected to SQLite");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::Internal(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn is_healthy(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn set_value(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        let json = serde_json::to_string(&value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT OR REPLACE INTO kv_store (key, value, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(key)
        .bind(json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        use sqlx::Row;
        let result = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match result {
            Some(row) => {
                let value_str: String = row.try_get("value").map_err(|e| StorageError::Query(e.to_string()))?;
                let value = serde_json::from_str(&value_str).map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("SELECT 1 FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(result.is_some())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        use sqlx::Row;
        let pattern = format!("{prefix}%");
        let rows = sqlx::query("SELECT key FROM kv_store WHERE key LIKE ?")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.try_get("key").map_err(|e| StorageError::Query(e.to_string()))?);
        }
        Ok(keys)
    }
}

#[async_trait]
impl KvStore for SqliteBackend {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT OR REPLACE INTO kv_hashes (key, field, value) VALUES (?, ?, ?)")
            .bind(key)
            .bind(field)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        use sqlx::Row;
        let rows = sqlx::query("SELECT field, value FROM kv_hashes WHERE key = ?")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut map = HashMap::new();
        for row in rows {
            let field: String = row.try_get("field").map_err(|e| StorageError::Query(e.to_string()))?;
            let value: String = row.try_get("value").map_err(|e| StorageError::Query(e.to_string()))?;
            map.insert(field, value);
        }
        Ok(map)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO kv_sets (key, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, StorageError> {
        use sqlx::Row;
        let now = chrono::Utc::now().timestamp();
        let expired: Option<i64> = sqlx::query("SELECT expires_at FROM kv_expiry WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
            .and_then(|row| row.try_get("expires_at").ok());
        if let Some(expires_at) = expired {
            if expires_at <= now {
                return Ok(HashSet::new());
            }
        }

        let rows = sqlx::query("SELECT member FROM kv_sets WHERE key = ?")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<String, _>("member").ok())
            .collect())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StorageError> {
        let expires_at = chrono::Utc::now().timestamp() + ttl_secs as i64;
        sqlx::query("INSERT OR REPLACE INTO kv_expiry (key, expires_at) VALUES (?, ?)")
            .bind(key)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StorageError> {
        let expires_at = chrono::Utc::now().timestamp() + ttl_secs as i64;
        sqlx::query("INSERT OR REPLACE INTO kv_strings (key, value, expires_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        use sqlx::Row;
        let row = sqlx::query("SELECT value, expires_at FROM kv_strings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let expires_at: i64 = row.try_get("expires_at").map_err(|e| StorageError::Query(e.to_string()))?;
                if expires_at <= chrono::Utc::now().timestamp() {
                    return Ok(None);
                }
                let value: String = row.try_get("value").map_err(|e| StorageError::Query(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageExt;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn sqlite_backend_round_trips_typed_values() {
        let backend = SqliteBackend::new("sqlite::memory:").await.unwrap();

        let data = TestData { name: "test_sql".to_string(), value: 99 };
        backend.set("sql:1", &data).await.unwrap();

        assert!(backend.exists("sql:1").await.unwrap());
        let retrieved: Option<TestData> = backend.get("sql:1").await.unwrap();
        assert_eq!(retrieved, Some(data));

        let keys = backend.list_keys("sql:").await.unwrap();
        assert_eq!(keys, vec!["sql:1"]);

        assert!(backend.delete("sql:1").await.unwrap());
        assert!(!backend.exists("sql:1").await.unwrap());
    }

    #[tokio::test]
    async fn sqlite_backend_supports_entity_index_sets() {
        let backend = SqliteBackend::new("sqlite::memory:").await.unwrap();
        backend.sadd("idx:entity:user:alice", "case-1").await.unwrap();
        backend.sadd("idx:entity:user:alice", "case-2").await.unwrap();
        backend.expire("idx:entity:user:alice", 2_592_000).await.unwrap();

        let members = backend.smembers("idx:entity:user:alice").await.unwrap();
        assert_eq!(members.len(), 2);
    }
}
