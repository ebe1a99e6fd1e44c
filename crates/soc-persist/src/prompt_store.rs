//! Versioned prompt template storage, seeded with a default template per agent role.

use soc_core::PromptVersion;
use std::sync::Arc;

use crate::backend::{StorageBackend, StorageError, StorageExt};

const KNOWN_AGENT_ROLES: &[&str] = &["triage", "enrichment", "investigation", "correlation", "response", "reporting", "knowledge"];

fn default_template(role: &str) -> String {
    format!(
        "You are the {role} agent for a security operations case-enrichment pipeline. \
         Review the supplied case context and produce your assigned output for this stage."
    )
}

/// Append-only, versioned prompt templates, one active version per agent role.
#[derive(Debug)]
pub struct PromptStore<B: StorageBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: StorageBackend + ?Sized> PromptStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    fn active_key(&self, agent_role: &str) -> String {
        format!("prompt:{agent_role}:active")
    }

    fn version_key(&self, agent_role: &str, version: &str) -> String {
        format!("prompt:{agent_role}:v:{version}")
    }

    fn history_key(&self, agent_role: &str) -> String {
        format!("prompt:{agent_role}:history")
    }

    async fn seed_if_absent(&self, agent_role: &str) -> Result<PromptVersion, StorageError> {
        if let Some(active) = self.backend.get::<String>(&self.active_key(agent_role)).await? {
            if let Some(version) = self.backend.get::<PromptVersion>(&self.version_key(agent_role, &active)).await? {
                return Ok(version);
            }
        }

        let seeded = PromptVersion {
            agent_role: agent_role.to_string(),
            version: "v1.0".to_string(),
            template: default_template(agent_role),
            created_at: chrono::Utc::now(),
            modified_by: None,
        };
        self.backend.set(&self.version_key(agent_role, &seeded.version), &seeded).await?;
        self.backend.set(&self.active_key(agent_role), &seeded.version).await?;
        self.backend.set(&self.history_key(agent_role), &vec![seeded.version.clone()]).await?;
        Ok(seeded)
    }

    /// Fetch the active prompt template for an agent role, seeding a default on first use.
    pub async fn get(&self, agent_role: &str) -> Result<PromptVersion, StorageError> {
        self.seed_if_absent(agent_role).await
    }

    /// Fetch a specific historical version, or the active one if `version` is `None`.
    pub async fn get_info(&self, agent_role: &str, version: Option<&str>) -> Result<Option<PromptVersion>, StorageError> {
        match version {
            Some(v) => self.backend.get(&self.version_key(agent_role, v)).await,
            None => self.get(agent_role).await.map(Some),
        }
    }

    /// Publish a new template as the next minor version, leaving prior versions intact.
    pub async fn update(&self, agent_role: &str, template: String, modified_by: Option<String>) -> Result<PromptVersion, StorageError> {
        let current = self.seed_if_absent(agent_role).await?;
        let next = PromptVersion {
            agent_role: agent_role.to_string(),
            version: PromptVersion::next_version(&current.version),
            template,
            created_at: chrono::Utc::now(),
            modified_by,
        };

        self.backend.set(&self.version_key(agent_role, &next.version), &next).await?;
        self.backend.set(&self.active_key(agent_role), &next.version).await?;

        let mut history: Vec<String> = self.backend.get(&self.history_key(agent_role)).await?.unwrap_or_default();
        history.push(next.version.clone());
        self.backend.set(&self.history_key(agent_role), &history).await?;

        Ok(next)
    }

    /// All known versions for an agent role, oldest first.
    pub async fn list_versions(&self, agent_role: &str) -> Result<Vec<String>, StorageError> {
        self.seed_if_absent(agent_role).await?;
        Ok(self.backend.get(&self.history_key(agent_role)).await?.unwrap_or_default())
    }

    /// Seed default templates for every known agent role, idempotently.
    pub async fn seed_defaults(&self) -> Result<(), StorageError> {
        for role in KNOWN_AGENT_ROLES {
            self.seed_if_absent(role).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn get_seeds_a_default_template_on_first_use() {
        let store = PromptStore::new(Arc::new(MemoryBackend::new()));
        let prompt = store.get("triage").await.unwrap();
        assert_eq!(prompt.version, "v1.0");
        assert!(prompt.template.contains("triage"));
    }

    #[tokio::test]
    async fn update_bumps_the_minor_version_and_keeps_history() {
        let store = PromptStore::new(Arc::new(MemoryBackend::new()));
        store.get("triage").await.unwrap();
        let updated = store.update("triage", "new template".to_string(), Some("analyst-1".to_string())).await.unwrap();
        assert_eq!(updated.version, "v1.1");
        assert_eq!(updated.modified_by.as_deref(), Some("analyst-1"));

        let active = store.get("triage").await.unwrap();
        assert_eq!(active.version, "v1.1");
        assert_eq!(active.template, "new template");

        let versions = store.list_versions("triage").await.unwrap();
        assert_eq!(versions, vec!["v1.0", "v1.1"]);
    }

    #[tokio::test]
    async fn get_info_with_explicit_version_returns_a_historical_template() {
        let store = PromptStore::new(Arc::new(MemoryBackend::new()));
        store.get("triage").await.unwrap();
        store.update("triage", "v2 template".to_string(), None).await.unwrap();

        let v1 = store.get_info("triage", Some("v1.0")).await.unwrap().unwrap();
        assert_eq!(v1.template, default_template("triage"));
    }
}
