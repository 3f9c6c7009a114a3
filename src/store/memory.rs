use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AgentStore, StoreError, StoreResult};
use crate::types::{Agent, CommerceConfig, UiConfig};

#[derive(Default)]
struct Tables {
    agents: HashMap<Uuid, Agent>,
    ui_configs: HashMap<Uuid, UiConfig>,
    commerce_configs: HashMap<Uuid, CommerceConfig>,
}

impl Tables {
    fn slug_owner(&self, slug: &str) -> Option<Uuid> {
        self.agents
            .values()
            .find(|agent| agent.slug == slug)
            .map(|agent| agent.id)
    }
}

/// Process-local store used by tests and by `STORE=memory` development runs.
/// Every write happens under a single lock, which gives it the same
/// uniqueness and cascade guarantees as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row counts of (agents, ui_configs, commerce_configs).
    pub async fn row_counts(&self) -> (usize, usize, usize) {
        let tables = self.tables.read().await;
        (
            tables.agents.len(),
            tables.ui_configs.len(),
            tables.commerce_configs.len(),
        )
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.slug_owner(&agent.slug).is_some() {
            return Err(StoreError::SlugTaken(agent.slug.clone()));
        }
        tables.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn agent_by_id(&self, id: Uuid) -> StoreResult<Option<Agent>> {
        Ok(self.tables.read().await.agents.get(&id).cloned())
    }

    async fn agent_by_slug(&self, slug: &str) -> StoreResult<Option<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .values()
            .find(|agent| agent.slug == slug)
            .cloned())
    }

    async fn agents_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Agent>> {
        let mut list = {
            let tables = self.tables.read().await;
            tables
                .agents
                .values()
                .filter(|agent| agent.owner_id == owner_id)
                .cloned()
                .collect::<Vec<_>>()
        };
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn update_agent(&self, agent: &Agent) -> StoreResult<Agent> {
        let mut tables = self.tables.write().await;
        if let Some(holder) = tables.slug_owner(&agent.slug) {
            if holder != agent.id {
                return Err(StoreError::SlugTaken(agent.slug.clone()));
            }
        }
        let Some(existing) = tables.agents.get_mut(&agent.id) else {
            return Err(StoreError::NotFound);
        };
        existing.name = agent.name.clone();
        existing.slug = agent.slug.clone();
        existing.system_prompt = agent.system_prompt.clone();
        existing.model_provider = agent.model_provider;
        existing.updated_at = agent.updated_at;
        Ok(existing.clone())
    }

    async fn set_agent_active(
        &self,
        id: Uuid,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Agent>> {
        let mut tables = self.tables.write().await;
        Ok(tables.agents.get_mut(&id).map(|existing| {
            existing.is_active = active;
            existing.updated_at = updated_at;
            existing.clone()
        }))
    }

    async fn delete_agent(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.agents.remove(&id).is_some();
        if removed {
            tables.ui_configs.remove(&id);
            tables.commerce_configs.remove(&id);
        }
        Ok(removed)
    }

    async fn upsert_ui_config(&self, agent_id: Uuid, config: &UiConfig) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.agents.contains_key(&agent_id) {
            return Err(StoreError::NotFound);
        }
        tables.ui_configs.insert(agent_id, config.clone());
        Ok(())
    }

    async fn ui_config(&self, agent_id: Uuid) -> StoreResult<Option<UiConfig>> {
        Ok(self.tables.read().await.ui_configs.get(&agent_id).cloned())
    }

    async fn upsert_commerce_config(
        &self,
        agent_id: Uuid,
        config: &CommerceConfig,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.agents.contains_key(&agent_id) {
            return Err(StoreError::NotFound);
        }
        tables.commerce_configs.insert(agent_id, config.clone());
        Ok(())
    }

    async fn commerce_config(&self, agent_id: Uuid) -> StoreResult<Option<CommerceConfig>> {
        Ok(self
            .tables
            .read()
            .await
            .commerce_configs
            .get(&agent_id)
            .cloned())
    }
}
