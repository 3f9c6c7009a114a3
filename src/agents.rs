use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    store::{AgentStore, StoreError},
    types::{
        Agent, AgentInput, CommerceConfig, CommerceConfigView, Owner, UiConfig,
    },
    validation::{normalize_commerce_config, normalize_ui_config, validate_agent_input},
};

/// Owner-scoped management of agents and their configuration records.
///
/// Records owned by someone else are reported exactly like missing ones.
#[derive(Clone)]
pub struct AgentService {
    store: Arc<dyn AgentStore>,
}

impl AgentService {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }

    fn persistence_failure(op: &str, context: &str, err: StoreError) -> AppError {
        match err {
            StoreError::NotFound | StoreError::SlugTaken(_) => AppError::from(err),
            other => {
                error!(op, context, error = %other, "agent store failure");
                AppError::from(other)
            }
        }
    }

    fn listing_changed(owner: &Owner) {
        info!(owner = owner.as_str(), "agent listing changed");
    }

    async fn ensure_slug_free(&self, slug: &str, except: Option<Uuid>) -> AppResult<()> {
        let holder = self
            .store
            .agent_by_slug(slug)
            .await
            .map_err(|err| Self::persistence_failure("slug_check", slug, err))?;
        match holder {
            Some(agent) if Some(agent.id) != except => Err(AppError::Conflict),
            _ => Ok(()),
        }
    }

    pub async fn create(&self, owner: &Owner, input: &AgentInput) -> AppResult<Agent> {
        let fields = validate_agent_input(input, None).map_err(AppError::Validation)?;
        self.ensure_slug_free(&fields.slug, None).await?;

        let now = Utc::now();
        let agent = Agent {
            id: Uuid::new_v4(),
            owner_id: owner.as_str().to_string(),
            name: fields.name,
            slug: fields.slug,
            system_prompt: fields.system_prompt,
            model_provider: fields.model_provider,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        // The pre-check above only produces the friendly error; the store's
        // unique constraint decides concurrent creates.
        self.store
            .insert_agent(&agent)
            .await
            .map_err(|err| Self::persistence_failure("create", &agent.slug, err))?;

        info!(agent_id = %agent.id, slug = %agent.slug, "agent created");
        Self::listing_changed(owner);
        Ok(agent)
    }

    /// Never fails: a store error is logged and reads as an empty listing.
    pub async fn list(&self, owner: &Owner) -> Vec<Agent> {
        match self.store.agents_by_owner(owner.as_str()).await {
            Ok(agents) => agents,
            Err(err) => {
                error!(owner = owner.as_str(), error = %err, "failed to list agents");
                Vec::new()
            }
        }
    }

    pub async fn get_by_id(&self, owner: &Owner, id: Uuid) -> AppResult<Agent> {
        let agent = self
            .store
            .agent_by_id(id)
            .await
            .map_err(|err| Self::persistence_failure("get", &id.to_string(), err))?;
        match agent {
            Some(agent) if agent.owner_id == owner.as_str() => Ok(agent),
            _ => Err(AppError::NotFound),
        }
    }

    /// Public lookup; inactive agents are invisible here.
    pub async fn get_by_slug(&self, slug: &str) -> AppResult<Agent> {
        let agent = self
            .store
            .agent_by_slug(slug)
            .await
            .map_err(|err| Self::persistence_failure("get_by_slug", slug, err))?;
        match agent {
            Some(agent) if agent.is_active => Ok(agent),
            _ => Err(AppError::NotFound),
        }
    }

    pub async fn update(&self, owner: &Owner, id: Uuid, input: &AgentInput) -> AppResult<Agent> {
        let current = self.get_by_id(owner, id).await?;
        let fields = validate_agent_input(input, Some(&current)).map_err(AppError::Validation)?;
        if fields.slug != current.slug {
            self.ensure_slug_free(&fields.slug, Some(current.id)).await?;
        }

        let updated = Agent {
            name: fields.name,
            slug: fields.slug,
            system_prompt: fields.system_prompt,
            model_provider: fields.model_provider,
            updated_at: Utc::now(),
            ..current
        };
        let updated = self
            .store
            .update_agent(&updated)
            .await
            .map_err(|err| Self::persistence_failure("update", &updated.slug, err))?;

        info!(agent_id = %updated.id, slug = %updated.slug, "agent updated");
        Self::listing_changed(owner);
        Ok(updated)
    }

    pub async fn set_active(&self, owner: &Owner, id: Uuid, active: bool) -> AppResult<Agent> {
        let current = self.get_by_id(owner, id).await?;
        let updated = self
            .store
            .set_agent_active(current.id, active, Utc::now())
            .await
            .map_err(|err| Self::persistence_failure("set_active", &current.slug, err))?
            .ok_or(AppError::NotFound)?;

        info!(agent_id = %updated.id, active, "agent activation changed");
        Self::listing_changed(owner);
        Ok(updated)
    }

    pub async fn delete(&self, owner: &Owner, id: Uuid) -> AppResult<()> {
        let agent = self.get_by_id(owner, id).await?;
        let removed = self
            .store
            .delete_agent(agent.id)
            .await
            .map_err(|err| Self::persistence_failure("delete", &agent.slug, err))?;
        if !removed {
            warn!(agent_id = %agent.id, "agent vanished before delete");
            return Err(AppError::NotFound);
        }

        info!(agent_id = %agent.id, slug = %agent.slug, "agent deleted");
        Self::listing_changed(owner);
        Ok(())
    }

    pub async fn save_ui_config(
        &self,
        owner: &Owner,
        agent_id: Uuid,
        config: &UiConfig,
    ) -> AppResult<UiConfig> {
        let agent = self.get_by_id(owner, agent_id).await?;
        let config = normalize_ui_config(config.clone()).map_err(AppError::Validation)?;
        self.store
            .upsert_ui_config(agent.id, &config)
            .await
            .map_err(|err| Self::persistence_failure("save_ui_config", &agent.slug, err))?;
        info!(agent_id = %agent.id, "ui config saved");
        Ok(config)
    }

    pub async fn ui_config(&self, owner: &Owner, agent_id: Uuid) -> AppResult<UiConfig> {
        let agent = self.get_by_id(owner, agent_id).await?;
        self.store
            .ui_config(agent.id)
            .await
            .map_err(|err| Self::persistence_failure("ui_config", &agent.slug, err))?
            .ok_or(AppError::NotFound)
    }

    pub async fn save_commerce_config(
        &self,
        owner: &Owner,
        agent_id: Uuid,
        config: CommerceConfig,
    ) -> AppResult<CommerceConfigView> {
        let agent = self.get_by_id(owner, agent_id).await?;
        let config = normalize_commerce_config(config).map_err(AppError::Validation)?;
        self.store
            .upsert_commerce_config(agent.id, &config)
            .await
            .map_err(|err| Self::persistence_failure("save_commerce_config", &agent.slug, err))?;
        info!(agent_id = %agent.id, shop = %config.shop_domain, "commerce integration saved");
        Ok(CommerceConfigView::from(&config))
    }

    pub async fn commerce_config(
        &self,
        owner: &Owner,
        agent_id: Uuid,
    ) -> AppResult<CommerceConfigView> {
        let agent = self.get_by_id(owner, agent_id).await?;
        self.store
            .commerce_config(agent.id)
            .await
            .map_err(|err| Self::persistence_failure("commerce_config", &agent.slug, err))?
            .map(|config| CommerceConfigView::from(&config))
            .ok_or(AppError::NotFound)
    }

    /// Public-path reads used while serving an already resolved agent.
    pub async fn public_ui_config(&self, agent: &Agent) -> Result<Option<UiConfig>, StoreError> {
        self.store.ui_config(agent.id).await
    }

    pub async fn public_commerce_config(
        &self,
        agent: &Agent,
    ) -> Result<Option<CommerceConfig>, StoreError> {
        self.store.commerce_config(agent.id).await
    }
}
