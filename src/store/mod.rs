//! Persistence for agents and their per-agent configuration records.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Agent, CommerceConfig, UiConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("slug `{0}` is already in use")]
    SlugTaken(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage seam for the three tables.
///
/// Implementations must enforce slug uniqueness atomically on insert and on
/// update (`StoreError::SlugTaken`), reject configuration writes for unknown
/// agents (`StoreError::NotFound`) and remove both configuration records when
/// their agent is deleted.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()>;

    async fn agent_by_id(&self, id: Uuid) -> StoreResult<Option<Agent>>;

    /// Looks up by slug regardless of the active flag.
    async fn agent_by_slug(&self, slug: &str) -> StoreResult<Option<Agent>>;

    /// Newest-created first.
    async fn agents_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Agent>>;

    /// Writes the editable fields and `updated_at`, leaving the active flag
    /// untouched, and returns the stored record.
    async fn update_agent(&self, agent: &Agent) -> StoreResult<Agent>;

    /// Flips only the active flag. `None` when the agent does not exist.
    async fn set_agent_active(
        &self,
        id: Uuid,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Agent>>;

    /// Returns whether a row was removed.
    async fn delete_agent(&self, id: Uuid) -> StoreResult<bool>;

    async fn upsert_ui_config(&self, agent_id: Uuid, config: &UiConfig) -> StoreResult<()>;

    async fn ui_config(&self, agent_id: Uuid) -> StoreResult<Option<UiConfig>>;

    async fn upsert_commerce_config(
        &self,
        agent_id: Uuid,
        config: &CommerceConfig,
    ) -> StoreResult<()>;

    async fn commerce_config(&self, agent_id: Uuid) -> StoreResult<Option<CommerceConfig>>;
}
