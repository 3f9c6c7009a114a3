use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use super::{AgentStore, StoreError, StoreResult};
use crate::types::{
    Agent, ButtonIcon, ButtonPosition, CommerceConfig, ModelProvider, UiConfig,
};

const AGENT_COLUMNS: &str = "id, owner_id, name, slug, system_prompt, model_provider, is_active, created_at, updated_at";

const UI_COLUMNS: &str = "primary_color, secondary_color, background_color, text_color, \
     button_position, button_size, widget_width, widget_height, border_radius, \
     welcome_message, button_icon, header_title, show_agent_avatar, show_timestamp, \
     show_typing_indicator, enable_dark_mode, allow_attachments";

const COMMERCE_COLUMNS: &str = "shop_domain, api_key, api_secret_key, access_token, \
     enable_product_recommendations, max_products_to_show";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps constraint violations onto the store's typed outcomes.
fn classify(err: sqlx::Error, slug: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::SlugTaken(slug.to_string());
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    StoreError::Database(err)
}

fn to_u32(value: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn parse_agent_row(row: PgRow) -> StoreResult<Agent> {
    let provider: String = row.try_get("model_provider")?;
    let model_provider = ModelProvider::parse(&provider)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown model provider `{provider}`")))?;
    Ok(Agent {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        system_prompt: row.try_get("system_prompt")?,
        model_provider,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_ui_row(row: PgRow) -> StoreResult<UiConfig> {
    let position: String = row.try_get("button_position")?;
    let icon: String = row.try_get("button_icon")?;
    Ok(UiConfig {
        primary_color: row.try_get("primary_color")?,
        secondary_color: row.try_get("secondary_color")?,
        background_color: row.try_get("background_color")?,
        text_color: row.try_get("text_color")?,
        button_position: ButtonPosition::parse(&position)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown button position `{position}`")))?,
        button_size: to_u32(row.try_get("button_size")?, "button_size")?,
        widget_width: to_u32(row.try_get("widget_width")?, "widget_width")?,
        widget_height: to_u32(row.try_get("widget_height")?, "widget_height")?,
        border_radius: to_u32(row.try_get("border_radius")?, "border_radius")?,
        welcome_message: row.try_get("welcome_message")?,
        button_icon: ButtonIcon::parse(&icon)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown button icon `{icon}`")))?,
        header_title: row.try_get("header_title")?,
        show_agent_avatar: row.try_get("show_agent_avatar")?,
        show_timestamp: row.try_get("show_timestamp")?,
        show_typing_indicator: row.try_get("show_typing_indicator")?,
        enable_dark_mode: row.try_get("enable_dark_mode")?,
        allow_attachments: row.try_get("allow_attachments")?,
    })
}

fn parse_commerce_row(row: PgRow) -> StoreResult<CommerceConfig> {
    Ok(CommerceConfig {
        shop_domain: row.try_get("shop_domain")?,
        api_key: row.try_get("api_key")?,
        api_secret_key: row.try_get("api_secret_key")?,
        access_token: row.try_get("access_token")?,
        enable_product_recommendations: row.try_get("enable_product_recommendations")?,
        max_products_to_show: to_u32(row.try_get("max_products_to_show")?, "max_products_to_show")?,
    })
}

#[async_trait]
impl AgentStore for PgStore {
    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO agents (id, owner_id, name, slug, system_prompt, model_provider, is_active, created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(agent.id)
        .bind(&agent.owner_id)
        .bind(&agent.name)
        .bind(&agent.slug)
        .bind(&agent.system_prompt)
        .bind(agent.model_provider.as_str())
        .bind(agent.is_active)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, &agent.slug))?;
        Ok(())
    }

    async fn agent_by_id(&self, id: Uuid) -> StoreResult<Option<Agent>> {
        let row = sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(parse_agent_row).transpose()
    }

    async fn agent_by_slug(&self, slug: &str) -> StoreResult<Option<Agent>> {
        let row = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE slug = $1 LIMIT 1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        row.map(parse_agent_row).transpose()
    }

    async fn agents_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Agent>> {
        let rows = sqlx::query(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(parse_agent_row).collect()
    }

    async fn update_agent(&self, agent: &Agent) -> StoreResult<Agent> {
        let row = sqlx::query(&format!(
            "UPDATE agents SET name = $2, slug = $3, system_prompt = $4, model_provider = $5, \
             updated_at = $6 WHERE id = $1 RETURNING {AGENT_COLUMNS}"
        ))
        .bind(agent.id)
        .bind(&agent.name)
        .bind(&agent.slug)
        .bind(&agent.system_prompt)
        .bind(agent.model_provider.as_str())
        .bind(agent.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| classify(err, &agent.slug))?;
        row.map(parse_agent_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn set_agent_active(
        &self,
        id: Uuid,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Agent>> {
        let row = sqlx::query(&format!(
            "UPDATE agents SET is_active = $2, updated_at = $3 WHERE id = $1 RETURNING {AGENT_COLUMNS}"
        ))
        .bind(id)
        .bind(active)
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(parse_agent_row).transpose()
    }

    async fn delete_agent(&self, id: Uuid) -> StoreResult<bool> {
        // ui_configs and commerce_configs go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_ui_config(&self, agent_id: Uuid, config: &UiConfig) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO ui_configs (agent_id, {UI_COLUMNS}) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18) \
             ON CONFLICT (agent_id) DO UPDATE SET \
               primary_color = EXCLUDED.primary_color, \
               secondary_color = EXCLUDED.secondary_color, \
               background_color = EXCLUDED.background_color, \
               text_color = EXCLUDED.text_color, \
               button_position = EXCLUDED.button_position, \
               button_size = EXCLUDED.button_size, \
               widget_width = EXCLUDED.widget_width, \
               widget_height = EXCLUDED.widget_height, \
               border_radius = EXCLUDED.border_radius, \
               welcome_message = EXCLUDED.welcome_message, \
               button_icon = EXCLUDED.button_icon, \
               header_title = EXCLUDED.header_title, \
               show_agent_avatar = EXCLUDED.show_agent_avatar, \
               show_timestamp = EXCLUDED.show_timestamp, \
               show_typing_indicator = EXCLUDED.show_typing_indicator, \
               enable_dark_mode = EXCLUDED.enable_dark_mode, \
               allow_attachments = EXCLUDED.allow_attachments, \
               updated_at = now()"
        ))
        .bind(agent_id)
        .bind(&config.primary_color)
        .bind(&config.secondary_color)
        .bind(&config.background_color)
        .bind(&config.text_color)
        .bind(config.button_position.as_str())
        .bind(config.button_size as i32)
        .bind(config.widget_width as i32)
        .bind(config.widget_height as i32)
        .bind(config.border_radius as i32)
        .bind(&config.welcome_message)
        .bind(config.button_icon.as_str())
        .bind(&config.header_title)
        .bind(config.show_agent_avatar)
        .bind(config.show_timestamp)
        .bind(config.show_typing_indicator)
        .bind(config.enable_dark_mode)
        .bind(config.allow_attachments)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, ""))?;
        Ok(())
    }

    async fn ui_config(&self, agent_id: Uuid) -> StoreResult<Option<UiConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {UI_COLUMNS} FROM ui_configs WHERE agent_id = $1"
        ))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(parse_ui_row).transpose()
    }

    async fn upsert_commerce_config(
        &self,
        agent_id: Uuid,
        config: &CommerceConfig,
    ) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO commerce_configs (agent_id, {COMMERCE_COLUMNS}) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) \
             ON CONFLICT (agent_id) DO UPDATE SET \
               shop_domain = EXCLUDED.shop_domain, \
               api_key = EXCLUDED.api_key, \
               api_secret_key = EXCLUDED.api_secret_key, \
               access_token = EXCLUDED.access_token, \
               enable_product_recommendations = EXCLUDED.enable_product_recommendations, \
               max_products_to_show = EXCLUDED.max_products_to_show, \
               updated_at = now()"
        ))
        .bind(agent_id)
        .bind(&config.shop_domain)
        .bind(&config.api_key)
        .bind(&config.api_secret_key)
        .bind(&config.access_token)
        .bind(config.enable_product_recommendations)
        .bind(config.max_products_to_show as i32)
        .execute(&self.pool)
        .await
        .map_err(|err| classify(err, ""))?;
        Ok(())
    }

    async fn commerce_config(&self, agent_id: Uuid) -> StoreResult<Option<CommerceConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {COMMERCE_COLUMNS} FROM commerce_configs WHERE agent_id = $1"
        ))
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(parse_commerce_row).transpose()
    }
}
