use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    agents::AgentService,
    commerce::ShopifyClient,
    error::{AppError, AppResult, GENERIC_FAILURE},
    llm::{BackendSelector, DeltaStream},
    prompting::{catalog_entries, render_catalog_prompt, CatalogPromptContext},
    types::{Agent, ChatTurn, Role},
    validation::validate_transcript,
};

const RELAY_CAPACITY: usize = 32;

/// What the transport layer frames onto the wire, in order. Exactly one
/// terminal event (`Done` or `Error`) ends every relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Delta(String),
    Done,
    Error(String),
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatEvent::Delta(_))
    }
}

/// Result of the best-effort catalogue step.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    Enriched(String),
    Skipped(String),
}

#[derive(Clone)]
pub struct ChatService {
    agents: AgentService,
    shopify: ShopifyClient,
    backends: Arc<dyn BackendSelector>,
}

impl ChatService {
    pub fn new(
        agents: AgentService,
        shopify: ShopifyClient,
        backends: Arc<dyn BackendSelector>,
    ) -> Self {
        Self {
            agents,
            shopify,
            backends,
        }
    }

    /// Appends the shop catalogue to the agent's prompt when the agent has
    /// recommendations enabled. Never fails.
    pub async fn enrich(&self, agent: &Agent) -> Enrichment {
        let config = match self.agents.public_commerce_config(agent).await {
            Ok(Some(config)) => config,
            Ok(None) => return Enrichment::Skipped("no commerce integration".to_string()),
            Err(err) => {
                return Enrichment::Skipped(format!("commerce config unavailable: {err}"));
            }
        };
        if !config.enable_product_recommendations {
            return Enrichment::Skipped("recommendations disabled".to_string());
        }
        if config.access_token.is_empty() || config.shop_domain.is_empty() {
            return Enrichment::Skipped("incomplete credentials".to_string());
        }

        let products = match self.shopify.fetch_products(&config).await {
            Ok(products) => products,
            Err(err) => {
                warn!(slug = %agent.slug, shop = %config.shop_domain, error = %err, "product fetch failed");
                return Enrichment::Skipped(format!("product fetch failed: {err}"));
            }
        };
        let entries = catalog_entries(&products, config.max_products_to_show);
        if entries.is_empty() {
            return Enrichment::Skipped("catalogue is empty".to_string());
        }

        Enrichment::Enriched(render_catalog_prompt(&CatalogPromptContext {
            base_prompt: &agent.system_prompt,
            entries: &entries,
            max_products: config.max_products_to_show,
        }))
    }

    async fn effective_prompt(&self, agent: &Agent) -> String {
        match self.enrich(agent).await {
            Enrichment::Enriched(prompt) => {
                debug!(slug = %agent.slug, "system prompt enriched with catalogue");
                prompt
            }
            Enrichment::Skipped(reason) => {
                debug!(slug = %agent.slug, reason = %reason, "enrichment skipped");
                agent.system_prompt.clone()
            }
        }
    }

    /// Starts one chat turn. Lookup, validation and backend setup failures
    /// are returned directly; once the receiver is handed out every failure
    /// arrives as a terminal `ChatEvent::Error`.
    pub async fn invoke(
        &self,
        slug: &str,
        transcript: Vec<ChatTurn>,
    ) -> AppResult<mpsc::Receiver<ChatEvent>> {
        validate_transcript(&transcript).map_err(AppError::Validation)?;
        let agent = self.agents.get_by_slug(slug).await?;

        let prompt = self.effective_prompt(&agent).await;
        let backend = self.backends.select(agent.model_provider).map_err(|err| {
            error!(slug = %agent.slug, agent_id = %agent.id, error = %err, "model backend unavailable");
            AppError::Upstream(err.to_string())
        })?;

        let mut turns = Vec::with_capacity(transcript.len() + 1);
        turns.push(ChatTurn::new(Role::System, prompt));
        turns.extend(transcript);

        let deltas = backend.stream_chat(&turns).await.map_err(|err| {
            error!(slug = %agent.slug, agent_id = %agent.id, error = %err, "model request failed");
            AppError::Upstream(err.to_string())
        })?;

        info!(
            slug = %agent.slug,
            agent_id = %agent.id,
            provider = %agent.model_provider,
            turns = turns.len(),
            "chat turn started"
        );
        let (tx, rx) = mpsc::channel(RELAY_CAPACITY);
        tokio::spawn(relay(agent.slug.clone(), agent.id, deltas, tx));
        Ok(rx)
    }
}

/// Forwards deltas in order and finishes with exactly one terminal event.
/// A dropped receiver ends the relay early.
pub async fn relay(
    slug: String,
    agent_id: Uuid,
    mut deltas: DeltaStream,
    tx: mpsc::Sender<ChatEvent>,
) {
    let mut relayed = 0usize;
    while let Some(item) = deltas.next().await {
        match item {
            Ok(text) => {
                if tx.send(ChatEvent::Delta(text)).await.is_err() {
                    debug!(%slug, %agent_id, relayed, "chat client went away");
                    return;
                }
                relayed += 1;
            }
            Err(err) => {
                warn!(%slug, %agent_id, relayed, error = %err, "model stream failed");
                let _ = tx.send(ChatEvent::Error(GENERIC_FAILURE.to_string())).await;
                return;
            }
        }
    }
    debug!(%slug, %agent_id, relayed, "chat turn finished");
    let _ = tx.send(ChatEvent::Done).await;
}
