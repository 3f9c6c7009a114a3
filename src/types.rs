use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{agents::AgentService, chat::ChatService, commerce::ShopifyClient, config::Config};

/// Backend that serves an agent's chat turns.
///
/// Gemini is the primary provider; `"primary"` is accepted as an alias on
/// input and always written back as `"gemini"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[serde(alias = "primary")]
    Gemini,
    Anthropic,
    Cohere,
}

impl ModelProvider {
    pub const ALL: [ModelProvider; 3] = [
        ModelProvider::Gemini,
        ModelProvider::Anthropic,
        ModelProvider::Cohere,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProvider::Gemini => "gemini",
            ModelProvider::Anthropic => "anthropic",
            ModelProvider::Cohere => "cohere",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" | "primary" => Some(ModelProvider::Gemini),
            "anthropic" => Some(ModelProvider::Anthropic),
            "cohere" => Some(ModelProvider::Cohere),
            _ => None,
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the authenticated dashboard user, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    pub fn new(id: impl Into<String>) -> Self {
        Owner(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub slug: String,
    pub system_prompt: String,
    pub model_provider: ModelProvider,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw agent form as submitted by the dashboard. Missing fields are errors on
/// create and "keep the current value" on update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AgentInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model_provider: Option<String>,
}

/// Agent fields after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFields {
    pub name: String,
    pub slug: String,
    pub system_prompt: String,
    pub model_provider: ModelProvider,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AgentStatusBody {
    pub is_active: bool,
}

/// Field name to list of human readable violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonPosition {
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
}

impl ButtonPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonPosition::BottomRight => "bottom-right",
            ButtonPosition::BottomLeft => "bottom-left",
            ButtonPosition::TopRight => "top-right",
            ButtonPosition::TopLeft => "top-left",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bottom-right" => Some(ButtonPosition::BottomRight),
            "bottom-left" => Some(ButtonPosition::BottomLeft),
            "top-right" => Some(ButtonPosition::TopRight),
            "top-left" => Some(ButtonPosition::TopLeft),
            _ => None,
        }
    }

    /// CSS offsets anchoring both the launcher and the chat container.
    pub fn css_offsets(&self) -> &'static str {
        match self {
            ButtonPosition::BottomRight => "bottom: 20px; right: 20px;",
            ButtonPosition::BottomLeft => "bottom: 20px; left: 20px;",
            ButtonPosition::TopRight => "top: 20px; right: 20px;",
            ButtonPosition::TopLeft => "top: 20px; left: 20px;",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonIcon {
    Message,
    Chat,
    Help,
    Support,
}

impl ButtonIcon {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonIcon::Message => "message",
            ButtonIcon::Chat => "chat",
            ButtonIcon::Help => "help",
            ButtonIcon::Support => "support",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "message" => Some(ButtonIcon::Message),
            "chat" => Some(ButtonIcon::Chat),
            "help" => Some(ButtonIcon::Help),
            "support" => Some(ButtonIcon::Support),
            _ => None,
        }
    }
}

pub const DEFAULT_HEADER_TITLE: &str = "Chat Support";

/// Widget appearance. Every omitted field takes its default; unknown fields
/// are rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct UiConfig {
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
    pub button_position: ButtonPosition,
    pub button_size: u32,
    pub widget_width: u32,
    pub widget_height: u32,
    pub border_radius: u32,
    pub welcome_message: String,
    pub button_icon: ButtonIcon,
    pub header_title: String,
    pub show_agent_avatar: bool,
    pub show_timestamp: bool,
    pub show_typing_indicator: bool,
    pub enable_dark_mode: bool,
    pub allow_attachments: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            primary_color: "#0070f3".to_string(),
            secondary_color: "#f5f5f5".to_string(),
            background_color: "#ffffff".to_string(),
            text_color: "#333333".to_string(),
            button_position: ButtonPosition::BottomRight,
            button_size: 60,
            widget_width: 380,
            widget_height: 600,
            border_radius: 8,
            welcome_message: "Hello! How can I help you today?".to_string(),
            button_icon: ButtonIcon::Message,
            header_title: DEFAULT_HEADER_TITLE.to_string(),
            show_agent_avatar: true,
            show_timestamp: true,
            show_typing_indicator: true,
            enable_dark_mode: false,
            allow_attachments: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_products() -> u32 {
    3
}

/// Shopify credentials and recommendation settings for one agent.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommerceConfig {
    #[serde(default)]
    pub shop_domain: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret_key: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_true")]
    pub enable_product_recommendations: bool,
    #[serde(default = "default_max_products")]
    pub max_products_to_show: u32,
}

impl fmt::Debug for CommerceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommerceConfig")
            .field("shop_domain", &self.shop_domain)
            .field("api_key", &"<redacted>")
            .field("api_secret_key", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field(
                "enable_product_recommendations",
                &self.enable_product_recommendations,
            )
            .field("max_products_to_show", &self.max_products_to_show)
            .finish()
    }
}

/// What the dashboard may read back; secrets never leave the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommerceConfigView {
    pub shop_domain: String,
    pub enable_product_recommendations: bool,
    pub max_products_to_show: u32,
    pub has_credentials: bool,
}

impl From<&CommerceConfig> for CommerceConfigView {
    fn from(config: &CommerceConfig) -> Self {
        Self {
            shop_domain: config.shop_domain.clone(),
            enable_product_recommendations: config.enable_product_recommendations,
            max_products_to_show: config.max_products_to_show,
            has_credentials: !config.access_token.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ShopConnectionTest {
    #[serde(default)]
    pub shop_domain: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat/{slug}`. Chat clients attach ids and timestamps to
/// each message, so extra per-message keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
}

pub struct AppState {
    pub config: Config,
    pub agents: AgentService,
    pub chat: ChatService,
    pub shopify: ShopifyClient,
}
