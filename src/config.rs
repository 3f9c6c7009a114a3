use std::env;

use crate::types::ModelProvider;

pub const GEMINI_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const COHERE_KEY_VAR: &str = "COHERE_API_KEY";

/// One API key per provider. A missing key only fails chats routed to that
/// provider.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub gemini: Option<String>,
    pub anthropic: Option<String>,
    pub cohere: Option<String>,
}

impl ProviderCredentials {
    pub fn for_provider(&self, provider: ModelProvider) -> Option<&str> {
        match provider {
            ModelProvider::Gemini => self.gemini.as_deref(),
            ModelProvider::Anthropic => self.anthropic.as_deref(),
            ModelProvider::Cohere => self.cohere.as_deref(),
        }
    }

    pub fn env_var(provider: ModelProvider) -> &'static str {
        match provider {
            ModelProvider::Gemini => GEMINI_KEY_VAR,
            ModelProvider::Anthropic => ANTHROPIC_KEY_VAR,
            ModelProvider::Cohere => COHERE_KEY_VAR,
        }
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("gemini", &self.gemini.is_some())
            .field("anthropic", &self.anthropic.is_some())
            .field("cohere", &self.cohere.is_some())
            .finish()
    }
}

/// API roots, overridable for proxies and tests.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub gemini: String,
    pub anthropic: String,
    pub cohere: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            gemini: "https://generativelanguage.googleapis.com".to_string(),
            anthropic: "https://api.anthropic.com".to_string(),
            cohere: "https://api.cohere.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub public_base_url: String,
    pub store: StoreBackend,
    pub database_url: String,
    pub auth_signing_secret: String,
    pub credentials: ProviderCredentials,
    pub endpoints: ProviderEndpoints,
    /// Replaces `https://{shop}.myshopify.com` when set.
    pub commerce_base_url: Option<String>,
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

pub fn resolve_database_url() -> String {
    if let Some(url) = env_nonempty("DATABASE_URL") {
        return url;
    }
    let host = env_nonempty("POSTGRES_HOST")
        .or_else(|| env_nonempty("PGHOST"))
        .unwrap_or_else(|| "localhost".to_string());
    let port = env_nonempty("POSTGRES_PORT")
        .or_else(|| env_nonempty("PGPORT"))
        .unwrap_or_else(|| "5432".to_string());
    let user = env_nonempty("POSTGRES_USER")
        .or_else(|| env_nonempty("PGUSER"))
        .unwrap_or_else(|| "postgres".to_string());
    let password = env_nonempty("POSTGRES_PASSWORD")
        .or_else(|| env_nonempty("PGPASSWORD"))
        .unwrap_or_else(|| "postgres".to_string());
    let db = env_nonempty("POSTGRES_DB")
        .or_else(|| env_nonempty("PGDATABASE"))
        .unwrap_or_else(|| "chattercraft".to_string());
    format!("postgres://{user}:{password}@{host}:{port}/{db}")
}

impl Config {
    /// Reads the process environment. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Self {
        let port = env_nonempty("PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(4000);
        let public_base_url = trim_url(
            env_nonempty("API_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}")),
        );
        let store = match env_nonempty("STORE").as_deref() {
            Some("memory") => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        };
        let defaults = ProviderEndpoints::default();

        Self {
            port,
            public_base_url,
            store,
            database_url: resolve_database_url(),
            auth_signing_secret: env_nonempty("AUTH_SIGNING_SECRET").unwrap_or_default(),
            credentials: ProviderCredentials {
                gemini: env_nonempty(GEMINI_KEY_VAR),
                anthropic: env_nonempty(ANTHROPIC_KEY_VAR),
                cohere: env_nonempty(COHERE_KEY_VAR),
            },
            endpoints: ProviderEndpoints {
                gemini: trim_url(env_nonempty("GEMINI_API_BASE").unwrap_or(defaults.gemini)),
                anthropic: trim_url(
                    env_nonempty("ANTHROPIC_API_BASE").unwrap_or(defaults.anthropic),
                ),
                cohere: trim_url(env_nonempty("COHERE_API_BASE").unwrap_or(defaults.cohere)),
            },
            commerce_base_url: env_nonempty("SHOPIFY_API_BASE").map(trim_url),
        }
    }

    /// In-memory configuration with no credentials, for tests and local tooling.
    pub fn local(public_base_url: &str, auth_signing_secret: &str) -> Self {
        Self {
            port: 0,
            public_base_url: trim_url(public_base_url.to_string()),
            store: StoreBackend::Memory,
            database_url: String::new(),
            auth_signing_secret: auth_signing_secret.to_string(),
            credentials: ProviderCredentials::default(),
            endpoints: ProviderEndpoints::default(),
            commerce_base_url: None,
        }
    }
}
