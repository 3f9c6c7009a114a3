//! Streaming chat adapters for the supported model providers.

mod anthropic;
mod cohere;
mod gemini;
pub mod sse;

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;
use tracing::error;

pub use anthropic::AnthropicBackend;
pub use cohere::CohereBackend;
pub use gemini::GeminiBackend;

use crate::{
    config::{ProviderCredentials, ProviderEndpoints},
    types::{ChatTurn, ModelProvider, Role},
};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} is not configured")]
    MissingCredential(&'static str),

    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("provider stream failed: {0}")]
    Stream(String),
}

/// Ordered text deltas of one completion.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

pub const DEFAULT_GENERATION: GenerationParams = GenerationParams {
    temperature: 0.7,
    max_output_tokens: 2048,
};

#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn provider(&self) -> ModelProvider;

    /// Submits the whole transcript, system turn first, and returns the
    /// completion as it is generated.
    async fn stream_chat(&self, transcript: &[ChatTurn]) -> Result<DeltaStream, LlmError>;
}

/// Picks the adapter serving a provider.
pub trait BackendSelector: Send + Sync {
    fn select(&self, provider: ModelProvider) -> Result<Arc<dyn ModelBackend>, LlmError>;
}

/// Builds adapters from the configured credentials on demand.
pub struct ProviderRegistry {
    http: reqwest::Client,
    credentials: ProviderCredentials,
    endpoints: ProviderEndpoints,
    params: GenerationParams,
}

impl ProviderRegistry {
    pub fn new(
        http: reqwest::Client,
        credentials: ProviderCredentials,
        endpoints: ProviderEndpoints,
    ) -> Self {
        Self {
            http,
            credentials,
            endpoints,
            params: DEFAULT_GENERATION,
        }
    }
}

impl BackendSelector for ProviderRegistry {
    fn select(&self, provider: ModelProvider) -> Result<Arc<dyn ModelBackend>, LlmError> {
        let api_key = self
            .credentials
            .for_provider(provider)
            .ok_or(LlmError::MissingCredential(ProviderCredentials::env_var(provider)))?
            .to_string();
        let http = self.http.clone();
        let backend: Arc<dyn ModelBackend> = match provider {
            ModelProvider::Gemini => Arc::new(GeminiBackend::new(
                http,
                &self.endpoints.gemini,
                api_key,
                self.params,
            )),
            ModelProvider::Anthropic => Arc::new(AnthropicBackend::new(
                http,
                &self.endpoints.anthropic,
                api_key,
                self.params,
            )),
            ModelProvider::Cohere => Arc::new(CohereBackend::new(
                http,
                &self.endpoints.cohere,
                api_key,
                self.params,
            )),
        };
        Ok(backend)
    }
}

/// Splits off the leading system turn, joining several if present.
pub(crate) fn split_system(transcript: &[ChatTurn]) -> (Option<String>, Vec<&ChatTurn>) {
    let system = transcript
        .iter()
        .filter(|turn| turn.role == Role::System)
        .map(|turn| turn.content.as_str())
        .collect::<Vec<_>>();
    let rest = transcript
        .iter()
        .filter(|turn| turn.role != Role::System)
        .collect::<Vec<_>>();
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}

pub(crate) async fn ensure_success(
    provider: ModelProvider,
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!(%provider, %status, "model provider rejected request");
    Err(LlmError::Api { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_fails_only_that_provider() {
        let registry = ProviderRegistry::new(
            reqwest::Client::new(),
            ProviderCredentials {
                cohere: Some("co-key".into()),
                ..ProviderCredentials::default()
            },
            ProviderEndpoints::default(),
        );
        let err = registry.select(ModelProvider::Gemini).err().unwrap();
        assert!(matches!(err, LlmError::MissingCredential("GOOGLE_API_KEY")));
        let backend = registry.select(ModelProvider::Cohere).ok().unwrap();
        assert_eq!(backend.provider(), ModelProvider::Cohere);
    }

    #[test]
    fn system_turns_are_split_from_the_conversation() {
        let transcript = vec![
            ChatTurn::new(Role::System, "Be brief."),
            ChatTurn::new(Role::User, "hi"),
            ChatTurn::new(Role::Assistant, "hello"),
        ];
        let (system, rest) = split_system(&transcript);
        assert_eq!(system.as_deref(), Some("Be brief."));
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].role, Role::User);
    }
}
