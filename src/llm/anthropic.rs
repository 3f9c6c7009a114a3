use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    ensure_success, split_system, sse::delta_stream, DeltaStream, GenerationParams, LlmError,
    ModelBackend,
};
use crate::types::{ChatTurn, ModelProvider};

const MODEL: &str = "claude-3-opus-20240229";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    http: reqwest::Client,
    url: String,
    api_key: String,
    params: GenerationParams,
}

impl AnthropicBackend {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: String,
        params: GenerationParams,
    ) -> Self {
        Self {
            http,
            url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            api_key,
            params,
        }
    }

    fn request_body(&self, transcript: &[ChatTurn]) -> Value {
        let (system, turns) = split_system(transcript);
        let messages = turns
            .iter()
            .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.content }))
            .collect::<Vec<_>>();
        let mut body = json!({
            "model": MODEL,
            "messages": messages,
            "max_tokens": self.params.max_output_tokens,
            "temperature": self.params.temperature,
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
        body
    }
}

fn extract_delta(value: &Value) -> Result<Option<String>, LlmError> {
    match value.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => Ok(value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)),
        Some("error") => {
            let message = value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown Anthropic error");
            Err(LlmError::Stream(message.to_string()))
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Anthropic
    }

    async fn stream_chat(&self, transcript: &[ChatTurn]) -> Result<DeltaStream, LlmError> {
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(transcript))
            .send()
            .await?;
        let response = ensure_success(ModelProvider::Anthropic, response).await?;
        Ok(delta_stream(response, extract_delta))
    }
}
