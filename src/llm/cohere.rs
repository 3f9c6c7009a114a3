use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    ensure_success, sse::delta_stream, DeltaStream, GenerationParams, LlmError, ModelBackend,
};
use crate::types::{ChatTurn, ModelProvider};

const MODEL: &str = "command-r-plus";

pub struct CohereBackend {
    http: reqwest::Client,
    url: String,
    api_key: String,
    params: GenerationParams,
}

impl CohereBackend {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: String,
        params: GenerationParams,
    ) -> Self {
        Self {
            http,
            url: format!("{}/v2/chat", base_url.trim_end_matches('/')),
            api_key,
            params,
        }
    }

    // The v2 chat API accepts system turns inline.
    fn request_body(&self, transcript: &[ChatTurn]) -> Value {
        let messages = transcript
            .iter()
            .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.content }))
            .collect::<Vec<_>>();
        json!({
            "model": MODEL,
            "messages": messages,
            "temperature": self.params.temperature,
            "max_tokens": self.params.max_output_tokens,
            "stream": true,
        })
    }
}

fn extract_delta(value: &Value) -> Result<Option<String>, LlmError> {
    match value.get("type").and_then(Value::as_str) {
        Some("content-delta") => Ok(value
            .pointer("/delta/message/content/text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)),
        Some("message-end") => {
            let reason = value
                .pointer("/delta/finish_reason")
                .and_then(Value::as_str)
                .unwrap_or("COMPLETE");
            if reason == "ERROR" {
                return Err(LlmError::Stream("generation ended with an error".to_string()));
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl ModelBackend for CohereBackend {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Cohere
    }

    async fn stream_chat(&self, transcript: &[ChatTurn]) -> Result<DeltaStream, LlmError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("accept", "text/event-stream")
            .json(&self.request_body(transcript))
            .send()
            .await?;
        let response = ensure_success(ModelProvider::Cohere, response).await?;
        Ok(delta_stream(response, extract_delta))
    }
}
