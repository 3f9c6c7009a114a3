use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    ensure_success, split_system, sse::delta_stream, DeltaStream, GenerationParams, LlmError,
    ModelBackend,
};
use crate::types::{ChatTurn, ModelProvider, Role};

const MODEL: &str = "gemini-1.5-pro";

pub struct GeminiBackend {
    http: reqwest::Client,
    url: String,
    api_key: String,
    params: GenerationParams,
}

impl GeminiBackend {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: String,
        params: GenerationParams,
    ) -> Self {
        Self {
            http,
            url: format!(
                "{}/v1beta/models/{MODEL}:streamGenerateContent?alt=sse",
                base_url.trim_end_matches('/')
            ),
            api_key,
            params,
        }
    }

    fn request_body(&self, transcript: &[ChatTurn]) -> Value {
        let (system, turns) = split_system(transcript);
        let contents = turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": turn.content }] })
            })
            .collect::<Vec<_>>();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.params.temperature,
                "maxOutputTokens": self.params.max_output_tokens,
            }
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

fn extract_delta(value: &Value) -> Result<Option<String>, LlmError> {
    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown Gemini error");
        return Err(LlmError::Stream(message.to_string()));
    }
    let text = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .filter(|text| !text.is_empty());
    Ok(text)
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Gemini
    }

    async fn stream_chat(&self, transcript: &[ChatTurn]) -> Result<DeltaStream, LlmError> {
        let response = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(transcript))
            .send()
            .await?;
        let response = ensure_success(ModelProvider::Gemini, response).await?;
        Ok(delta_stream(response, extract_delta))
    }
}
