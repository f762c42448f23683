use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiKey, AssistantMessage, CompletionProvider, CompletionRequest, InferError};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and API-compatible servers.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: ApiKey,
    api_base: String,
}

impl OpenAiProvider {
    pub fn new(api_key: ApiKey, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|base| base.trim().trim_end_matches('/').to_owned())
            .filter(|base| !base.is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_owned());

        Self {
            client: reqwest::Client::new(),
            api_key,
            api_base,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<AssistantMessage, InferError> {
        let response_value: Value = self
            .client
            .post(self.endpoint_url())
            .bearer_auth(self.api_key.bearer())
            .json(&request_body(request))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        extract_assistant_message(&response_value)
    }
}

fn request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages,
        "temperature": request.temperature,
    });
    if !request.tools.is_empty() {
        body["tools"] = json!(request.tools);
        body["tool_choice"] = json!("auto");
    }
    body
}

fn extract_assistant_message(response: &Value) -> Result<AssistantMessage, InferError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| InferError::InvalidResponse("missing choices[0].message".to_owned()))?;

    Ok(AssistantMessage::deserialize(message)?)
}
