use async_trait::async_trait;
use lockaudit_config::{CompletionConfig, CompletionProviderKind, DEFAULT_COMPLETION_API_KEY_ENV};
use thiserror::Error;

mod api_key;
mod messages;
mod mock;
mod openai;

pub use api_key::ApiKey;
pub use messages::{
    AssistantMessage, ChatMessage, CompletionRequest, FunctionCall, FunctionDefinition,
    ToolCall, ToolDefinition,
};
pub use mock::{MOCK_MODEL_NAME, MockCompletionProvider};
pub use openai::{DEFAULT_OPENAI_API_BASE, OpenAiProvider};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderOverrides {
    pub provider: Option<CompletionProviderKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
}

pub struct LoadedProvider {
    pub provider: Box<dyn CompletionProvider>,
    pub provider_name: String,
    pub model_name: String,
}

#[derive(Debug, Error)]
pub enum InferError {
    #[error("missing completion API key in {0}")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("failed to lock shared resource: {0}")]
    LockPoisoned(String),
}

/// A chat-completion service: message history plus tool schema in, one assistant turn out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<AssistantMessage, InferError>;
}

pub fn load_completion_provider(
    config: &CompletionConfig,
    overrides: ProviderOverrides,
) -> Result<LoadedProvider, InferError> {
    let selected_provider = overrides.provider.unwrap_or(config.provider);
    let selected_model = first_non_empty(overrides.model, Some(config.model.clone()))
        .unwrap_or_else(|| lockaudit_config::DEFAULT_COMPLETION_MODEL.to_owned());
    let selected_endpoint = first_non_empty(overrides.endpoint, config.endpoint.clone());
    let selected_api_key_env =
        first_non_empty(overrides.api_key_env, Some(config.api_key_env.clone()))
            .unwrap_or_else(|| DEFAULT_COMPLETION_API_KEY_ENV.to_owned());

    match selected_provider {
        CompletionProviderKind::Mock => Ok(LoadedProvider {
            provider: Box::new(MockCompletionProvider::new()),
            provider_name: CompletionProviderKind::Mock.as_str().to_owned(),
            model_name: MOCK_MODEL_NAME.to_owned(),
        }),
        CompletionProviderKind::Auto | CompletionProviderKind::OpenAi => {
            let api_key = ApiKey::from_env(&selected_api_key_env)
                .ok_or_else(|| InferError::MissingApiKey(selected_api_key_env.clone()))?;
            let provider = OpenAiProvider::new(api_key, selected_endpoint);
            tracing::debug!(
                endpoint = provider.api_base(),
                model = %selected_model,
                "using OpenAI-compatible completion provider"
            );

            Ok(LoadedProvider {
                provider: Box::new(provider),
                provider_name: CompletionProviderKind::OpenAi.as_str().to_owned(),
                model_name: selected_model,
            })
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn first_non_empty(left: Option<String>, right: Option<String>) -> Option<String> {
    normalize_optional(left).or_else(|| normalize_optional(right))
}
