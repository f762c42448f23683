use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{AssistantMessage, ChatMessage, CompletionProvider, CompletionRequest, InferError};

pub const MOCK_MODEL_NAME: &str = "mock";

/// Offline completion provider.
///
/// Scripted replies are returned in order; once the script runs out every call answers
/// with a fixed text built from the last user message.
#[derive(Debug, Default)]
pub struct MockCompletionProvider {
    replies: Mutex<VecDeque<AssistantMessage>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(replies: impl IntoIterator<Item = AssistantMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<AssistantMessage, InferError> {
        self.requests
            .lock()
            .map_err(|err| InferError::LockPoisoned(err.to_string()))?
            .push(request.clone());

        let scripted = self
            .replies
            .lock()
            .map_err(|err| InferError::LockPoisoned(err.to_string()))?
            .pop_front();

        Ok(scripted.unwrap_or_else(|| AssistantMessage::text(default_answer(request))))
    }
}

fn default_answer(request: &CompletionRequest) -> String {
    let question = request
        .messages
        .iter()
        .rev()
        .find_map(|message| match message {
            ChatMessage::User { content } => Some(content.trim()),
            _ => None,
        })
        .unwrap_or_default();

    format!("Mock answer (no completion service configured) for: {question}")
}
