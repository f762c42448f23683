use lockaudit_config::AgentConfig;
use lockaudit_infer::{ChatMessage, CompletionProvider, CompletionRequest, InferError, ToolCall};
use lockaudit_store::GraphStore;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::guard::QueryGuard;
use crate::prompt::{GRAPH_QUERY_TOOL, graph_query_tool, system_prompt, user_prompt};

pub const FALLBACK_HEADER: &str = "I could not finish the query loop. Grounded summary:";

const FALLBACK_COUNTS_QUERY: &str = "SELECT \
    (SELECT count(*) FROM package) AS packages, \
    (SELECT count(*) FROM vulnerability) AS vulnerabilities, \
    (SELECT count(*) FROM has_dep) AS dep_edges, \
    (SELECT count(*) FROM affects) AS affects_edges \
    LIMIT 1";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("question is required")]
    EmptyQuestion,
    #[error("completion service returned an empty response")]
    EmptyResponse,
    #[error("completion request failed: {0}")]
    Infer(#[from] InferError),
    #[error("invalid query guard pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Query loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Init,
    RequestCompletion,
    ExecuteToolCalls,
    Done,
    Fallback,
}

impl AgentState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::RequestCompletion => "request_completion",
            Self::ExecuteToolCalls => "execute_tool_calls",
            Self::Done => "done",
            Self::Fallback => "fallback",
        }
    }

    const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Fallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOutcome {
    /// The model produced a final text answer.
    Done,
    /// The step bound ran out; the answer is the grounded count summary.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentAnswer {
    pub answer: String,
    pub outcome: AgentOutcome,
    pub steps_used: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    pub model: String,
    pub max_steps: u32,
    pub max_rows: u32,
    pub temperature: f64,
}

impl AgentOptions {
    pub fn new(model: impl Into<String>, config: &AgentConfig) -> Self {
        Self {
            model: model.into(),
            max_steps: config.max_steps,
            max_rows: config.max_rows,
            temperature: config.temperature,
        }
    }
}

/// Bounded tool-calling loop that answers questions from graph queries.
pub struct QueryAgent<'a> {
    store: &'a dyn GraphStore,
    provider: &'a dyn CompletionProvider,
    guard: QueryGuard,
    options: AgentOptions,
}

impl<'a> QueryAgent<'a> {
    pub fn new(
        store: &'a dyn GraphStore,
        provider: &'a dyn CompletionProvider,
        options: AgentOptions,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            store,
            provider,
            guard: QueryGuard::new(options.max_rows)?,
            options,
        })
    }

    /// Runs the loop for one question.
    ///
    /// Tool failures and guard rejections are fed back to the model as `{"error": ...}`
    /// payloads. Running out of steps is not an error: the answer degrades to the fallback
    /// summary. Only an empty question, a completion failure, or an empty final reply
    /// surface as errors.
    pub async fn ask(&self, question: &str) -> Result<AgentAnswer, AgentError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::EmptyQuestion);
        }

        let mut state = AgentState::Init;
        let mut request = CompletionRequest {
            model: self.options.model.clone(),
            messages: Vec::new(),
            tools: vec![graph_query_tool()],
            temperature: self.options.temperature,
        };
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut answer: Option<String> = None;
        let mut steps_used: u32 = 0;

        while !state.is_terminal() {
            let next = match state {
                AgentState::Init => {
                    request.messages.push(ChatMessage::system(system_prompt()));
                    request.messages.push(ChatMessage::user(user_prompt(question)));
                    AgentState::RequestCompletion
                }
                AgentState::RequestCompletion if steps_used >= self.options.max_steps => {
                    AgentState::Fallback
                }
                AgentState::RequestCompletion => {
                    steps_used += 1;
                    let reply = self.provider.complete(&request).await?;

                    if reply.tool_calls.is_empty() {
                        let text = reply
                            .trimmed_content()
                            .ok_or(AgentError::EmptyResponse)?
                            .to_owned();
                        request.messages.push(reply.into());
                        answer = Some(text);
                        AgentState::Done
                    } else {
                        pending = reply.tool_calls.clone();
                        request.messages.push(reply.into());
                        AgentState::ExecuteToolCalls
                    }
                }
                AgentState::ExecuteToolCalls => {
                    for call in pending.drain(..) {
                        let content = self.execute_tool_call(&call);
                        request.messages.push(ChatMessage::tool(call.id, content));
                    }
                    AgentState::RequestCompletion
                }
                AgentState::Done | AgentState::Fallback => state,
            };

            tracing::debug!(
                from = state.as_str(),
                to = next.as_str(),
                step = steps_used,
                "query agent transition"
            );
            state = next;
        }

        let (answer, outcome) = match (state, answer) {
            (AgentState::Done, Some(answer)) => (answer, AgentOutcome::Done),
            _ => {
                tracing::info!(
                    max_steps = self.options.max_steps,
                    "query loop exhausted its steps; answering with fallback summary"
                );
                (self.fallback_summary(), AgentOutcome::Fallback)
            }
        };

        Ok(AgentAnswer {
            answer,
            outcome,
            steps_used,
        })
    }

    /// Result payload for one tool call, always a JSON string.
    fn execute_tool_call(&self, call: &ToolCall) -> String {
        if call.function.name != GRAPH_QUERY_TOOL {
            tracing::warn!(tool = %call.function.name, "model requested an unknown tool");
            return error_payload(&format!("Unknown tool: {}", call.function.name));
        }

        let arguments = parse_arguments(&call.function.arguments);
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match self.guard.run(self.store, query) {
            Ok(result) => {
                tracing::debug!(rows = result.row_count, "graph query executed");
                serde_json::to_string(&result)
                    .unwrap_or_else(|err| error_payload(&err.to_string()))
            }
            Err(err) => {
                tracing::debug!(error = %err, "graph query failed");
                error_payload(&err.to_string())
            }
        }
    }

    fn fallback_summary(&self) -> String {
        let counts = match self.guard.run(self.store, FALLBACK_COUNTS_QUERY) {
            Ok(result) => result.rows.into_iter().next().unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "fallback count query failed");
                Map::new()
            }
        };

        fallback_text(&counts)
    }
}

/// Malformed or non-object arguments degrade to an empty argument set.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn error_payload(message: &str) -> String {
    json!({ "error": message }).to_string()
}

fn fallback_text(counts: &Map<String, Value>) -> String {
    let count = |column: &str| match counts.get(column) {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.clone(),
        _ => "unknown".to_owned(),
    };

    [
        FALLBACK_HEADER.to_owned(),
        String::new(),
        format!("- Packages: {}", count("packages")),
        format!("- Vulnerabilities: {}", count("vulnerabilities")),
        format!("- Dependency edges: {}", count("dep_edges")),
        format!("- Affects edges: {}", count("affects_edges")),
    ]
    .join("\n")
}
