use async_trait::async_trait;
use lockaudit_graph::ingest_manifest;
use lockaudit_infer::{
    AssistantMessage, ChatMessage, CompletionProvider, CompletionRequest, InferError,
    MockCompletionProvider, ToolCall,
};
use lockaudit_manifest::parse_manifest;
use lockaudit_query::{
    AgentError, AgentOptions, AgentOutcome, FALLBACK_HEADER, GRAPH_QUERY_TOOL, QueryAgent,
};
use lockaudit_store::{SqliteGraphStore, graph_stats};
use serde_json::Value;
use tempfile::{TempDir, tempdir};

const LOCKFILE: &str = r#"{
  "lockfileVersion": 3,
  "packages": {
    "": {"name": "app", "version": "1.0.0", "dependencies": {"left-pad": "^1.2.0"}},
    "node_modules/left-pad": {"version": "1.2.0"}
  }
}"#;

fn seeded_store() -> (TempDir, SqliteGraphStore) {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("graph.db");
    {
        let store = SqliteGraphStore::open(&path).expect("open store");
        let manifest = parse_manifest(LOCKFILE).expect("parse lockfile");
        ingest_manifest(&store, "/work/app/package-lock.json", &manifest).expect("ingest");
    }
    let store = SqliteGraphStore::open_read_only(&path).expect("open read-only");
    (temp, store)
}

fn options(max_steps: u32) -> AgentOptions {
    AgentOptions {
        model: "mock".to_owned(),
        max_steps,
        max_rows: 200,
        temperature: 0.1,
    }
}

fn query_call(id: &str, query: &str) -> ToolCall {
    let arguments = serde_json::json!({ "query": query }).to_string();
    ToolCall::function(id, GRAPH_QUERY_TOOL, &arguments)
}

/// Tool-result messages from the last request the provider saw, as `(call id, payload)`.
fn tool_results(provider: &MockCompletionProvider) -> Vec<(String, Value)> {
    let requests = provider.requests();
    let Some(last) = requests.last() else {
        return Vec::new();
    };

    last.messages
        .iter()
        .filter_map(|message| match message {
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => Some((
                tool_call_id.clone(),
                serde_json::from_str(content).expect("tool payload is JSON"),
            )),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn tool_results_feed_the_final_answer() {
    let (_temp, store) = seeded_store();
    let provider = MockCompletionProvider::scripted([
        AssistantMessage::tool_calls(vec![query_call(
            "call_1",
            "SELECT key FROM package ORDER BY key;",
        )]),
        AssistantMessage::text("  left-pad@1.2.0 is the only dependency of app@1.0.0.  "),
    ]);

    let agent = QueryAgent::new(&store, &provider, options(8)).expect("agent");
    let answer = agent
        .ask("Which packages does app use?")
        .await
        .expect("answer");

    assert_eq!(answer.outcome, AgentOutcome::Done);
    assert_eq!(answer.steps_used, 2);
    assert_eq!(
        answer.answer,
        "left-pad@1.2.0 is the only dependency of app@1.0.0."
    );

    let results = tool_results(&provider);
    assert_eq!(results.len(), 1);
    let (id, payload) = &results[0];
    assert_eq!(id, "call_1");
    assert_eq!(payload["query"], "SELECT key FROM package ORDER BY key\nLIMIT 200");
    assert_eq!(payload["rowCount"], 2);
    assert_eq!(payload["columns"], serde_json::json!(["key"]));
    assert_eq!(payload["rows"][1]["key"], "left-pad@1.2.0");

    let first_request = &provider.requests()[0];
    assert_eq!(first_request.model, "mock");
    assert_eq!(first_request.tools.len(), 1);
    assert_eq!(first_request.tools[0].function.name, GRAPH_QUERY_TOOL);
    assert!(matches!(
        &first_request.messages[1],
        ChatMessage::User { content } if content.starts_with("Question: Which packages does app use?")
    ));
}

#[tokio::test]
async fn endless_tool_calls_end_in_grounded_fallback() {
    let (_temp, store) = seeded_store();
    let replies = (0..12).map(|step| {
        AssistantMessage::tool_calls(vec![query_call(
            &format!("call_{step}"),
            "SELECT count(*) AS total FROM package",
        )])
    });
    let provider = MockCompletionProvider::scripted(replies);

    let agent = QueryAgent::new(&store, &provider, options(3)).expect("agent");
    let answer = agent.ask("Loop forever").await.expect("answer");

    assert_eq!(answer.outcome, AgentOutcome::Fallback);
    assert_eq!(answer.steps_used, 3);
    assert_eq!(provider.call_count(), 3);
    assert_eq!(
        answer.answer,
        format!(
            "{FALLBACK_HEADER}\n\n- Packages: 2\n- Vulnerabilities: 0\n- Dependency edges: 1\n- Affects edges: 0"
        )
    );
}

#[tokio::test]
async fn zero_step_budget_goes_straight_to_fallback() {
    let (_temp, store) = seeded_store();
    let provider = MockCompletionProvider::new();

    let agent = QueryAgent::new(&store, &provider, options(0)).expect("agent");
    let answer = agent.ask("anything").await.expect("answer");

    assert_eq!(answer.outcome, AgentOutcome::Fallback);
    assert_eq!(answer.steps_used, 0);
    assert_eq!(provider.call_count(), 0);
    assert!(answer.answer.starts_with(FALLBACK_HEADER));
}

#[tokio::test]
async fn tool_errors_are_reported_in_call_order() {
    let (_temp, store) = seeded_store();
    let provider = MockCompletionProvider::scripted([
        AssistantMessage::tool_calls(vec![
            ToolCall::function("bad_args", GRAPH_QUERY_TOOL, "{not json"),
            ToolCall::function("shell", "run_shell", r#"{"cmd": "rm -rf /"}"#),
            query_call("write", "SELECT 1; delete from package"),
            query_call("missing_table", "SELECT * FROM nowhere"),
            query_call("ok", "SELECT name FROM package WHERE name = 'left-pad' LIMIT 1"),
        ]),
        AssistantMessage::text("Recovered."),
    ]);

    let agent = QueryAgent::new(&store, &provider, options(8)).expect("agent");
    let answer = agent.ask("Try everything").await.expect("answer");
    assert_eq!(answer.outcome, AgentOutcome::Done);
    assert_eq!(answer.answer, "Recovered.");

    let results = tool_results(&provider);
    let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["bad_args", "shell", "write", "missing_table", "ok"]);

    assert_eq!(results[0].1["error"], "graph query is required");
    assert_eq!(results[1].1["error"], "Unknown tool: run_shell");
    assert_eq!(
        results[2].1["error"],
        "only read-only graph queries are allowed (found DELETE)"
    );
    assert!(
        results[3].1["error"]
            .as_str()
            .is_some_and(|error| error.starts_with("graph query failed"))
    );
    assert_eq!(results[4].1["query"], "SELECT name FROM package WHERE name = 'left-pad' LIMIT 1");
    assert_eq!(results[4].1["rowCount"], 1);

    assert_eq!(graph_stats(&store).expect("stats").packages, 2);
}

#[tokio::test]
async fn blank_question_is_rejected_before_any_completion() {
    let (_temp, store) = seeded_store();
    let provider = MockCompletionProvider::new();

    let agent = QueryAgent::new(&store, &provider, options(8)).expect("agent");
    assert!(matches!(
        agent.ask("   ").await,
        Err(AgentError::EmptyQuestion)
    ));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn empty_final_reply_is_an_error() {
    let (_temp, store) = seeded_store();
    let provider = MockCompletionProvider::scripted([AssistantMessage::text("   ")]);

    let agent = QueryAgent::new(&store, &provider, options(8)).expect("agent");
    assert!(matches!(
        agent.ask("question").await,
        Err(AgentError::EmptyResponse)
    ));
}

struct UnavailableProvider;

#[async_trait]
impl CompletionProvider for UnavailableProvider {
    async fn complete(&self, _request: &CompletionRequest) -> Result<AssistantMessage, InferError> {
        Err(InferError::InvalidResponse("no choices".to_owned()))
    }
}

#[tokio::test]
async fn completion_failure_propagates() {
    let (_temp, store) = seeded_store();

    let agent = QueryAgent::new(&store, &UnavailableProvider, options(8)).expect("agent");
    assert!(matches!(
        agent.ask("question").await,
        Err(AgentError::Infer(InferError::InvalidResponse(_)))
    ));
}

#[tokio::test]
async fn default_mock_answer_echoes_the_question() {
    let (_temp, store) = seeded_store();
    let provider = MockCompletionProvider::new();

    let agent = QueryAgent::new(&store, &provider, options(8)).expect("agent");
    let answer = agent.ask("what is vulnerable?").await.expect("answer");

    assert_eq!(answer.outcome, AgentOutcome::Done);
    assert!(answer.answer.contains("Question: what is vulnerable?"));
}
