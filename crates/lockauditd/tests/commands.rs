use std::fs;
use std::path::Path;

use lockaudit_advisory::{AdvisoryRecord, MockAdvisorySource};
use lockaudit_config::{LockauditConfig, ensure_workspace_config};
use lockaudit_infer::{AssistantMessage, MockCompletionProvider, ToolCall};
use lockaudit_query::{AgentOutcome, GRAPH_QUERY_TOOL};
use lockauditd::commands::{
    ManifestSource, Workspace, run_audit, run_ask, run_enrich, run_ingest, run_init, run_stats,
};

const LOCKFILE: &str = r#"{
  "name": "app",
  "version": "1.0.0",
  "lockfileVersion": 3,
  "packages": {
    "": {"name": "app", "version": "1.0.0", "dependencies": {"left-pad": "^1.2.0"}},
    "node_modules/left-pad": {"version": "1.2.0"}
  }
}"#;

fn workspace(root: &Path) -> Workspace {
    Workspace::new(root.to_path_buf(), LockauditConfig::default(), None)
}

fn write_lockfile(root: &Path) -> ManifestSource {
    let path = root.join("package-lock.json");
    fs::write(&path, LOCKFILE).expect("write lockfile");
    ManifestSource::File(path)
}

fn output(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).expect("utf8 output")
}

fn value<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
}

#[test]
fn init_creates_config_and_empty_graph() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    let config = ensure_workspace_config(root)?;
    let workspace = Workspace::new(root.to_path_buf(), config, None);

    let mut out = Vec::new();
    run_init(&workspace, &mut out)?;
    let out = output(out);

    assert!(root.join(".lockaudit/config.toml").exists());
    assert!(root.join("lockaudit.db").exists());
    assert_eq!(
        value(&out, "graph"),
        Some(root.join("lockaudit.db").display().to_string().as_str())
    );
    Ok(())
}

#[test]
fn ingest_reports_summary_and_stats_count_nodes() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    let workspace = workspace(root);
    let source = write_lockfile(root);

    let mut out = Vec::new();
    let summary = run_ingest(&workspace, &source, &mut out)?;
    let out = output(out);

    assert_eq!(summary.instances, 2);
    assert_eq!(value(&out, "format"), Some("lockfile"));
    assert_eq!(value(&out, "packages"), Some("2"));
    assert_eq!(value(&out, "resolved"), Some("1"));
    assert!(
        value(&out, "project").is_some_and(|project| project.ends_with("package-lock.json"))
    );

    let mut stats = Vec::new();
    run_stats(&workspace, &mut stats)?;
    let stats = output(stats);
    assert_eq!(value(&stats, "projects"), Some("1"));
    assert_eq!(value(&stats, "lock_packages"), Some("2"));
    assert_eq!(value(&stats, "has_dep"), Some("1"));
    assert_eq!(value(&stats, "affects"), Some("0"));
    assert_eq!(stats.lines().count(), 12);
    Ok(())
}

#[test]
fn missing_manifest_is_reported_with_its_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = workspace(temp.path());
    let missing = temp.path().join("nope.json");

    let err = run_ingest(&workspace, &ManifestSource::File(missing), &mut Vec::new())
        .expect_err("missing manifest should fail");
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn unsupported_manifest_aborts_before_graph_changes() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    let workspace = workspace(root);
    let path = root.join("weird.json");
    fs::write(&path, r#"{"dependencies": {}}"#)?;

    assert!(run_ingest(&workspace, &ManifestSource::File(path), &mut Vec::new()).is_err());

    let mut stats = Vec::new();
    run_stats(&workspace, &mut stats)?;
    assert_eq!(value(&output(stats), "projects"), Some("0"));
    Ok(())
}

#[tokio::test]
async fn audit_ingests_enriches_and_reports_total() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    let workspace = workspace(root);
    let source = write_lockfile(root);
    let advisories = MockAdvisorySource::new()
        .with_advisory(AdvisoryRecord::new("GHSA-pad"), &[("left-pad", "1.2.0")]);

    let mut out = Vec::new();
    run_audit(&workspace, &source, &advisories, &mut out).await?;
    let out = output(out);

    assert_eq!(value(&out, "vulnerability_ids"), Some("1"));
    assert_eq!(value(&out, "package_hits"), Some("1"));
    assert_eq!(value(&out, "total_packages"), Some("2"));

    let mut again = Vec::new();
    let summary = run_enrich(&workspace, &advisories, &mut again).await?;
    assert_eq!(summary.vulnerability_ids, 1);

    let mut stats = Vec::new();
    run_stats(&workspace, &mut stats)?;
    assert_eq!(value(&output(stats), "affects"), Some("1"));
    Ok(())
}

#[tokio::test]
async fn ask_answers_from_read_only_graph() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    let root = temp.path();
    let workspace = workspace(root);
    run_ingest(&workspace, &write_lockfile(root), &mut Vec::new())?;

    let provider = MockCompletionProvider::scripted([
        AssistantMessage::tool_calls(vec![ToolCall::function(
            "call_1",
            GRAPH_QUERY_TOOL,
            r#"{"query": "DELETE FROM package"}"#,
        )]),
        AssistantMessage::text("Nothing was deleted."),
    ]);

    let mut out = Vec::new();
    let answer = run_ask(&workspace, &provider, "mock", "delete everything", &mut out).await?;

    assert_eq!(answer.outcome, AgentOutcome::Done);
    assert_eq!(output(out).trim(), "Nothing was deleted.");

    let mut stats = Vec::new();
    run_stats(&workspace, &mut stats)?;
    assert_eq!(value(&output(stats), "packages"), Some("2"));
    Ok(())
}

#[tokio::test]
async fn ask_on_fresh_workspace_falls_back_to_zero_counts()
-> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    let mut workspace = workspace(temp.path());
    workspace.config.agent.max_steps = 0;

    let provider = MockCompletionProvider::new();
    let mut out = Vec::new();
    let answer = run_ask(&workspace, &provider, "mock", "anything?", &mut out).await?;

    assert_eq!(answer.outcome, AgentOutcome::Fallback);
    assert!(output(out).contains("- Packages: 0"));
    Ok(())
}
