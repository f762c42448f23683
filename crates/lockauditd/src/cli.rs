use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lockaudit_config::CompletionProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct IngestArgs {
    #[arg(help = "Path to package-lock.json or a CycloneDX JSON SBOM")]
    pub manifest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Args)]
pub struct AdvisoryArgs {
    #[arg(long, help = "Advisory service base URL (overrides [advisory].endpoint)")]
    pub advisory_endpoint: Option<String>,

    #[arg(long, help = "Advisory ecosystem name (overrides [advisory].ecosystem)")]
    pub ecosystem: Option<String>,

    #[arg(long, help = "Packages per batch query (overrides [advisory].batch_size)")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct AuditArgs {
    #[arg(
        required_unless_present = "project",
        conflicts_with = "project",
        help = "Path to package-lock.json or a CycloneDX JSON SBOM"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        long,
        help = "Project directory; an SBOM is generated from its package-lock.json"
    )]
    pub project: Option<PathBuf>,

    #[command(flatten)]
    pub advisory: AdvisoryArgs,
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct AskArgs {
    #[arg(help = "Question about the dependency graph")]
    pub question: String,

    #[arg(long, value_parser = parse_completion_provider)]
    pub provider: Option<CompletionProviderKind>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, help = "Completion API base URL")]
    pub endpoint: Option<String>,

    #[arg(long, help = "Environment variable holding the completion API key")]
    pub api_key_env: Option<String>,

    #[arg(long, help = "Completion round-trips before the fallback summary")]
    pub max_steps: Option<u32>,

    #[arg(long, help = "Row cap appended to queries without a LIMIT")]
    pub max_rows: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Commands {
    /// Create .lockaudit/config.toml with defaults and an empty graph
    Init,
    /// Ingest a lockfile or SBOM into the graph
    Ingest(IngestArgs),
    /// Link every versioned package to the advisories that affect it
    Enrich(AdvisoryArgs),
    /// Ingest then enrich, and report the package total
    Audit(AuditArgs),
    /// Answer a question from read-only graph queries
    Ask(AskArgs),
    /// Print node and relationship counts
    Stats,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Dependency lockfile graph auditor")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding .lockaudit/config.toml"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        help = "Graph database path (overrides [storage].graph_path)"
    )]
    pub db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(
        long,
        global = true,
        help = "Log at debug level when RUST_LOG is unset"
    )]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_completion_provider(value: &str) -> Result<CompletionProviderKind, String> {
    value.parse()
}
