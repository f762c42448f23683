use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use lockaudit_advisory::{AdvisorySource, OsvClient};
use lockaudit_config::{
    LockauditConfig, config_path, effective_batch_size, ensure_workspace_config, graph_path,
    load_workspace_config, validate_config,
};
use lockaudit_graph::{
    EnrichOptions, EnrichmentSummary, IngestSummary, enrich_graph, ingest_manifest,
};
use lockaudit_infer::{CompletionProvider, ProviderOverrides, load_completion_provider};
use lockaudit_manifest::{Manifest, generate_sbom, read_manifest};
use lockaudit_query::{AgentAnswer, AgentOptions, QueryAgent};
use lockaudit_store::{SqliteGraphStore, graph_stats};

use crate::cli::{AdvisoryArgs, AskArgs, Cli, Commands};

/// Where a manifest comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// A lockfile or CycloneDX JSON file on disk.
    File(PathBuf),
    /// A project directory; its SBOM is generated on the fly.
    Project(PathBuf),
}

/// Canonical workspace root, effective config and the graph database path.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: LockauditConfig,
    pub graph_path: PathBuf,
}

impl Workspace {
    pub fn new(root: PathBuf, config: LockauditConfig, db_override: Option<PathBuf>) -> Self {
        let graph_path = db_override.unwrap_or_else(|| graph_path(&root, &config));
        Self {
            root,
            config,
            graph_path,
        }
    }

    pub fn open_store(&self) -> Result<SqliteGraphStore> {
        SqliteGraphStore::open(&self.graph_path).with_context(|| {
            format!(
                "failed to open graph database {}",
                self.graph_path.display()
            )
        })
    }

    /// Read-only handle for the query agent. The schema is applied first, so a fresh
    /// workspace answers from empty tables instead of failing.
    pub fn open_read_only_store(&self) -> Result<SqliteGraphStore> {
        drop(self.open_store()?);
        SqliteGraphStore::open_read_only(&self.graph_path).with_context(|| {
            format!(
                "failed to open graph database {} read-only",
                self.graph_path.display()
            )
        })
    }

    pub fn apply_advisory_overrides(&mut self, args: &AdvisoryArgs) {
        if let Some(endpoint) = non_blank(args.advisory_endpoint.as_deref()) {
            self.config.advisory.endpoint = endpoint.to_owned();
        }
        if let Some(ecosystem) = non_blank(args.ecosystem.as_deref()) {
            self.config.advisory.ecosystem = ecosystem.to_owned();
        }
        if let Some(batch_size) = args.batch_size {
            self.config.advisory.batch_size = batch_size;
        }
    }

    pub fn apply_agent_overrides(&mut self, args: &AskArgs) {
        if let Some(max_steps) = args.max_steps {
            self.config.agent.max_steps = max_steps;
        }
        if let Some(max_rows) = args.max_rows {
            self.config.agent.max_rows = max_rows;
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let root = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = match cli.command {
        Commands::Init => ensure_workspace_config(&root),
        _ => load_workspace_config(&root),
    }
    .with_context(|| {
        format!(
            "failed to load workspace config at {}",
            config_path(&root).display()
        )
    })?;
    for warning in validate_config(&config) {
        eprintln!(
            "lockaudit config warning [{}]: {}",
            warning.code, warning.message
        );
    }

    let mut workspace = Workspace::new(root, config, cli.db);
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Init => run_init(&workspace, &mut out),
        Commands::Ingest(args) => {
            run_ingest(&workspace, &ManifestSource::File(args.manifest), &mut out)?;
            Ok(())
        }
        Commands::Enrich(args) => {
            workspace.apply_advisory_overrides(&args);
            let source = osv_client(&workspace.config)?;
            block_on(run_enrich(&workspace, &source, &mut out))??;
            Ok(())
        }
        Commands::Audit(args) => {
            workspace.apply_advisory_overrides(&args.advisory);
            let input = match (args.manifest, args.project) {
                (_, Some(project)) => ManifestSource::Project(project),
                (Some(manifest), None) => ManifestSource::File(manifest),
                (None, None) => anyhow::bail!("audit needs a manifest path or --project"),
            };
            let source = osv_client(&workspace.config)?;
            block_on(run_audit(&workspace, &input, &source, &mut out))?
        }
        Commands::Ask(args) => {
            workspace.apply_agent_overrides(&args);
            let overrides = ProviderOverrides {
                provider: args.provider,
                model: args.model.clone(),
                endpoint: args.endpoint.clone(),
                api_key_env: args.api_key_env.clone(),
            };
            let loaded = load_completion_provider(&workspace.config.completion, overrides)
                .context("failed to load completion provider")?;
            tracing::info!(
                provider = %loaded.provider_name,
                model = %loaded.model_name,
                "completion provider ready"
            );

            block_on(run_ask(
                &workspace,
                loaded.provider.as_ref(),
                &loaded.model_name,
                &args.question,
                &mut out,
            ))??;
            Ok(())
        }
        Commands::Stats => run_stats(&workspace, &mut out),
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(future))
}

fn osv_client(config: &LockauditConfig) -> Result<OsvClient> {
    OsvClient::new(&config.advisory.endpoint).with_context(|| {
        format!(
            "invalid advisory endpoint {}",
            config.advisory.endpoint
        )
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn run_init(workspace: &Workspace, out: &mut dyn Write) -> Result<()> {
    workspace.open_store()?;
    writeln!(out, "config={}", config_path(&workspace.root).display())?;
    writeln!(out, "graph={}", workspace.graph_path.display())?;
    Ok(())
}

/// Reads the manifest and returns it with the project id it is ingested under: the
/// canonical path of the manifest file or project directory.
pub fn load_manifest(source: &ManifestSource) -> Result<(String, Manifest)> {
    match source {
        ManifestSource::File(path) => {
            let path = path
                .canonicalize()
                .with_context(|| format!("manifest not found: {}", path.display()))?;
            let manifest = read_manifest(&path)
                .with_context(|| format!("failed to read manifest {}", path.display()))?;
            Ok((path.display().to_string(), manifest))
        }
        ManifestSource::Project(dir) => {
            let dir = dir
                .canonicalize()
                .with_context(|| format!("project directory not found: {}", dir.display()))?;
            tracing::info!(project = %dir.display(), "generating SBOM");
            let manifest = generate_sbom(&dir)
                .with_context(|| format!("failed to generate SBOM for {}", dir.display()))?;
            Ok((dir.display().to_string(), manifest))
        }
    }
}

pub fn run_ingest(
    workspace: &Workspace,
    source: &ManifestSource,
    out: &mut dyn Write,
) -> Result<IngestSummary> {
    let (project_id, manifest) = load_manifest(source)?;
    let store = workspace.open_store()?;
    let summary = ingest_manifest(&store, &project_id, &manifest)
        .with_context(|| format!("failed to ingest {project_id}"))?;

    writeln!(out, "project={project_id}")?;
    writeln!(out, "format={}", manifest.format_name())?;
    writeln!(out, "instances={}", summary.instances)?;
    writeln!(out, "packages={}", summary.packages)?;
    writeln!(out, "declarations={}", summary.declarations)?;
    writeln!(out, "resolved={}", summary.resolved)?;
    writeln!(out, "synthesized={}", summary.synthesized)?;
    writeln!(out, "unresolved={}", summary.unresolved)?;
    Ok(summary)
}

pub async fn run_enrich(
    workspace: &Workspace,
    source: &dyn AdvisorySource,
    out: &mut dyn Write,
) -> Result<EnrichmentSummary> {
    let store = workspace.open_store()?;
    let options = EnrichOptions {
        ecosystem: workspace.config.advisory.ecosystem.clone(),
        batch_size: effective_batch_size(&workspace.config.advisory),
    };
    let summary = enrich_graph(&store, source, &options)
        .await
        .with_context(|| format!("advisory enrichment via {} failed", source.source_name()))?;

    writeln!(out, "enriched_packages={}", summary.packages)?;
    writeln!(out, "vulnerability_ids={}", summary.vulnerability_ids)?;
    writeln!(out, "package_hits={}", summary.package_hits)?;
    writeln!(out, "advisories_fetched={}", summary.advisories_fetched)?;
    Ok(summary)
}

/// Ingest, then enrich, then report the total number of packages in the graph.
pub async fn run_audit(
    workspace: &Workspace,
    input: &ManifestSource,
    source: &dyn AdvisorySource,
    out: &mut dyn Write,
) -> Result<()> {
    run_ingest(workspace, input, out)?;
    run_enrich(workspace, source, out).await?;

    let store = workspace.open_store()?;
    let stats = graph_stats(&store).context("failed to count graph packages")?;
    writeln!(out, "total_packages={}", stats.packages)?;
    Ok(())
}

pub async fn run_ask(
    workspace: &Workspace,
    provider: &dyn CompletionProvider,
    model: &str,
    question: &str,
    out: &mut dyn Write,
) -> Result<AgentAnswer> {
    let store = workspace.open_read_only_store()?;
    let agent = QueryAgent::new(
        &store,
        provider,
        AgentOptions::new(model, &workspace.config.agent),
    )
    .context("failed to build query agent")?;
    let answer = agent.ask(question).await.context("query agent failed")?;

    tracing::info!(
        outcome = ?answer.outcome,
        steps = answer.steps_used,
        "answered question"
    );
    writeln!(out, "{}", answer.answer)?;
    Ok(answer)
}

pub fn run_stats(workspace: &Workspace, out: &mut dyn Write) -> Result<()> {
    let store = workspace.open_store()?;
    let stats = graph_stats(&store).context("failed to read graph stats")?;
    for (name, count) in stats.entries() {
        writeln!(out, "{name}={count}")?;
    }
    Ok(())
}
