use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOCKAUDIT_DIR_NAME: &str = ".lockaudit";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_GRAPH_PATH: &str = "lockaudit.db";
pub const DEFAULT_ADVISORY_ENDPOINT: &str = "https://api.osv.dev";
pub const DEFAULT_ADVISORY_ECOSYSTEM: &str = "npm";
pub const DEFAULT_ADVISORY_BATCH_SIZE: usize = 200;
/// Upper bound on queries per OSV `querybatch` request.
pub const MAX_ADVISORY_BATCH_SIZE: usize = 1000;
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_COMPLETION_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_AGENT_MAX_STEPS: u32 = 8;
pub const DEFAULT_AGENT_MAX_ROWS: u32 = 200;
pub const DEFAULT_AGENT_TEMPERATURE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionProviderKind {
    #[default]
    Auto,
    Mock,
    #[serde(rename = "openai")]
    OpenAi,
}

impl CompletionProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mock => "mock",
            Self::OpenAi => "openai",
        }
    }
}

impl std::str::FromStr for CompletionProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "mock" => Ok(Self::Mock),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!(
                "invalid provider '{other}', expected one of: auto, mock, openai"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LockauditConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_graph_path")]
    pub graph_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            graph_path: default_graph_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default = "default_advisory_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_advisory_ecosystem")]
    pub ecosystem: String,
    #[serde(default = "default_advisory_batch_size")]
    pub batch_size: usize,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_advisory_endpoint(),
            ecosystem: default_advisory_ecosystem(),
            batch_size: DEFAULT_ADVISORY_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub provider: CompletionProviderKind,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_completion_api_key_env")]
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: CompletionProviderKind::Auto,
            model: default_completion_model(),
            endpoint: None,
            api_key_env: default_completion_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_agent_max_rows")]
    pub max_rows: u32,
    #[serde(default = "default_agent_temperature")]
    pub temperature: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_AGENT_MAX_STEPS,
            max_rows: DEFAULT_AGENT_MAX_ROWS,
            temperature: DEFAULT_AGENT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn lockaudit_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(LOCKAUDIT_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    lockaudit_dir(workspace_root).join(CONFIG_FILE_NAME)
}

/// Resolves `storage.graph_path` against the workspace root unless it is absolute.
pub fn graph_path(workspace_root: impl AsRef<Path>, config: &LockauditConfig) -> PathBuf {
    let configured = PathBuf::from(&config.storage.graph_path);
    if configured.is_absolute() {
        configured
    } else {
        workspace_root.as_ref().join(configured)
    }
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<LockauditConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(LockauditConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: LockauditConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<LockauditConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(lockaudit_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = LockauditConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &LockauditConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.advisory.batch_size == 0 {
        warnings.push(ConfigWarning {
            code: "advisory_batch_size_zero",
            message: format!(
                "advisory.batch_size is 0; using {DEFAULT_ADVISORY_BATCH_SIZE}"
            ),
        });
    } else if config.advisory.batch_size > MAX_ADVISORY_BATCH_SIZE {
        warnings.push(ConfigWarning {
            code: "advisory_batch_size_too_large",
            message: format!(
                "advisory.batch_size {} exceeds the batch query limit of {MAX_ADVISORY_BATCH_SIZE}",
                config.advisory.batch_size
            ),
        });
    }

    if config.agent.max_steps == 0 {
        warnings.push(ConfigWarning {
            code: "agent_max_steps_zero",
            message: "agent.max_steps is 0; every question will use the fallback summary"
                .to_owned(),
        });
    }

    if config.agent.max_rows == 0 {
        warnings.push(ConfigWarning {
            code: "agent_max_rows_zero",
            message: format!("agent.max_rows is 0; using {DEFAULT_AGENT_MAX_ROWS}"),
        });
    }

    if !(0.0..=2.0).contains(&config.agent.temperature) {
        warnings.push(ConfigWarning {
            code: "agent_temperature_out_of_range",
            message: format!(
                "agent.temperature {} is outside 0.0..=2.0",
                config.agent.temperature
            ),
        });
    }

    warnings
}

/// Batch size actually used for advisory lookups.
pub fn effective_batch_size(config: &AdvisoryConfig) -> usize {
    match config.batch_size {
        0 => DEFAULT_ADVISORY_BATCH_SIZE,
        size => size.min(MAX_ADVISORY_BATCH_SIZE),
    }
}

fn default_graph_path() -> String {
    DEFAULT_GRAPH_PATH.to_owned()
}

fn default_advisory_endpoint() -> String {
    DEFAULT_ADVISORY_ENDPOINT.to_owned()
}

fn default_advisory_ecosystem() -> String {
    DEFAULT_ADVISORY_ECOSYSTEM.to_owned()
}

fn default_advisory_batch_size() -> usize {
    DEFAULT_ADVISORY_BATCH_SIZE
}

fn default_completion_model() -> String {
    DEFAULT_COMPLETION_MODEL.to_owned()
}

fn default_completion_api_key_env() -> String {
    DEFAULT_COMPLETION_API_KEY_ENV.to_owned()
}

fn default_agent_max_steps() -> u32 {
    DEFAULT_AGENT_MAX_STEPS
}

fn default_agent_max_rows() -> u32 {
    DEFAULT_AGENT_MAX_ROWS
}

fn default_agent_temperature() -> f64 {
    DEFAULT_AGENT_TEMPERATURE
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_required(input: &str, fallback: fn() -> String) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_owned()
    }
}

fn normalize_config(mut config: LockauditConfig) -> LockauditConfig {
    config.storage.graph_path = normalize_required(&config.storage.graph_path, default_graph_path);
    config.advisory.endpoint =
        normalize_required(&config.advisory.endpoint, default_advisory_endpoint);
    config.advisory.ecosystem =
        normalize_required(&config.advisory.ecosystem, default_advisory_ecosystem);
    config.completion.model =
        normalize_required(&config.completion.model, default_completion_model);
    config.completion.endpoint = normalize_optional(config.completion.endpoint.take());
    config.completion.api_key_env = normalize_required(
        &config.completion.api_key_env,
        default_completion_api_key_env,
    );

    config
}
