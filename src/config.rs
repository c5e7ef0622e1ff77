//! TOML configuration with environment overrides.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! Provider selection for the language model can be overridden from the
//! environment (`OPENAI_API_PROVIDER`, `AZURE_OPENAI_*`), and API keys are
//! only ever read from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./config/wikiqa.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Name and description of the assistant, used in the system prompt and
/// served by `GET /api/description`.
#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            description: String::new(),
        }
    }
}

fn default_assistant_name() -> String {
    "Wiki Assistant".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_summary_dir")]
    pub summary_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            summary_dir: default_summary_dir(),
        }
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("./data/raw")
}
fn default_summary_dir() -> PathBuf {
    PathBuf::from("./data/summary")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Regular expressions matched against the full file path; a match
    /// excludes the file from summarization and indexing.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_min_lines")]
    pub min_lines: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            max_workers: default_max_workers(),
            min_lines: default_min_lines(),
        }
    }
}

fn default_max_workers() -> usize {
    5
}
fn default_min_lines() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Base URL override: `http://localhost:11434` for Ollama,
    /// `https://api.openai.com/v1` for OpenAI.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `openai` talks to the API directly; `azure` goes through an Azure
    /// OpenAI deployment.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_summary_model")]
    pub summary_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub azure_endpoint: Option<String>,
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default = "default_azure_api_version")]
    pub azure_api_version: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_chat_model(),
            summary_model: default_summary_model(),
            base_url: default_base_url(),
            azure_endpoint: None,
            azure_deployment: None,
            azure_api_version: default_azure_api_version(),
            max_iterations: default_max_iterations(),
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_summary_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_azure_api_version() -> String {
    "2024-06-01".to_string()
}
fn default_max_iterations() -> usize {
    10
}
fn default_llm_retries() -> u32 {
    3
}
fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Prebuilt frontend bundle served for every non-API path.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            static_dir: default_static_dir(),
            debug: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("./web/build")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub level: Option<String>,
}

impl LoggingConfig {
    /// Effective default filter; `RUST_LOG` still takes precedence.
    pub fn default_level(&self, debug: bool) -> String {
        match (&self.level, debug) {
            (Some(level), _) => level.clone(),
            (None, true) => "debug".to_string(),
            (None, false) => "info".to_string(),
        }
    }
}

/// Load, override from the environment, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)?;
    config.apply_env(|key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Load an explicit config file, or fall back to `./config/wikiqa.toml`,
/// or to built-in defaults when that file does not exist either.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(Path::new(DEFAULT_CONFIG_PATH)),
        None => {
            let mut config = Config::default();
            config.apply_env(|key| std::env::var(key).ok());
            validate(&config)?;
            Ok(config)
        }
    }
}

/// Parse configuration text without environment overrides or validation.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

impl Config {
    /// Apply the provider variables the assistant has always honored.
    ///
    /// `lookup` is injected so tests do not depend on the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("OPENAI_API_PROVIDER") {
            if !provider.trim().is_empty() {
                self.llm.provider = provider.trim().to_lowercase();
            }
        }

        if self.llm.provider == "azure" {
            if let Some(model) = lookup("AZURE_OPENAI_MODEL") {
                self.llm.model = model;
            }
            if let Some(deployment) = lookup("AZURE_OPENAI_DEPLOYMENT") {
                self.llm.azure_deployment = Some(deployment);
            }
            if let Some(endpoint) = lookup("AZURE_OPENAI_ENDPOINT") {
                self.llm.azure_endpoint = Some(endpoint);
            }
            if let Some(version) = lookup("AZURE_OPENAI_API_VERSION") {
                self.llm.azure_api_version = version;
            }
        } else if let Some(model) = lookup("OPENAI_API_MODEL") {
            self.llm.model = model;
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.ingest.max_workers == 0 {
        bail!("ingest.max_workers must be >= 1");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    for pattern in &config.ingest.ignore_patterns {
        regex::Regex::new(pattern)
            .with_context(|| format!("Invalid ingest.ignore_patterns entry: '{}'", pattern))?;
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    match config.llm.provider.as_str() {
        "openai" => {}
        "azure" => {
            if config.llm.azure_endpoint.is_none() {
                bail!("llm.azure_endpoint (or AZURE_OPENAI_ENDPOINT) is required for the azure provider");
            }
            if config.llm.azure_deployment.is_none() {
                bail!("llm.azure_deployment (or AZURE_OPENAI_DEPLOYMENT) is required for the azure provider");
            }
        }
        other => bail!("Unknown llm provider: '{}'. Must be openai or azure.", other),
    }

    if config.llm.max_iterations == 0 {
        bail!("llm.max_iterations must be >= 1");
    }

    Ok(())
}
