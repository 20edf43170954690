//! TOML configuration parsing and validation.
//!
//! A config file has one table per concern:
//!
//! ```toml
//! [data]
//! root = "./data"
//!
//! [chunking]
//! chunk_size = 300
//! overlap = 50
//!
//! [retrieval]
//! k = 3
//!
//! [index]
//! path = "./index/chat.sqlite"
//!
//! [embedding]
//! provider = "gemini"
//! model = "models/embedding-001"
//! dims = 768
//!
//! [llm]
//! provider = "gemini"
//! model = "gemma-3-27b-it"
//!
//! [assistant]
//! name = "Brainwonders"
//! subject = "Brainwonders' career counselling services, packages, or offerings"
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! session_idle_secs = 1800
//! ```
//!
//! Only `[data]` is required; every other table has defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::DocumentFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_extensions() -> Vec<String> {
    ["md", "txt", "pdf"].iter().map(|s| s.to_string()).collect()
}
fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    300
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    /// Drop hits below this cosine similarity. Off when unset.
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            min_similarity: None,
        }
    }
}

fn default_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./index/chat.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override the provider's API base URL (proxies, compatible servers).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            api_key_env: None,
            base_url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "openai" => "text-embedding-3-small".to_string(),
            _ => "models/embedding-001".to_string(),
        })
    }

    pub fn dims_or_default(&self) -> usize {
        self.dims.unwrap_or(match self.provider.as_str() {
            "openai" => 1536,
            _ => 768,
        })
    }

    pub fn key_env(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| default_key_env(&self.provider))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Connect timeout, and the longest gap between streamed answer bytes.
    /// The answer as a whole may take longer.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            api_key_env: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "openai" => "gpt-4o-mini".to_string(),
            _ => "gemma-3-27b-it".to_string(),
        })
    }

    pub fn key_env(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| default_key_env(&self.provider))
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.6
}

fn default_key_env(provider: &str) -> String {
    match provider {
        "openai" => "OPENAI_API_KEY".to_string(),
        _ => "GOOGLE_API_KEY".to_string(),
    }
}

/// Persona the prompt template is written for.
#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    /// What counts as an in-domain question.
    #[serde(default = "default_subject")]
    pub subject: String,
    /// First assistant message of every session.
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            subject: default_subject(),
            greeting: None,
            title: None,
        }
    }
}

impl AssistantConfig {
    pub fn greeting_text(&self) -> String {
        self.greeting
            .clone()
            .unwrap_or_else(|| format!("Hello! How can I help you with {} today?", self.name))
    }

    pub fn title_text(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("{} Assistant", self.name))
    }
}

fn default_assistant_name() -> String {
    "our services".to_string()
}
fn default_subject() -> String {
    "the services, packages, and offerings described in the documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Web sessions unused for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

fn default_session_idle_secs() -> u64 {
    1800
}

impl Config {
    /// Defaults rooted at `root`, with the index stored next to it.
    pub fn minimal(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let index_path = root
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("index")
            .join("chat.sqlite");
        Self {
            data: DataConfig {
                root,
                extensions: default_extensions(),
                exclude_globs: Vec::new(),
                max_file_bytes: default_max_file_bytes(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            index: IndexConfig { path: index_path },
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            assistant: AssistantConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.k < 1 {
        bail!("retrieval.k must be >= 1");
    }
    if let Some(min) = config.retrieval.min_similarity {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
        }
    }

    if config.data.extensions.is_empty() {
        bail!("data.extensions must list at least one extension");
    }
    for ext in &config.data.extensions {
        let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
        if DocumentFormat::from_extension(&normalized).is_none() {
            bail!(
                "Unsupported extension in data.extensions: '{}'. Supported: md, markdown, txt, text, pdf, docx.",
                ext
            );
        }
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    for (section, provider) in [
        ("embedding", config.embedding.provider.as_str()),
        ("llm", config.llm.provider.as_str()),
    ] {
        match provider {
            "gemini" | "openai" => {}
            other => bail!(
                "Unknown {} provider: '{}'. Must be gemini or openai.",
                section,
                other
            ),
        }
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.timeout_secs == 0 {
        bail!("llm.timeout_secs must be > 0");
    }
    if config.server.session_idle_secs == 0 {
        bail!("server.session_idle_secs must be > 0");
    }

    Ok(())
}
