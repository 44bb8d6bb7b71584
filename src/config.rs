//! TOML configuration.
//!
//! Every section except `[db]` has defaults, so a minimal file is:
//!
//! ```toml
//! [db]
//! path = "./data/concierge.sqlite"
//! ```
//!
//! API keys never live in the file: `api_key_env` names the environment
//! variable to read at provider construction time.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use concierge_harness_core::retrieval::RetrievalThresholds;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_LLM_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_PINECONE_KEY_ENV: &str = "PINECONE_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Named knowledge sources, synced by `concierge sync`.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` (any OpenAI-compatible `/embeddings` endpoint) or `"disabled"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between consecutive provider batches.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: default_base_url(),
            api_key_env: default_llm_key_env(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "openai/text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_llm_key_env() -> String {
    DEFAULT_LLM_KEY_ENV.to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_batch_delay_ms() -> u64 {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Chat-completions settings shared by the agent and the HyDE generator.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"openai"` (OpenAI-compatible `/chat/completions`) or `"disabled"`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_hyde_max_tokens")]
    pub hyde_max_tokens: u32,
    /// System prompt for hypothetical answers; the built-in Spanish prompt when unset.
    #[serde(default)]
    pub hyde_prompt: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_chat_model(),
            base_url: default_base_url(),
            api_key_env: default_llm_key_env(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            hyde_max_tokens: default_hyde_max_tokens(),
            hyde_prompt: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_chat_model() -> String {
    "google/gemini-2.0-flash-lite-001".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_output_tokens() -> u32 {
    600
}
fn default_hyde_max_tokens() -> u32 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexConfig {
    /// `"sqlite"` (brute-force cosine in the main database) or `"pinecone"`.
    #[serde(default = "default_index_backend")]
    pub backend: String,
    /// Pinecone index host, e.g. `https://dreamland-atc-abc123.svc.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            host: None,
            namespace: None,
            api_key_env: default_pinecone_key_env(),
            upsert_batch_size: default_upsert_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_backend() -> String {
    "sqlite".to_string()
}
fn default_pinecone_key_env() -> String {
    DEFAULT_PINECONE_KEY_ENV.to_string()
}
fn default_upsert_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_direct_floor")]
    pub direct_floor: f32,
    #[serde(default = "default_hyde_trigger")]
    pub hyde_trigger: f32,
    #[serde(default = "default_hyde_floor")]
    pub hyde_floor: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            direct_floor: default_direct_floor(),
            hyde_trigger: default_hyde_trigger(),
            hyde_floor: default_hyde_floor(),
            top_k: default_top_k(),
        }
    }
}

impl RetrievalConfig {
    pub fn thresholds(&self) -> RetrievalThresholds {
        RetrievalThresholds {
            direct_floor: self.direct_floor,
            hyde_trigger: self.hyde_trigger,
            hyde_floor: self.hyde_floor,
            top_k: self.top_k,
        }
    }
}

fn default_direct_floor() -> f32 {
    0.65
}
fn default_hyde_trigger() -> f32 {
    0.70
}
fn default_hyde_floor() -> f32 {
    0.55
}
fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Upper bound on model calls per turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Number of trailing conversation messages sent to the model.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Overrides the built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            history_window: default_history_window(),
            tool_timeout_secs: default_tool_timeout_secs(),
            system_prompt: None,
        }
    }
}

fn default_max_steps() -> usize {
    5
}
fn default_history_window() -> usize {
    6
}
fn default_tool_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_channel(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_channel() -> String {
    "WEB_RAG".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

/// A directory of JSON files, each holding an array of knowledge entries.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Category applied to entries that declare none.
    #[serde(default)]
    pub category_id: Option<String>,
    /// Language applied to entries that declare none.
    #[serde(default)]
    pub language: Option<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

/// Read, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Retrieval
    let r = &config.retrieval;
    for (name, value) in [
        ("direct_floor", r.direct_floor),
        ("hyde_trigger", r.hyde_trigger),
        ("hyde_floor", r.hyde_floor),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }
    if r.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Vector index
    match config.vector_index.backend.as_str() {
        "sqlite" => {}
        "pinecone" => {
            if config.vector_index.host.is_none() {
                bail!("vector_index.host must be specified when backend is 'pinecone'");
            }
        }
        other => bail!(
            "Unknown vector index backend: '{}'. Must be sqlite or pinecone.",
            other
        ),
    }
    if config.vector_index.upsert_batch_size == 0 {
        bail!("vector_index.upsert_batch_size must be > 0");
    }

    // Agent
    if config.agent.max_steps == 0 {
        bail!("agent.max_steps must be >= 1");
    }
    if config.agent.history_window == 0 {
        bail!("agent.history_window must be >= 1");
    }

    Ok(config)
}
