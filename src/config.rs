//! TOML configuration parsing and validation.
//!
//! See `config/rfp.example.toml` for a complete example. Only `[db]` and
//! `[chunking]` are required; every other section has defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama (default `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override. Defaults to the provider's public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub answer_temperature: f32,
    #[serde(default = "default_sufficiency_temperature")]
    pub sufficiency_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            timeout_secs: default_llm_timeout(),
            max_output_tokens: default_max_output_tokens(),
            answer_temperature: 0.0,
            sufficiency_temperature: default_sufficiency_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Nearest neighbours requested on the first retrieval of each row.
    #[serde(default = "default_breadth_seed")]
    pub breadth_seed: u32,
    /// Node executions allowed per row before the row fails.
    #[serde(default = "default_step_limit")]
    pub step_limit: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            breadth_seed: default_breadth_seed(),
            step_limit: default_step_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_search_attempts")]
    pub search_max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub search_base_delay_ms: u64,
    #[serde(default = "default_llm_attempts")]
    pub llm_max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub llm_base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            search_max_attempts: default_search_attempts(),
            search_base_delay_ms: default_base_delay_ms(),
            llm_max_attempts: default_llm_attempts(),
            llm_base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn search_base_delay(&self) -> Duration {
        Duration::from_millis(self.search_base_delay_ms)
    }

    pub fn llm_base_delay(&self) -> Duration {
        Duration::from_millis(self.llm_base_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptsConfig {
    /// TOML file with `[rfp_expert]` and `[sufficiency_evaluator]` tables.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraceConfig {
    /// `log`, `jsonl`, or `none`.
    #[serde(default = "default_trace_sink")]
    pub sink: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            sink: default_trace_sink(),
            path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    16
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_sufficiency_temperature() -> f32 {
    0.7
}
fn default_breadth_seed() -> u32 {
    3
}
fn default_step_limit() -> u32 {
    25
}
fn default_search_attempts() -> u32 {
    5
}
fn default_llm_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    20_000
}
fn default_trace_sink() -> String {
    "log".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/processed")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }
    for (name, t) in [
        ("llm.answer_temperature", config.llm.answer_temperature),
        ("llm.sufficiency_temperature", config.llm.sufficiency_temperature),
    ] {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("{} must be in [0.0, 2.0]", name);
        }
    }

    if config.agent.breadth_seed < 1 {
        anyhow::bail!("agent.breadth_seed must be >= 1");
    }
    if config.agent.step_limit < 2 {
        anyhow::bail!("agent.step_limit must be >= 2 (one retrieval plus the answer)");
    }

    if config.retry.search_max_attempts < 1 || config.retry.llm_max_attempts < 1 {
        anyhow::bail!("retry attempt counts must be >= 1");
    }

    match config.trace.sink.as_str() {
        "log" | "none" => {}
        "jsonl" => {
            if config.trace.path.is_none() {
                anyhow::bail!("trace.path must be set when trace.sink is 'jsonl'");
            }
        }
        other => anyhow::bail!(
            "Unknown trace sink: '{}'. Must be log, jsonl, or none.",
            other
        ),
    }

    Ok(())
}
