use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub corpus: CorpusConfig,
}

/// LLM provider endpoint settings. The credential itself is read from the
/// environment variable named by `api_key_env`, once, at process start.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Retry budget for embedding calls (429/5xx/network only).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Deadline for buffered outbound calls. Streaming calls are exempt so
    /// long generations are not cut off mid-stream.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embed_model: default_embed_model(),
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    30
}

/// Retrieval invariants: at most `top_k` snippets, each scoring strictly
/// above `min_score`; corpus texts and the merged context block are bounded
/// by the char limits; at most `max_history` messages reach the model.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            max_input_chars: default_max_input_chars(),
            max_context_chars: default_max_context_chars(),
            max_history: default_max_history(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_min_score() -> f32 {
    0.2
}
fn default_max_input_chars() -> usize {
    4000
}
fn default_max_context_chars() -> usize {
    4000
}
fn default_max_history() -> usize {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub path: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.provider.base_url.trim().is_empty() {
        anyhow::bail!("provider.base_url must not be empty");
    }

    if config.provider.timeout_secs == 0 {
        anyhow::bail!("provider.timeout_secs must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }

    if config.retrieval.max_input_chars == 0 || config.retrieval.max_context_chars == 0 {
        anyhow::bail!("retrieval char limits must be > 0");
    }

    if config.retrieval.max_history == 0 {
        anyhow::bail!("retrieval.max_history must be >= 1");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(config)
}
