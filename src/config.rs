//! Configuration parsing.
//!
//! Settings come from an optional TOML file with every field defaulted, and
//! a small set of environment variables applied on top:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `VECTOR_STORE_PATH` | `[index].store_path` |
//! | `TOP_K` | `[retrieval].top_k` |
//! | `CORPUS_DIR` | `[index].corpus_dir` |
//! | `OPENAI_API_KEY` | hosted provider credential |
//! | `LOCAL_LLM_URL`, `LOCAL_LLM_MODEL` | local provider endpoint and model |
//! | `LOCAL_EMBEDDING_MODEL` | local embedding model (defaults to `LOCAL_LLM_MODEL`) |
//!
//! The provider variables are not baked into [`Config`] at load time; they
//! are merged over the `[providers]` table every time a provider is chosen
//! (see [`ProviderSettings::resolve`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Placeholder shipped in sample `.env` files; treated as "no key".
pub const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

pub const DEFAULT_APOLOGY: &str =
    "Sorry, I couldn't find any information about that product. Can you please be more specific?";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub providers: ProviderSettings,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding one text file per product.
    pub corpus_dir: PathBuf,
    /// Snapshot directory written by `build_index` and read by `load_index`.
    pub store_path: PathBuf,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data/products"),
            store_path: PathBuf::from("vector_store"),
            include_globs: vec!["**/*.txt".to_string()],
            exclude_globs: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in chars.
    pub chunk_size: usize,
    /// Chars shared by adjacent windows; must be below `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model used when neither a local endpoint nor a hosted key is set.
    /// `"hashing"` selects the built-in feature-hashing embedder.
    pub offline_model: String,
    pub hosted_model: String,
    pub hosted_base_url: String,
    pub batch_size: usize,
    /// Retries for transient HTTP failures (429/5xx). Zero disables retrying.
    pub max_retries: u32,
    /// Per-request timeout. Unset means no timeout.
    pub timeout_secs: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            offline_model: "all-minilm-l6-v2".to_string(),
            hosted_model: "text-embedding-ada-002".to_string(),
            hosted_base_url: "https://api.openai.com/v1".to_string(),
            batch_size: 64,
            max_retries: 0,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub hosted_model: String,
    pub hosted_base_url: String,
    pub temperature: f32,
    /// Response returned verbatim when retrieval finds nothing.
    pub apology: String,
    pub timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            hosted_model: "gpt-3.5-turbo".to_string(),
            hosted_base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            apology: DEFAULT_APOLOGY.to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            cors_origins: vec![
                "http://localhost".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

/// Provider credentials and endpoints consulted by the selection rule.
#[derive(Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub local_llm_url: Option<String>,
    pub local_llm_model: Option<String>,
    pub local_embedding_model: Option<String>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("local_llm_url", &self.local_llm_url)
            .field("local_llm_model", &self.local_llm_model)
            .field("local_embedding_model", &self.local_embedding_model)
            .finish()
    }
}

impl ProviderSettings {
    /// Merge the process environment over these settings.
    ///
    /// Called at every provider selection so changes to the environment or
    /// config are picked up without caching a previous decision.
    pub fn resolve(&self) -> ProviderSettings {
        self.merged_with(|key| std::env::var(key).ok())
    }

    /// Merge values from `lookup` over these settings; blank values are ignored.
    pub fn merged_with(&self, lookup: impl Fn(&str) -> Option<String>) -> ProviderSettings {
        let pick = |key: &str, current: &Option<String>| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| current.clone())
        };
        ProviderSettings {
            openai_api_key: pick("OPENAI_API_KEY", &self.openai_api_key),
            local_llm_url: pick("LOCAL_LLM_URL", &self.local_llm_url),
            local_llm_model: pick("LOCAL_LLM_MODEL", &self.local_llm_model),
            local_embedding_model: pick("LOCAL_EMBEDDING_MODEL", &self.local_embedding_model),
        }
    }

    /// The hosted API key, unless it is absent, blank, or the placeholder.
    pub fn hosted_api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != PLACEHOLDER_API_KEY)
    }

    /// Local endpoint and generation model, when both are configured.
    pub fn local_generation(&self) -> Option<(&str, &str)> {
        let url = non_blank(&self.local_llm_url)?;
        let model = non_blank(&self.local_llm_model)?;
        Some((url, model))
    }

    /// Local endpoint and embedding model, when both are configured.
    pub fn local_embedding(&self) -> Option<(&str, &str)> {
        let url = non_blank(&self.local_llm_url)?;
        let model =
            non_blank(&self.local_embedding_model).or_else(|| non_blank(&self.local_llm_model))?;
        Some((url, model))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Apply `VECTOR_STORE_PATH`, `TOP_K` and `CORPUS_DIR` from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("VECTOR_STORE_PATH").filter(|v| !v.trim().is_empty()) {
            self.index.store_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("CORPUS_DIR").filter(|v| !v.trim().is_empty()) {
            self.index.corpus_dir = PathBuf::from(dir);
        }
        if let Some(top_k) = lookup("TOP_K").filter(|v| !v.trim().is_empty()) {
            self.retrieval.top_k = top_k
                .trim()
                .parse()
                .with_context(|| format!("TOP_K must be a positive integer, got '{}'", top_k))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.embedding.batch_size < 1 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.offline_model.trim().is_empty() {
            bail!("embedding.offline_model must not be empty");
        }
        Ok(())
    }
}

/// Parse a TOML config file, apply environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    finish(config)
}

/// Like [`load_config`], but falls back to defaults when `path` does not exist.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        finish(Config::default())
    }
}

fn finish(mut config: Config) -> Result<Config> {
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
