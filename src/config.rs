use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Stop paginating once at least this many reviews are collected.
    #[serde(default = "default_min_count")]
    pub min_count: usize,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_serpapi_url")]
    pub base_url: String,
    #[serde(default = "default_serpapi_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
            language: default_language(),
            base_url: default_serpapi_url(),
            api_key_env: default_serpapi_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_min_count() -> usize {
    crate::fetcher::DEFAULT_MIN_COUNT
}
fn default_language() -> String {
    "en".to_string()
}
fn default_serpapi_url() -> String {
    "https://serpapi.com".to_string()
}
fn default_serpapi_key_env() -> String {
    "SERPAPI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlacesConfig {
    #[serde(default = "default_place_types")]
    pub types: String,
    #[serde(default = "default_countries")]
    pub countries: Vec<String>,
    #[serde(default = "default_places_url")]
    pub base_url: String,
    #[serde(default = "default_places_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            types: default_place_types(),
            countries: default_countries(),
            base_url: default_places_url(),
            api_key_env: default_places_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_place_types() -> String {
    "establishment".to_string()
}
fn default_countries() -> Vec<String> {
    vec!["in".to_string()]
}
fn default_places_url() -> String {
    "https://maps.googleapis.com/maps/api/place".to_string()
}
fn default_places_key_env() -> String {
    "GMAPS_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of review snippets passed to the model per question.
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
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_answer_words")]
    pub max_answer_words: usize,
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_answer_words: default_max_answer_words(),
            base_url: default_llm_url(),
            api_key_env: default_llm_key_env(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_answer_words() -> usize {
    100
}
fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    3
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.fetch.min_count == 0 {
        anyhow::bail!("fetch.min_count must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if config.embedding.provider != "local" && config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.llm.max_answer_words == 0 {
        anyhow::bail!("llm.max_answer_words must be > 0");
    }

    Ok(())
}
