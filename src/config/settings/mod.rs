
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::database::DistanceMetric;

pub const HOME_ENV_VAR: &str = "NEWS_RAG_HOME";
pub const GEMINI_API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_FALLBACK_ANSWER: &str = "I'm not sure how to answer that.";
pub const MAX_TOP_K: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Ollama embedding server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub dimension: u32,
    pub normalize: bool,
    pub batch_size: u32,
    pub max_input_tokens: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "all-minilm".to_string(),
            dimension: 384,
            normalize: true,
            batch_size: 16,
            max_input_tokens: 256,
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub collection: String,
    pub metric: DistanceMetric,
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            collection: "news_articles".to_string(),
            metric: DistanceMetric::Cosine,
            timeout_secs: 10,
        }
    }
}

/// Gemini `generateContent` endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub fallback_answer: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            fallback_answer: DEFAULT_FALLBACK_ANSWER.to_string(),
            timeout_secs: 60,
            retry_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            default_top_k: 3,
            max_top_k: 20,
            max_context_chars: 4000,
        }
    }
}

/// Where the article feed is read from: an http(s) URL or a local JSON file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    #[inline]
    fn default() -> Self {
        Self {
            source: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: usize,
    /// Seconds between scheduled runs while serving, 0 disables the schedule
    pub interval_secs: u64,
    pub stale_lock_secs: u64,
}

impl Default for IngestConfig {
    #[inline]
    fn default() -> Self {
        Self {
            batch_size: 32,
            interval_secs: 0,
            stale_lock_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Resolved location of the article feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    Url(Url),
    File(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid max input tokens: {0} (must be between 16 and 8192)")]
    InvalidMaxInputTokens(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid collection name: {0:?} (use letters, digits, '_' or '-')")]
    InvalidCollectionName(String),
    #[error("Invalid fallback answer (cannot be empty)")]
    EmptyFallbackAnswer,
    #[error("Invalid max top_k: {0} (must be between 1 and 20)")]
    InvalidMaxTopK(usize),
    #[error("Default top_k ({0}) must be between 1 and max top_k ({1})")]
    InvalidDefaultTopK(usize, usize),
    #[error("Invalid context budget: {0} (must be between 200 and 100000 characters)")]
    InvalidContextBudget(usize),
    #[error("Invalid ingest batch size: {0} (must be between 1 and 1000)")]
    InvalidIngestBatchSize(usize),
    #[error("Invalid stale lock age: {0} (must be between 60 and 86400 seconds)")]
    InvalidStaleLock(u64),
    #[error("Invalid feed source: {0:?}")]
    InvalidFeedSource(String),
    #[error("No feed source configured")]
    MissingFeedSource,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Resolve the application directory: explicit path, then `NEWS_RAG_HOME`, then `~/.news-rag`
    #[inline]
    pub fn resolve_base_dir(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = explicit {
            return Ok(dir);
        }

        if let Some(dir) = std::env::var_os(HOME_ENV_VAR).filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::home_dir()
            .map(|home| home.join(".news-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("news-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Feed location with relative file paths taken from the base directory
    #[inline]
    pub fn feed_location(&self) -> Result<FeedLocation, ConfigError> {
        Ok(match self.feed.location()? {
            FeedLocation::File(path) if path.is_relative() => {
                FeedLocation::File(self.base_dir.join(path))
            }
            location => location,
        })
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.vector_store.validate()?;
        self.generation.validate()?;
        self.retrieval.validate()?;
        self.ingest.validate()?;

        if let Some(source) = &self.feed.source {
            FeedConfig::parse_source(source)?;
        }
        validate_timeout(self.feed.timeout_secs)?;

        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// SQLite database holding the collection registry and ingestion history
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ingest_lock_path(&self) -> PathBuf {
        self.get_base_dir().join(".ingest.lock")
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(8..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if !(16..=8192).contains(&self.max_input_tokens) {
            return Err(ConfigError::InvalidMaxInputTokens(self.max_input_tokens));
        }

        validate_timeout(self.timeout_secs)?;
        validate_retry_attempts(self.retry_attempts)
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(8..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }
}

impl VectorStoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_collection_name(&self.collection) {
            return Err(ConfigError::InvalidCollectionName(self.collection.clone()));
        }
        validate_timeout(self.timeout_secs)
    }
}

impl GenerationConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.fallback_answer.trim().is_empty() {
            return Err(ConfigError::EmptyFallbackAnswer);
        }

        validate_timeout(self.timeout_secs)?;
        validate_retry_attempts(self.retry_attempts)
    }

    /// API key from the config file, falling back to `GEMINI_API_KEY`
    #[inline]
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                std::env::var(GEMINI_API_KEY_ENV_VAR)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
            })
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TOP_K).contains(&self.max_top_k) {
            return Err(ConfigError::InvalidMaxTopK(self.max_top_k));
        }

        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(ConfigError::InvalidDefaultTopK(
                self.default_top_k,
                self.max_top_k,
            ));
        }

        if !(200..=100_000).contains(&self.max_context_chars) {
            return Err(ConfigError::InvalidContextBudget(self.max_context_chars));
        }

        Ok(())
    }
}

impl FeedConfig {
    #[inline]
    pub fn location(&self) -> Result<FeedLocation, ConfigError> {
        let source = self
            .source
            .as_deref()
            .ok_or(ConfigError::MissingFeedSource)?;
        Self::parse_source(source)
    }

    fn parse_source(source: &str) -> Result<FeedLocation, ConfigError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidFeedSource(source.to_string()));
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Url::parse(trimmed)
                .map(FeedLocation::Url)
                .map_err(|_| ConfigError::InvalidFeedSource(source.to_string()));
        }

        if trimmed.contains("://") {
            return Err(ConfigError::InvalidFeedSource(source.to_string()));
        }

        Ok(FeedLocation::File(PathBuf::from(trimmed)))
    }
}

impl IngestConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.batch_size) {
            return Err(ConfigError::InvalidIngestBatchSize(self.batch_size));
        }
        if !(60..=86_400).contains(&self.stale_lock_secs) {
            return Err(ConfigError::InvalidStaleLock(self.stale_lock_secs));
        }
        Ok(())
    }
}

fn validate_timeout(timeout_secs: u64) -> Result<(), ConfigError> {
    if !(1..=600).contains(&timeout_secs) {
        return Err(ConfigError::InvalidTimeout(timeout_secs));
    }
    Ok(())
}

fn validate_retry_attempts(attempts: u32) -> Result<(), ConfigError> {
    if !(1..=10).contains(&attempts) {
        return Err(ConfigError::InvalidRetryAttempts(attempts));
    }
    Ok(())
}

/// Collection names double as LanceDB table names
#[inline]
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
