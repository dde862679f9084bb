use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::processing::{CallPolicy, ChunkingSettings, ServiceSettings};

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Pagewise service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Ollama runtime serving embeddings and generations.
    pub ollama_url: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of vectors produced by the offline hashing provider.
    pub embedding_dimension: usize,
    /// Generation model identifier passed to the provider.
    pub generation_model: String,
    /// Maximum number of characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of a page.
    pub chunk_overlap: usize,
    /// Default number of chunks retrieved per query.
    pub retrieval_top_k: usize,
    /// Chunks scoring below this cosine similarity are not used as context.
    pub retrieval_min_similarity: f32,
    /// Timeout applied to every embedding request.
    pub embedding_timeout_secs: u64,
    /// Timeout applied to every generation request.
    pub generation_timeout_secs: u64,
    /// Upper bound on attempts for transient model failures.
    pub model_max_attempts: usize,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Number of embedding requests kept in flight during ingestion.
    pub embedding_concurrency: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the ingestion pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Offline deterministic feature hashing; no model runtime required.
    Hash,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: "http://127.0.0.1:11434".into(),
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "nomic-embed-text".into(),
            embedding_dimension: 768,
            generation_model: "llama3.1:8b".into(),
            chunk_size: 800,
            chunk_overlap: 100,
            retrieval_top_k: 3,
            retrieval_min_similarity: 0.3,
            embedding_timeout_secs: 30,
            generation_timeout_secs: 120,
            model_max_attempts: 3,
            embedding_batch_size: 16,
            embedding_concurrency: 4,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            embedding_provider: load_parsed("EMBEDDING_PROVIDER")?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: load_parsed("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            chunk_size: load_parsed("CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: load_parsed("CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            retrieval_top_k: load_parsed("RETRIEVAL_TOP_K")?.unwrap_or(defaults.retrieval_top_k),
            retrieval_min_similarity: load_parsed("RETRIEVAL_MIN_SIMILARITY")?
                .unwrap_or(defaults.retrieval_min_similarity),
            embedding_timeout_secs: load_parsed("EMBEDDING_TIMEOUT_SECS")?
                .unwrap_or(defaults.embedding_timeout_secs),
            generation_timeout_secs: load_parsed("GENERATION_TIMEOUT_SECS")?
                .unwrap_or(defaults.generation_timeout_secs),
            model_max_attempts: load_parsed("MODEL_MAX_ATTEMPTS")?
                .unwrap_or(defaults.model_max_attempts),
            embedding_batch_size: load_parsed("EMBEDDING_BATCH_SIZE")?
                .unwrap_or(defaults.embedding_batch_size),
            embedding_concurrency: load_parsed("EMBEDDING_CONCURRENCY")?
                .unwrap_or(defaults.embedding_concurrency),
            server_port: load_parsed("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make chunking or retrieval impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval_min_similarity) {
            return Err(ConfigError::InvalidValue("RETRIEVAL_MIN_SIMILARITY".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.model_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("MODEL_MAX_ATTEMPTS".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        if self.embedding_concurrency == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_CONCURRENCY".into()));
        }
        Ok(())
    }

    /// Derive the settings consumed by [`crate::processing::DocumentService`].
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            chunking: ChunkingSettings {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            },
            top_k: self.retrieval_top_k,
            min_similarity: self.retrieval_min_similarity,
            embedding_policy: CallPolicy::new(
                Duration::from_secs(self.embedding_timeout_secs),
                self.model_max_attempts,
            ),
            generation_policy: CallPolicy::new(
                Duration::from_secs(self.generation_timeout_secs),
                self.model_max_attempts,
            ),
            embedding_batch_size: self.embedding_batch_size,
            embedding_concurrency: self.embedding_concurrency,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        ollama_url = %config.ollama_url,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
