//! Environment-driven configuration for the knowledge-base server.
//!
//! This module loads and validates settings once at startup (via `init_config`) and exposes
//! a global, read-only view through `get_config`. The configuration powers both the HTTP API and
//! the MCP server and includes:
//!
//! - Storage backend selection (`COLLECTION_STORAGE_TYPE`, `COLLECTION_STORAGE_PATH`).
//! - Vector store connectivity (`VECTOR_STORE_URL`, `VECTOR_STORE_API_KEY?`).
//! - Embedding provider/model (`EMBEDDING_PROVIDER`, `EMBEDDING_MODEL`, `EMBEDDING_DIMENSION`,
//!   `OLLAMA_URL?`).
//! - Chunking overrides (`CHUNK_SIZE?`, `CHUNK_OVERLAP_RATIO?`, `CHUNK_STRATEGY?`).
//! - Search ergonomics (`SEARCH_DEFAULT_LIMIT?`, `SEARCH_MAX_LIMIT?`,
//!   `SEARCH_DEFAULT_SCORE_THRESHOLD?`).
//! - Query pipeline feature flags (`QUERY_EXPANSION_ENABLED?`, `AUTO_RERANKING_ENABLED?`,
//!   `MAX_QUERY_VARIANTS?`, `RERANKING_THRESHOLD?`, `CONTEXT_EXPANSION_ENABLED?`).
//! - LLM provider (`LLM_PROVIDER?`, `LLM_MODEL?`).
//! - Sync coordinator (`SYNC_MAX_FILE_CONCURRENCY?`, `SYNC_RETRY_ATTEMPTS?`,
//!   `SYNC_RETRY_BACKOFF_BASE_MS?`, `FS_RECONCILE_POLL_INTERVAL_SECS?`).
//! - HTTP server port (`SERVER_PORT?`).
//!
//! Most fields are optional with sensible defaults; invalid combinations are flagged early with
//! descriptive errors so misconfiguration is easy to diagnose.
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the knowledge-base server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Selects which collection-store backend to use.
    pub collection_storage_type: StorageBackend,
    /// Root path for the selected storage backend (database file or filesystem root).
    pub collection_storage_path: String,
    /// Base URL of the vector store instance.
    pub vector_store_url: String,
    /// Optional API key required to access the vector store.
    pub vector_store_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime providing embeddings/LLM calls (when enabled).
    pub ollama_url: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Default number of results returned by search when callers omit `limit`.
    pub search_default_limit: usize,
    /// Maximum number of results allowed per search request.
    pub search_max_limit: usize,
    /// Default similarity threshold applied when callers omit `similarity_threshold`.
    pub search_default_score_threshold: f32,
    /// Chunking strategy.
    pub chunk_strategy: ChunkStrategy,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap ratio between adjacent chunks (clamped to [0, 0.3]).
    pub chunk_overlap_ratio: f32,
    /// LLM provider selection for query expansion, re-ranking, and RAG synthesis.
    pub llm_provider: LlmProvider,
    /// Optional model identifier for the LLM provider.
    pub llm_model: Option<String>,
    /// Whether LLM-driven query expansion is enabled.
    pub query_expansion_enabled: bool,
    /// Maximum number of query variants to generate during expansion.
    pub max_query_variants: usize,
    /// Whether LLM-driven re-ranking is enabled.
    pub auto_reranking_enabled: bool,
    /// Candidate-count threshold above which re-ranking is attempted.
    pub reranking_threshold: usize,
    /// Whether context expansion (related chunks) is enabled by default.
    pub context_expansion_enabled: bool,
    /// Bounded concurrency for per-file re-embedding during sync.
    pub sync_max_file_concurrency: usize,
    /// Maximum retry attempts for a single file's embedding during sync.
    pub sync_retry_attempts: u32,
    /// Base backoff duration (milliseconds) for sync retries; doubles per attempt.
    pub sync_retry_backoff_base_ms: u64,
    /// Polling interval (seconds) for filesystem-mode reconciliation; 0 disables polling.
    pub fs_reconcile_poll_interval_secs: u64,
}

/// Supported collection-store backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Embedded relational database (rusqlite).
    EmbeddedDb,
    /// Filesystem directory tree with a sidecar metadata database.
    Filesystem,
}

/// Supported embedding backends for the chunking/indexing pipeline.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
}

/// Supported LLM backends for query expansion/re-rank/RAG synthesis.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// No LLM configured; expansion/re-rank/RAG degrade gracefully.
    None,
    /// Local Ollama runtime.
    Ollama,
}

/// Chunking strategy selection.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Flat character-budget splitting only, no structural awareness.
    Baseline,
    /// Markdown-structural pass followed by size-control pass (the default).
    MarkdownIntelligent,
    /// Choose automatically based on detected content (currently equivalent to markdown_intelligent).
    Auto,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let search_default_limit = load_usize_with_default("SEARCH_DEFAULT_LIMIT", 5)?;
        let search_max_limit = load_usize_with_default("SEARCH_MAX_LIMIT", 50)?;
        let search_default_score_threshold =
            load_f32_with_default("SEARCH_DEFAULT_SCORE_THRESHOLD", 0.25)?;
        let chunk_size = load_usize_with_default("CHUNK_SIZE", 1000)?;
        let chunk_overlap_ratio = load_f32_with_default("CHUNK_OVERLAP_RATIO", 0.2)?.clamp(0.0, 0.3);
        let max_query_variants = load_usize_with_default("MAX_QUERY_VARIANTS", 3)?;
        let reranking_threshold = load_usize_with_default("RERANKING_THRESHOLD", 8)?;
        let sync_max_file_concurrency = load_usize_with_default("SYNC_MAX_FILE_CONCURRENCY", 4)?;
        let sync_retry_attempts =
            load_usize_with_default("SYNC_RETRY_ATTEMPTS", 3)? as u32;
        let sync_retry_backoff_base_ms =
            load_usize_with_default("SYNC_RETRY_BACKOFF_BASE_MS", 500)? as u64;
        let fs_reconcile_poll_interval_secs =
            load_usize_with_default("FS_RECONCILE_POLL_INTERVAL_SECS", 300)? as u64;

        if search_default_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "SEARCH_DEFAULT_LIMIT must be at least 1".into(),
            ));
        }
        if search_max_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "SEARCH_MAX_LIMIT must be at least 1".into(),
            ));
        }
        if search_default_limit > search_max_limit {
            return Err(ConfigError::InvalidValue(
                "SEARCH_DEFAULT_LIMIT cannot exceed SEARCH_MAX_LIMIT".into(),
            ));
        }
        if !(0.0..=1.0).contains(&search_default_score_threshold) {
            return Err(ConfigError::InvalidValue(
                "SEARCH_DEFAULT_SCORE_THRESHOLD must be between 0.0 and 1.0".into(),
            ));
        }
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "CHUNK_SIZE must be at least 1".into(),
            ));
        }
        if sync_max_file_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "SYNC_MAX_FILE_CONCURRENCY must be at least 1".into(),
            ));
        }

        let raw_storage_type = load_env_optional("COLLECTION_STORAGE_TYPE");
        let (collection_storage_type, storage_path_override) = match raw_storage_type.as_deref() {
            None => (StorageBackend::EmbeddedDb, None),
            Some(value) => match value.to_lowercase().as_str() {
                "filesystem" => (StorageBackend::Filesystem, None),
                "embedded_db" | "db" => (StorageBackend::EmbeddedDb, None),
                _ if std::path::Path::new(value).is_absolute() => {
                    (StorageBackend::Filesystem, Some(value.to_string()))
                }
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "Unknown COLLECTION_STORAGE_TYPE: {other}"
                    )));
                }
            },
        };

        Ok(Self {
            collection_storage_type,
            collection_storage_path: storage_path_override
                .or_else(|| load_env_optional("COLLECTION_STORAGE_PATH"))
                .unwrap_or_else(|| "./data/collections".to_string()),
            vector_store_url: load_env_optional("VECTOR_STORE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:6333".to_string()),
            vector_store_api_key: load_env_optional("VECTOR_STORE_API_KEY"),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .as_deref()
                .unwrap_or("ollama")
                .parse()
                .map_err(|()| {
                    ConfigError::InvalidValue("Invalid EMBEDDING_PROVIDER".to_string())
                })?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            embedding_dimension: load_usize_with_default("EMBEDDING_DIMENSION", 768)?,
            ollama_url: load_env_optional("OLLAMA_URL"),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            search_default_limit,
            search_max_limit,
            search_default_score_threshold,
            chunk_strategy: load_env_optional("CHUNK_STRATEGY")
                .as_deref()
                .map(|value| match value.to_lowercase().as_str() {
                    "baseline" => Ok(ChunkStrategy::Baseline),
                    "markdown_intelligent" => Ok(ChunkStrategy::MarkdownIntelligent),
                    "auto" => Ok(ChunkStrategy::Auto),
                    other => Err(ConfigError::InvalidValue(format!(
                        "Unknown CHUNK_STRATEGY: {other}"
                    ))),
                })
                .transpose()?
                .unwrap_or(ChunkStrategy::MarkdownIntelligent),
            chunk_size,
            chunk_overlap_ratio,
            llm_provider: load_env_optional("LLM_PROVIDER")
                .as_deref()
                .map(|value| match value.to_lowercase().as_str() {
                    "ollama" => LlmProvider::Ollama,
                    _ => LlmProvider::None,
                })
                .unwrap_or(LlmProvider::None),
            llm_model: load_env_optional("LLM_MODEL"),
            query_expansion_enabled: load_bool_with_default("QUERY_EXPANSION_ENABLED", false)?,
            max_query_variants,
            auto_reranking_enabled: load_bool_with_default("AUTO_RERANKING_ENABLED", false)?,
            reranking_threshold,
            context_expansion_enabled: load_bool_with_default("CONTEXT_EXPANSION_ENABLED", true)?,
            sync_max_file_concurrency,
            sync_retry_attempts,
            sync_retry_backoff_base_ms,
            fs_reconcile_poll_interval_secs,
        })
    }
}

fn load_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn load_f32_with_default(key: &str, default: f32) -> Result<f32, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn load_bool_with_default(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        None => Ok(default),
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
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
        storage_backend = ?config.collection_storage_type,
        storage_path = %config.collection_storage_path,
        vector_store_url = %config.vector_store_url,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        chunk_strategy = ?config.chunk_strategy,
        chunk_size = config.chunk_size,
        llm_provider = ?config.llm_provider,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
