//! Centralized configuration management for ChunkHound
//!
//! This crate provides a unified configuration system with type-safe,
//! validated configuration assembled from three layers:
//! 1. Safe defaults (defined as constants)
//! 2. Optional TOML file
//! 3. Environment variable overrides (`CHUNKHOUND_*`), highest priority

pub mod error;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use validation::Validate;

use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

static ENV_INIT: Once = Once::new();

/// Load environment variables from a .env file (current directory or up
/// the tree) ahead of the `CHUNKHOUND_*` override pass
///
/// Safe to call multiple times - will only run once
pub fn initialize_environment() {
    ENV_INIT.call_once(|| {
        dotenvy::dotenv().ok();
    });
}

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, prod, test)
// =============================================================================

// Database Configuration
const DEFAULT_DB_FILENAME: &str = ".chunkhound.db";
const DEFAULT_DB_BATCH_SIZE: usize = 500; // Rows per bulk insert batch
const DEFAULT_CHECKPOINT_OPS_THRESHOLD: u64 = 500; // Mutations between checkpoints
const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 60; // Wall-clock checkpoint timeout

// Embedding Configuration
const DEFAULT_EMBEDDING_PROVIDER: &str = "openai";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100; // Max inputs per provider request
const DEFAULT_EMBEDDING_BATCH_TOKENS: usize = 8192; // Token budget per request
const DEFAULT_MAX_CONCURRENT_EMBEDDINGS: usize = 4; // In-flight requests per provider
const DEFAULT_FINGERPRINT_CACHE_CAPACITY: usize = 100_000; // LRU entries
const DEFAULT_EMBEDDING_MAX_RETRIES: usize = 3;

// Indexing Configuration
const DEFAULT_DEBOUNCE_MS: u64 = 300; // Quiet window before a change fires
const DEFAULT_PERIODIC_INDEX_INTERVAL_SECS: u64 = 300; // Background scan cadence
const DEFAULT_PERIODIC_BATCH_SIZE: usize = 200; // Files per background batch
const DEFAULT_PERIODIC_INDEX_ENABLED: bool = true;
const DEFAULT_MTIME_EPSILON_SECS: f64 = 0.001; // Two-tier change test tolerance

// Server Configuration
const DEFAULT_SERVER_HOST: &str = "127.0.0.1"; // Localhost only for security
const DEFAULT_SERVER_PORT: u16 = 7749;
const DEFAULT_SERVER_ENABLE_CORS: bool = false;
const DEFAULT_MAX_RESPONSE_TOKENS: usize = 6_000; // Serialized search response cap

/// Core configuration for the entire ChunkHound application
///
/// All settings have safe defaults and can be overridden via environment
/// variables or a TOML file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplicationConfig {
    /// Database and durability configuration
    pub database: DatabaseConfig,

    /// Embedding generation configuration
    pub embedding: EmbeddingConfig,

    /// Indexing pipeline and watcher configuration
    pub indexing: IndexingConfig,

    /// Tool server configuration
    pub server: ServerConfig,
}

/// Database configuration - path, batching, and checkpoint policy
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    /// Path to the single database file (WAL sibling lives beside it)
    pub path: PathBuf,

    /// Rows per bulk insert batch during initial indexing
    pub batch_size: usize,

    /// Mutating operations between explicit checkpoints
    pub checkpoint_ops_threshold: u64,

    /// Wall-clock seconds between explicit checkpoints
    pub checkpoint_interval_secs: u64,
}

/// Embedding configuration - provider, model, batching, and cache
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingConfig {
    /// Provider tag (e.g. "openai")
    pub provider: String,

    /// Model identifier (e.g. "text-embedding-3-small")
    pub model: String,

    /// Embedding dimensions produced by this model
    /// Must match the per-(model, dim) storage table for consistency
    pub dimensions: usize,

    /// Maximum inputs per provider request (the provider's count limit)
    pub batch_size: usize,

    /// Token budget per provider request
    /// The estimator may undercount; the batcher recovers by redistribution
    pub batch_tokens: usize,

    /// Bounded number of in-flight provider requests
    pub max_concurrent: usize,

    /// Content-fingerprint cache capacity (LRU entries)
    pub fingerprint_cache_capacity: usize,

    /// Retry attempts for transient provider errors
    pub max_retries: usize,

    /// How to embed a text that exceeds the per-input token limit
    #[serde(default)]
    pub oversize_policy: OversizePolicy,

    /// Base URL override for OpenAI-compatible providers
    #[serde(default)]
    pub base_url: Option<String>,
}

/// How the batcher embeds a single text that exceeds the per-input limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OversizePolicy {
    /// Use the vector of the first token-bounded sub-text
    #[serde(rename = "first_chunk")]
    FirstChunk,

    /// Use the element-wise mean of all sub-text vectors
    #[serde(rename = "mean_of_parts")]
    MeanOfParts,
}

impl Default for OversizePolicy {
    fn default() -> Self {
        Self::FirstChunk
    }
}

/// Indexing configuration - discovery, watcher, and background scans
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexingConfig {
    /// Include globs; empty means include everything supported
    pub include: Vec<String>,

    /// Exclude globs applied on top of the built-in defaults
    pub exclude: Vec<String>,

    /// Quiet window before a watched file change fires a task
    pub debounce_ms: u64,

    /// Seconds between periodic background reconciliation scans
    pub periodic_interval_secs: u64,

    /// Files per periodic background batch
    pub periodic_batch_size: usize,

    /// Whether periodic background reconciliation runs at all
    pub periodic_enabled: bool,

    /// Tolerance for the mtime tier of the change test (seconds)
    pub mtime_epsilon_secs: f64,
}

/// Tool server configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServerConfig {
    /// Bind host for HTTP transport
    pub host: String,

    /// Bind port for HTTP transport
    pub port: u16,

    /// Whether to allow cross-origin requests in HTTP mode
    pub cors: bool,

    /// Default cap on serialized search response size, in tokens
    pub max_response_tokens: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_FILENAME),
            batch_size: DEFAULT_DB_BATCH_SIZE,
            checkpoint_ops_threshold: DEFAULT_CHECKPOINT_OPS_THRESHOLD,
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
        }
    }
}

impl DatabaseConfig {
    /// Checkpoint wall-clock timeout as a Duration
    pub const fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_EMBEDDING_PROVIDER.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            batch_tokens: DEFAULT_EMBEDDING_BATCH_TOKENS,
            max_concurrent: DEFAULT_MAX_CONCURRENT_EMBEDDINGS,
            fingerprint_cache_capacity: DEFAULT_FINGERPRINT_CACHE_CAPACITY,
            max_retries: DEFAULT_EMBEDDING_MAX_RETRIES,
            oversize_policy: OversizePolicy::default(),
            base_url: None,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            periodic_interval_secs: DEFAULT_PERIODIC_INDEX_INTERVAL_SECS,
            periodic_batch_size: DEFAULT_PERIODIC_BATCH_SIZE,
            periodic_enabled: DEFAULT_PERIODIC_INDEX_ENABLED,
            mtime_epsilon_secs: DEFAULT_MTIME_EPSILON_SECS,
        }
    }
}

impl IndexingConfig {
    /// Debounce quiet window as a Duration
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Periodic scan cadence as a Duration
    pub const fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            cors: DEFAULT_SERVER_ENABLE_CORS,
            max_response_tokens: DEFAULT_MAX_RESPONSE_TOKENS,
        }
    }
}

impl ApplicationConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// environment overrides, then validation.
    ///
    /// # Errors
    /// Returns file/parse errors for an explicit config file and validation
    /// errors for out-of-range values.
    pub fn load(config_file: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<Self>(&content)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHUNKHOUND_*` environment variable overrides in place
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnvVar` when a set variable cannot be
    /// parsed; unset variables are silently skipped.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Some(path) = read_env("CHUNKHOUND_DB") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(v) = read_env("CHUNKHOUND_DB_BATCH_SIZE") {
            self.database.batch_size = parse_env("CHUNKHOUND_DB_BATCH_SIZE", &v)?;
        }
        if let Some(v) = read_env("CHUNKHOUND_EMBEDDING_BATCH_SIZE") {
            self.embedding.batch_size = parse_env("CHUNKHOUND_EMBEDDING_BATCH_SIZE", &v)?;
        }
        if let Some(v) = read_env("CHUNKHOUND_MAX_CONCURRENT_EMBEDDINGS") {
            self.embedding.max_concurrent = parse_env("CHUNKHOUND_MAX_CONCURRENT_EMBEDDINGS", &v)?;
        }
        if let Some(v) = read_env("CHUNKHOUND_PERIODIC_INDEX_INTERVAL") {
            self.indexing.periodic_interval_secs =
                parse_env("CHUNKHOUND_PERIODIC_INDEX_INTERVAL", &v)?;
        }
        if let Some(v) = read_env("CHUNKHOUND_PERIODIC_BATCH_SIZE") {
            self.indexing.periodic_batch_size = parse_env("CHUNKHOUND_PERIODIC_BATCH_SIZE", &v)?;
        }
        if let Some(v) = read_env("CHUNKHOUND_PERIODIC_INDEX_ENABLED") {
            self.indexing.periodic_enabled = parse_bool("CHUNKHOUND_PERIODIC_INDEX_ENABLED", &v)?;
        }
        Ok(())
    }
}

fn read_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Validate for ApplicationConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(
            &self.database.path.to_string_lossy(),
            "database.path",
        )?;
        validation::validate_range(
            self.database.batch_size as u64,
            1,
            1_000_000,
            "database.batch_size",
        )?;
        validation::validate_non_empty(&self.embedding.provider, "embedding.provider")?;
        validation::validate_non_empty(&self.embedding.model, "embedding.model")?;
        validation::validate_range(
            self.embedding.dimensions as u64,
            1,
            65_536,
            "embedding.dimensions",
        )?;
        validation::validate_range(
            self.embedding.batch_size as u64,
            1,
            10_000,
            "embedding.batch_size",
        )?;
        validation::validate_range(
            self.embedding.max_concurrent as u64,
            1,
            64,
            "embedding.max_concurrent",
        )?;
        validation::validate_range(self.indexing.debounce_ms, 10, 60_000, "indexing.debounce_ms")?;
        validation::validate_port(self.server.port, "server.port")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut config = ApplicationConfig::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debounce_below_floor_rejected() {
        let mut config = ApplicationConfig::default();
        config.indexing.debounce_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = ApplicationConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: ApplicationConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.embedding.model, config.embedding.model);
        assert_eq!(parsed.database.batch_size, config.database.batch_size);
    }

    #[test]
    fn bool_env_parsing() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn oversize_policy_defaults_to_first_chunk() {
        assert_eq!(OversizePolicy::default(), OversizePolicy::FirstChunk);
    }
}
