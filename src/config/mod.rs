//! Configuration management for memovault
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Background indexing configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend: "local" (fastembed) or "http" (OpenAI-compatible endpoint)
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Base URL for the HTTP backend
    #[serde(default = "default_embedding_http_url")]
    pub http_url: String,
}

/// Chunking configuration (token-based, shared contract with the embedder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum tokens per chunk
    #[serde(default = "default_chunk_max_tokens")]
    pub max_tokens: usize,

    /// Overlap tokens between consecutive chunks
    #[serde(default = "default_chunk_overlap_tokens")]
    pub overlap_tokens: usize,
}

/// Background indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum concurrent indexing workers
    #[serde(default = "default_sync_max_workers")]
    pub max_workers: usize,

    /// Seconds before an `indexing` task is considered stuck
    #[serde(default = "default_sync_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds between reaper sweeps
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results
    #[serde(default = "default_search_k")]
    pub default_k: usize,

    /// Maximum results allowed
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for memovault data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
            embedding: EmbeddingConfig::default(),
            chunk: ChunkConfig::default(),
            sync: SyncConfig::default(),
            search: SearchConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            http_url: default_embedding_http_url(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_chunk_max_tokens(),
            overlap_tokens: default_chunk_overlap_tokens(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_workers: default_sync_max_workers(),
            timeout_secs: default_sync_timeout_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_search_k(),
            max_results: default_search_max_results(),
        }
    }
}

impl Config {
    /// Get the default base directory for memovault (~/.memovault)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".memovault")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Check if memovault is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.max_tokens == 0 {
            return Err(Error::Config(
                "chunk.max_tokens must be positive".to_string(),
            ));
        }

        // Zero or negative slider advance would loop forever in the chunker
        if self.chunk.overlap_tokens >= self.chunk.max_tokens {
            return Err(Error::Config(
                "chunk.overlap_tokens must be < chunk.max_tokens".to_string(),
            ));
        }

        if self.sync.max_workers == 0 {
            return Err(Error::Config(
                "sync.max_workers must be positive".to_string(),
            ));
        }

        if self.sync.timeout_secs == 0 {
            return Err(Error::Config(
                "sync.timeout_secs must be positive".to_string(),
            ));
        }

        match self.embedding.backend.as_str() {
            "local" | "http" => {}
            other => {
                return Err(Error::Config(format!(
                    "embedding.backend must be 'local' or 'http', got '{}'",
                    other
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.collection_name, "memovault_chunks");
        assert_eq!(config.sync.max_workers, 4);
        assert_eq!(config.chunk.max_tokens, 512);
        assert_eq!(config.chunk.overlap_tokens, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.collection_name = "test_collection".to_string();
        config.sync.timeout_secs = 60;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.collection_name, "test_collection");
        assert_eq!(loaded.sync.timeout_secs, 60);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Invalid: overlap >= max (would stall the chunk slider)
        config.chunk.overlap_tokens = config.chunk.max_tokens;
        assert!(config.validate().is_err());

        config.chunk.overlap_tokens = 64;
        assert!(config.validate().is_ok());

        config.sync.max_workers = 0;
        assert!(config.validate().is_err());
        config.sync.max_workers = 2;

        config.embedding.backend = "grpc".to_string();
        assert!(config.validate().is_err());
    }
}
