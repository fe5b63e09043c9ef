//! Init command implementation

use crate::config::{Config, PathsConfig};
use crate::error::{Error, Result};
use crate::store::QdrantStore;
use crate::tasks::TaskDb;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub force: bool,
}

/// Initialize memovault configuration and database.
///
/// Creates the base directory, writes a default config, creates the SQLite
/// schema, and tries to create the Qdrant collection. A missing Qdrant
/// server is a warning, not a failure; the collection is created lazily on
/// first use.
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions { base_dir, force } = options;

    let config_file = base_dir.join("config.toml");
    if config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_file.display()
        )));
    }

    let mut config = Config::default();
    config.paths = PathsConfig {
        config_file,
        db_file: base_dir.join("metadata.db"),
        base_dir,
    };
    config.save()?;

    // Opening the database creates the schema
    TaskDb::new(&config.paths.db_file).await?;
    info!("Database initialized at {:?}", config.paths.db_file);

    match QdrantStore::connect(&config).await {
        Ok(store) => match store.ensure_collection().await {
            Ok(()) => info!("Qdrant collection '{}' ready", config.collection_name),
            Err(e) => warn!(
                "Could not create Qdrant collection ({}); it will be created on first index",
                e
            ),
        },
        Err(e) => warn!("Could not reach Qdrant at {} ({})", config.qdrant_url, e),
    }

    Ok(config)
}

/// Print init summary to console
pub fn print_init(config: &Config) {
    println!("\n✓ memovault initialized\n");
    println!("Config:   {}", config.paths.config_file.display());
    println!("Database: {}", config.paths.db_file.display());
    println!("Qdrant:   {}", config.qdrant_url);
    println!("\nEdit the config file to change the embedding backend or chunk sizes.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_db() {
        let tmp = TempDir::new().unwrap();
        let config = cmd_init(InitOptions {
            base_dir: tmp.path().to_path_buf(),
            force: false,
        })
        .await
        .unwrap();

        assert!(config.paths.config_file.exists());
        assert!(config.paths.db_file.exists());
        assert!(config.is_initialized());

        // Second init without --force refuses
        let err = cmd_init(InitOptions {
            base_dir: tmp.path().to_path_buf(),
            force: false,
        })
        .await;
        assert!(matches!(err, Err(Error::Config(_))));

        // With --force it overwrites
        cmd_init(InitOptions {
            base_dir: tmp.path().to_path_buf(),
            force: true,
        })
        .await
        .unwrap();
    }
}
