//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::store::QdrantStore;
use crate::tasks::{TaskDb, TaskStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Task counts by status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub indexing: usize,
    pub completed: usize,
    pub failed: usize,
    pub timeout: usize,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_backend: String,
    pub embedding_model: String,
    pub qdrant_connected: bool,
    pub collection_exists: bool,
    pub qdrant_points: u64,
    pub tasks: TaskCounts,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &TaskDb, store: &QdrantStore) -> Result<StatusInfo> {
    info!("Getting status");

    let mut counts = TaskCounts::default();
    for task in db.list(None).await? {
        match task.get_status() {
            Ok(TaskStatus::Pending) => counts.pending += 1,
            Ok(TaskStatus::Indexing) => counts.indexing += 1,
            Ok(TaskStatus::Completed) => counts.completed += 1,
            Ok(TaskStatus::Failed) => counts.failed += 1,
            Ok(TaskStatus::Timeout) => counts.timeout += 1,
            Err(_) => {}
        }
    }

    let (qdrant_connected, collection_exists, qdrant_points) = match store.collection_exists().await
    {
        Ok(true) => match store.points_count().await {
            Ok(points) => (true, true, points),
            Err(e) => {
                tracing::debug!("Qdrant stats error: {:?}", e);
                (true, true, 0)
            }
        },
        Ok(false) => (true, false, 0),
        Err(e) => {
            tracing::debug!("Qdrant connection error: {:?}", e);
            (false, false, 0)
        }
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        qdrant_url: config.qdrant_url.clone(),
        collection_name: config.collection_name.clone(),
        embedding_backend: config.embedding.backend.clone(),
        embedding_model: config.embedding.model.clone(),
        qdrant_connected,
        collection_exists,
        qdrant_points,
        tasks: counts,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 memovault Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);
    println!("  Collection: {}", status.collection_name);

    let connection_status = if status.qdrant_connected {
        if status.collection_exists {
            "✓ Connected"
        } else {
            "⚠ Connected (collection not created yet)"
        }
    } else {
        "✗ Not connected"
    };
    println!("  Status: {}", connection_status);
    println!("  Points: {}", status.qdrant_points);

    println!(
        "\nEmbedding: {} ({})",
        status.embedding_model, status.embedding_backend
    );

    println!("\nIndexing tasks:");
    println!("  pending:   {}", status.tasks.pending);
    println!("  indexing:  {}", status.tasks.indexing);
    println!("  completed: {}", status.tasks.completed);
    println!("  failed:    {}", status.tasks.failed);
    println!("  timeout:   {}", status.tasks.timeout);
}
