//! Indexing-task storage using SQLite
//!
//! One task row per (document, owner). A fresh `task_token` is assigned on
//! every submission; the row's current token decides which background
//! execution is authoritative. All writes to this table belong to the
//! orchestrator and the reaper.

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Indexing task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Indexing,
    Completed,
    Failed,
    Timeout,
}

impl TaskStatus {
    /// Terminal states are never left except through a fresh upsert
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Indexing => write!(f, "indexing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Timeout => write!(f, "timeout"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "indexing" => Ok(TaskStatus::Indexing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "timeout" => Ok(TaskStatus::Timeout),
            _ => Err(Error::Config(format!("Unknown task status: {}", s))),
        }
    }
}

/// An indexing task row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IndexTask {
    pub id: String,
    pub document_id: String,
    pub owner_id: String,
    pub knowledge_base_id: String,
    pub status: String,
    pub task_token: String,
    pub worker_ref: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl IndexTask {
    pub fn get_status(&self) -> Result<TaskStatus> {
        self.status.parse()
    }
}

/// Partial update: only provided fields are written, `updated_at` always is
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub worker_ref: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub last_error: Option<String>,
}

impl TaskUpdate {
    fn apply_clauses(&self) -> (Vec<&'static str>, Vec<Option<String>>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(status) = self.status {
            clauses.push("status = ?");
            params.push(Some(status.to_string()));
        }
        if let Some(ref worker_ref) = self.worker_ref {
            clauses.push("worker_ref = ?");
            params.push(Some(worker_ref.clone()));
        }
        if let Some(ref started_at) = self.started_at {
            clauses.push("started_at = ?");
            params.push(Some(started_at.clone()));
        }
        if let Some(ref completed_at) = self.completed_at {
            clauses.push("completed_at = ?");
            params.push(Some(completed_at.clone()));
        }
        if let Some(ref last_error) = self.last_error {
            clauses.push("last_error = ?");
            params.push(Some(last_error.clone()));
        }

        (clauses, params)
    }
}

/// Task database handle
#[derive(Clone)]
pub struct TaskDb {
    pool: SqlitePool,
}

impl TaskDb {
    /// Open (and initialize if needed) the task database at the given path
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        debug!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='index_tasks'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// Access the underlying pool (shared with the document table)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace the task row for (document, owner).
    ///
    /// A single statement, atomic with respect to concurrent submitters: the
    /// existing row keeps its `id` but takes the new token and status, and
    /// every execution-scoped field is reset. `(status == Indexing)` stamps
    /// `started_at`.
    pub async fn upsert(
        &self,
        document_id: &str,
        owner_id: &str,
        knowledge_base_id: &str,
        task_token: &str,
        status: TaskStatus,
    ) -> Result<IndexTask> {
        let now = Utc::now().to_rfc3339();
        let started_at = if status == TaskStatus::Indexing {
            Some(now.clone())
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO index_tasks
                (id, document_id, owner_id, knowledge_base_id, status, task_token,
                 worker_ref, started_at, completed_at, last_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL, ?, NULL, NULL, ?, ?)
            ON CONFLICT(document_id, owner_id) DO UPDATE SET
                knowledge_base_id = excluded.knowledge_base_id,
                status = excluded.status,
                task_token = excluded.task_token,
                worker_ref = NULL,
                started_at = excluded.started_at,
                completed_at = NULL,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(document_id)
        .bind(owner_id)
        .bind(knowledge_base_id)
        .bind(status.to_string())
        .bind(task_token)
        .bind(&started_at)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_by_document(document_id, owner_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound(document_id.to_string()))
    }

    /// Apply a partial update to a task row
    pub async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<Option<IndexTask>> {
        let (clauses, params) = update.apply_clauses();
        if clauses.is_empty() {
            return self.get_by_id(task_id).await;
        }

        let sql = format!(
            "UPDATE index_tasks SET {}, updated_at = ? WHERE id = ?",
            clauses.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = query.bind(param);
        }
        query = query.bind(Utc::now().to_rfc3339()).bind(task_id);
        query.execute(&self.pool).await?;

        self.get_by_id(task_id).await
    }

    /// Apply a partial update only if the row still carries `task_token`.
    ///
    /// This is the staleness gate: a worker (or the reaper) holding an
    /// outdated token gets `false` and must abandon its result silently.
    pub async fn update_if_current(
        &self,
        task_id: &str,
        task_token: &str,
        update: TaskUpdate,
    ) -> Result<bool> {
        let (clauses, params) = update.apply_clauses();
        if clauses.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE index_tasks SET {}, updated_at = ? WHERE id = ? AND task_token = ?",
            clauses.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = query.bind(param);
        }
        query = query
            .bind(Utc::now().to_rfc3339())
            .bind(task_id)
            .bind(task_token);
        let result = query.execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get task by ID
    pub async fn get_by_id(&self, task_id: &str) -> Result<Option<IndexTask>> {
        let task = sqlx::query_as::<_, IndexTask>("SELECT * FROM index_tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    /// Get the task row for a document
    pub async fn get_by_document(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<Option<IndexTask>> {
        let task = sqlx::query_as::<_, IndexTask>(
            "SELECT * FROM index_tasks WHERE document_id = ? AND owner_id = ?",
        )
        .bind(document_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    /// List tasks, optionally restricted to one owner
    pub async fn list(&self, owner_id: Option<&str>) -> Result<Vec<IndexTask>> {
        let tasks = match owner_id {
            Some(owner) => {
                sqlx::query_as::<_, IndexTask>(
                    "SELECT * FROM index_tasks WHERE owner_id = ? ORDER BY updated_at DESC",
                )
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, IndexTask>(
                    "SELECT * FROM index_tasks ORDER BY updated_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(tasks)
    }

    /// List tasks in a given status (reaper scan)
    pub async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<IndexTask>> {
        let tasks = sqlx::query_as::<_, IndexTask>(
            "SELECT * FROM index_tasks WHERE status = ? ORDER BY started_at",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    /// Delete the task row for a document
    pub async fn delete_by_document(&self, document_id: &str, owner_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM index_tasks WHERE document_id = ? AND owner_id = ?")
                .bind(document_id)
                .bind(owner_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all task rows for a knowledge base
    pub async fn delete_by_knowledge_base(
        &self,
        owner_id: &str,
        knowledge_base_id: &str,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM index_tasks WHERE owner_id = ? AND knowledge_base_id = ?")
                .bind(owner_id)
                .bind(knowledge_base_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
