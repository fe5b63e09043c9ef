//! Document records and the `DocumentSource` seam
//!
//! The orchestrator never trusts the document it was handed at event time:
//! before embedding it re-fetches the freshest content through
//! [`DocumentSource`]. `SqliteDocuments` is the built-in implementation,
//! backed by the same SQLite file as the task table.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Document types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Note,
    File,
    Folder,
}

impl DocType {
    /// Containers hold other documents and have no indexable content
    pub fn is_container(&self) -> bool {
        matches!(self, DocType::Folder)
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocType::Note => write!(f, "note"),
            DocType::File => write!(f, "file"),
            DocType::Folder => write!(f, "folder"),
        }
    }
}

impl FromStr for DocType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "note" => Ok(DocType::Note),
            "file" => Ok(DocType::File),
            "folder" => Ok(DocType::Folder),
            _ => Err(Error::Config(format!("Unknown document type: {}", s))),
        }
    }
}

/// A knowledge-base document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub knowledge_base_id: String,
    pub name: String,
    pub doc_type: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn new(
        owner_id: String,
        knowledge_base_id: String,
        name: String,
        doc_type: DocType,
        content: String,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            knowledge_base_id,
            name,
            doc_type: doc_type.to_string(),
            content,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_type(&self) -> Result<DocType> {
        self.doc_type.parse()
    }

    pub fn is_container(&self) -> bool {
        self.get_type().map(|t| t.is_container()).unwrap_or(false)
    }
}

/// Read access to the freshest document content
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a document by owner and id; `None` if it no longer exists
    async fn fetch(&self, owner_id: &str, document_id: &str) -> Result<Option<Document>>;
}

/// SQLite-backed document table
#[derive(Clone)]
pub struct SqliteDocuments {
    pool: SqlitePool,
}

impl SqliteDocuments {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a document
    pub async fn upsert(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, owner_id, knowledge_base_id, name, doc_type, content, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                doc_type = excluded.doc_type,
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.knowledge_base_id)
        .bind(&doc.name)
        .bind(&doc.doc_type)
        .bind(&doc.content)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a document by owner and id
    pub async fn get(&self, owner_id: &str, document_id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE id = ? AND owner_id = ?",
        )
        .bind(document_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// List documents for an owner, optionally scoped to a knowledge base
    pub async fn list(
        &self,
        owner_id: &str,
        knowledge_base_id: Option<&str>,
    ) -> Result<Vec<Document>> {
        let docs = match knowledge_base_id {
            Some(kb) => {
                sqlx::query_as::<_, Document>(
                    "SELECT * FROM documents WHERE owner_id = ? AND knowledge_base_id = ? ORDER BY name",
                )
                .bind(owner_id)
                .bind(kb)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Document>(
                    "SELECT * FROM documents WHERE owner_id = ? ORDER BY name",
                )
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(docs)
    }

    /// Delete a document; returns whether a row was removed
    pub async fn delete(&self, owner_id: &str, document_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(document_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all documents in a knowledge base
    pub async fn delete_by_knowledge_base(
        &self,
        owner_id: &str,
        knowledge_base_id: &str,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM documents WHERE owner_id = ? AND knowledge_base_id = ?")
                .bind(owner_id)
                .bind(knowledge_base_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DocumentSource for SqliteDocuments {
    async fn fetch(&self, owner_id: &str, document_id: &str) -> Result<Option<Document>> {
        self.get(owner_id, document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskDb;
    use tempfile::TempDir;

    async fn setup() -> (SqliteDocuments, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = TaskDb::new(&tmp.path().join("test.db")).await.unwrap();
        (SqliteDocuments::new(db.pool().clone()), tmp)
    }

    #[tokio::test]
    async fn test_document_crud() {
        let (docs, _tmp) = setup().await;

        let doc = Document::new(
            "alice".to_string(),
            "kb-1".to_string(),
            "notes.md".to_string(),
            DocType::Note,
            "hello world".to_string(),
        );
        docs.upsert(&doc).await.unwrap();

        let loaded = docs.fetch("alice", &doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "hello world");
        assert_eq!(loaded.get_type().unwrap(), DocType::Note);

        // Owner scoping: bob cannot see alice's document
        assert!(docs.fetch("bob", &doc.id).await.unwrap().is_none());

        let listed = docs.list("alice", Some("kb-1")).await.unwrap();
        assert_eq!(listed.len(), 1);

        assert!(docs.delete("alice", &doc.id).await.unwrap());
        assert!(docs.fetch("alice", &doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_folder_is_container() {
        let doc = Document::new(
            "alice".to_string(),
            "kb-1".to_string(),
            "projects".to_string(),
            DocType::Folder,
            String::new(),
        );
        assert!(doc.is_container());
        assert!(!DocType::File.is_container());
    }
}
