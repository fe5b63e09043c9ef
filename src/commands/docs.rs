//! Document lifecycle commands
//!
//! Each command is a thin wrapper that persists the document change and
//! hands the event to the sync hook; indexing itself happens in the
//! background workers.

use crate::docs::{DocType, Document, SqliteDocuments};
use crate::error::{Error, Result};
use crate::sync::SyncHook;
use crate::tasks::{IndexTask, TaskDb};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub name: String,
    pub knowledge_base_id: String,
    pub doc_type: DocType,
}

/// Add a document and schedule its indexing
pub async fn cmd_add_document(
    docs: &SqliteDocuments,
    hook: &SyncHook,
    owner_id: &str,
    content: String,
    options: AddOptions,
) -> Result<(Document, Option<IndexTask>)> {
    let doc = Document::new(
        owner_id.to_string(),
        options.knowledge_base_id,
        options.name,
        options.doc_type,
        content,
    );
    docs.upsert(&doc).await?;
    info!("Added document {} ({})", doc.id, doc.name);

    let task = hook.on_document_created(&doc).await?;
    Ok((doc, task))
}

/// Replace a document's content and schedule reindexing
pub async fn cmd_update_document(
    docs: &SqliteDocuments,
    hook: &SyncHook,
    owner_id: &str,
    document_id: &str,
    content: String,
) -> Result<(Document, Option<IndexTask>)> {
    let mut doc = docs
        .get(owner_id, document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    doc.content = content;
    doc.updated_at = Utc::now().to_rfc3339();
    docs.upsert(&doc).await?;
    info!("Updated document {} ({})", doc.id, doc.name);

    let task = hook.on_document_updated(&doc).await?;
    Ok((doc, task))
}

/// Reindex a document without changing it (model change, recovery)
pub async fn cmd_reindex_document(
    docs: &SqliteDocuments,
    hook: &SyncHook,
    owner_id: &str,
    document_id: &str,
) -> Result<(Document, Option<IndexTask>)> {
    let doc = docs
        .get(owner_id, document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    let task = hook.on_document_updated(&doc).await?;
    Ok((doc, task))
}

/// Remove a document, its task row, and its vectors. Returns how many
/// vectors were deleted.
pub async fn cmd_remove_document(
    docs: &SqliteDocuments,
    hook: &SyncHook,
    owner_id: &str,
    document_id: &str,
) -> Result<u64> {
    let existed = docs.delete(owner_id, document_id).await?;
    if !existed {
        return Err(Error::DocumentNotFound(document_id.to_string()));
    }

    hook.on_document_deleted(owner_id, document_id).await
}

/// Remove a knowledge base wholesale: documents, task rows, vectors.
/// Returns (documents removed, vectors removed).
pub async fn cmd_remove_knowledge_base(
    docs: &SqliteDocuments,
    hook: &SyncHook,
    owner_id: &str,
    knowledge_base_id: &str,
) -> Result<(u64, u64)> {
    let docs_removed = docs
        .delete_by_knowledge_base(owner_id, knowledge_base_id)
        .await?;
    let vectors_removed = hook
        .on_knowledge_base_deleted(owner_id, knowledge_base_id)
        .await?;
    Ok((docs_removed, vectors_removed))
}

/// Document listing entry joined with its indexing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    pub doc_type: String,
    pub knowledge_base_id: String,
    pub updated_at: String,
    pub index_status: Option<String>,
    pub last_error: Option<String>,
}

/// List documents with their indexing status
pub async fn cmd_list_documents(
    docs: &SqliteDocuments,
    tasks: &TaskDb,
    owner_id: &str,
    knowledge_base_id: Option<&str>,
) -> Result<Vec<DocumentInfo>> {
    let documents = docs.list(owner_id, knowledge_base_id).await?;
    let mut result = Vec::with_capacity(documents.len());

    for doc in documents {
        let task = tasks.get_by_document(&doc.id, owner_id).await?;
        result.push(DocumentInfo {
            id: doc.id,
            name: doc.name,
            doc_type: doc.doc_type,
            knowledge_base_id: doc.knowledge_base_id,
            updated_at: doc.updated_at,
            index_status: task.as_ref().map(|t| t.status.clone()),
            last_error: task.and_then(|t| t.last_error),
        });
    }

    Ok(result)
}

/// Print a document listing to console
pub fn print_documents(documents: &[DocumentInfo]) {
    if documents.is_empty() {
        println!("No documents.");
        return;
    }

    println!("\n{} document(s):\n", documents.len());
    for doc in documents {
        let status = doc.index_status.as_deref().unwrap_or("-");
        println!("  {}  [{}]  {} ({})", doc.id, status, doc.name, doc.doc_type);
        if let Some(ref err) = doc.last_error {
            println!("      last error: {}", err);
        }
    }
}

/// Print the outcome of a document submission
pub fn print_submission(doc: &Document, task: &Option<IndexTask>) {
    println!("Document: {} ({})", doc.id, doc.name);
    match task {
        Some(task) => println!("Indexing scheduled (task {}, status {})", task.id, task.status),
        None => println!("No indexing scheduled."),
    }
}
