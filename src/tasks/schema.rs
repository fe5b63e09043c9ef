//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Documents: user-owned knowledge-base entries
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    knowledge_base_id TEXT NOT NULL,
    name TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Index tasks: one row per (document, owner); the task_token column is the
-- authority for which background execution may commit a result
CREATE TABLE IF NOT EXISTS index_tasks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    knowledge_base_id TEXT NOT NULL,
    status TEXT NOT NULL,
    task_token TEXT NOT NULL,
    worker_ref TEXT,
    started_at TEXT,
    completed_at TEXT,
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(document_id, owner_id)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
CREATE INDEX IF NOT EXISTS idx_documents_kb ON documents(knowledge_base_id);
CREATE INDEX IF NOT EXISTS idx_index_tasks_owner ON index_tasks(owner_id);
CREATE INDEX IF NOT EXISTS idx_index_tasks_kb ON index_tasks(knowledge_base_id);
CREATE INDEX IF NOT EXISTS idx_index_tasks_status ON index_tasks(status);
"#;
