//! Background indexing orchestration
//!
//! [`SyncHook`] is the write path's listener: document lifecycle events come
//! in, indexing work goes out to a bounded pool of tokio tasks, and the
//! `index_tasks` table tracks what happened. Staleness is decided by the
//! `task_token` on the row; a worker whose token is no longer current must
//! abandon its result without touching the row.
//!
//! Workers never get aborted. Cancellation is cooperative: superseded work
//! runs to the end and is discarded at the commit gate.

mod reaper;

pub use reaper::*;

use crate::chunk::chunk_by_tokens;
use crate::config::{ChunkConfig, Config};
use crate::docs::{Document, DocumentSource};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::store::{ChunkPayload, ChunkPoint, VectorFilter, VectorIndex};
use crate::tasks::{IndexTask, TaskDb, TaskStatus, TaskUpdate};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a worker needs, cheap to clone into a spawned task
#[derive(Clone)]
struct WorkerContext {
    tasks: TaskDb,
    documents: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunk_config: ChunkConfig,
    batch_size: usize,
}

/// Document-event listener that schedules background indexing
pub struct SyncHook {
    ctx: WorkerContext,
    workers: Arc<Semaphore>,
    enabled: bool,
    /// In-flight workers keyed by task token; finished entries are pruned
    /// on the next submission, so the map tracks live work only
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SyncHook {
    pub fn new(
        tasks: TaskDb,
        documents: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Self {
        Self {
            ctx: WorkerContext {
                tasks,
                documents,
                embedder,
                index,
                chunk_config: config.chunk.clone(),
                batch_size: config.embedding.batch_size,
            },
            workers: Arc::new(Semaphore::new(config.sync.max_workers.max(1))),
            enabled: true,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// A disabled hook acknowledges every event and does nothing
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub async fn on_document_created(&self, doc: &Document) -> Result<Option<IndexTask>> {
        self.submit(doc).await
    }

    pub async fn on_document_updated(&self, doc: &Document) -> Result<Option<IndexTask>> {
        self.submit(doc).await
    }

    /// Record the event and schedule a worker; returns the task row, or
    /// `None` when the event is ignored (hook disabled, container document).
    ///
    /// Submission never blocks on the worker pool: the permit is acquired
    /// inside the spawned task. Resubmitting a document replaces its row
    /// with a fresh token, which silently invalidates any in-flight worker.
    pub async fn submit(&self, doc: &Document) -> Result<Option<IndexTask>> {
        if !self.enabled {
            debug!("Sync hook disabled, ignoring event for {}", doc.id);
            return Ok(None);
        }
        if doc.is_container() {
            debug!("Skipping container document {} ({})", doc.id, doc.doc_type);
            return Ok(None);
        }

        let task_token = Uuid::new_v4().to_string();
        let task = self
            .ctx
            .tasks
            .upsert(
                &doc.id,
                &doc.owner_id,
                &doc.knowledge_base_id,
                &task_token,
                TaskStatus::Indexing,
            )
            .await?;

        info!(
            "Scheduled indexing for document {} (task {}, token {})",
            doc.id, task.id, task_token
        );

        let ctx = self.ctx.clone();
        let workers = Arc::clone(&self.workers);
        let task_id = task.id.clone();
        let worker_token = task_token.clone();
        let owner_id = doc.owner_id.clone();
        let document_id = doc.id.clone();

        let handle = tokio::spawn(async move {
            run_worker(ctx, workers, task_id, worker_token, owner_id, document_id).await;
        });

        let mut handles = self.handles.lock().await;
        handles.retain(|_, h| !h.is_finished());
        handles.insert(task_token, handle);

        Ok(Some(task))
    }

    /// Remove the document's task row and vectors; returns how many vectors
    /// were deleted
    pub async fn on_document_deleted(&self, owner_id: &str, document_id: &str) -> Result<u64> {
        if !self.enabled {
            return Ok(0);
        }

        self.ctx
            .tasks
            .delete_by_document(document_id, owner_id)
            .await?;

        let removed = self
            .ctx
            .index
            .delete(&VectorFilter::for_document(owner_id, document_id))
            .await?;

        info!(
            "Deleted document {}: removed {} vectors",
            document_id, removed
        );
        Ok(removed)
    }

    /// Remove every task row and vector belonging to a knowledge base.
    ///
    /// The vector delete is filter-based, so it also catches strays whose
    /// task rows are already gone.
    pub async fn on_knowledge_base_deleted(
        &self,
        owner_id: &str,
        knowledge_base_id: &str,
    ) -> Result<u64> {
        if !self.enabled {
            return Ok(0);
        }

        let tasks_removed = self
            .ctx
            .tasks
            .delete_by_knowledge_base(owner_id, knowledge_base_id)
            .await?;

        let removed = self
            .ctx
            .index
            .delete(&VectorFilter::for_knowledge_base(owner_id, knowledge_base_id))
            .await?;

        info!(
            "Deleted knowledge base {}: removed {} tasks, {} vectors",
            knowledge_base_id, tasks_removed, removed
        );
        Ok(removed)
    }

    /// Wait for every worker spawned so far to finish. Used by the CLI
    /// before exiting and by tests.
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Worker body: claim, index, commit. Every row write goes through the
/// token gate, so a superseded worker can fail at any point without
/// corrupting the newer run's state.
async fn run_worker(
    ctx: WorkerContext,
    workers: Arc<Semaphore>,
    task_id: String,
    task_token: String,
    owner_id: String,
    document_id: String,
) {
    let _permit = match workers.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    // Cheap pre-check before doing any real work. The row may have been
    // replaced (newer token) or deleted while this worker sat in the queue.
    match ctx.tasks.get_by_id(&task_id).await {
        Ok(Some(row)) if row.task_token == task_token => {}
        Ok(_) => {
            debug!(
                "Task {} superseded before start, abandoning (token {})",
                task_id, task_token
            );
            return;
        }
        Err(e) => {
            warn!("Task {} pre-check failed: {}", task_id, e);
            return;
        }
    }

    let worker_ref = format!("{:?}", std::thread::current().id());
    match ctx
        .tasks
        .update_if_current(
            &task_id,
            &task_token,
            TaskUpdate {
                worker_ref: Some(worker_ref),
                ..Default::default()
            },
        )
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            debug!("Task {} superseded at claim, abandoning", task_id);
            return;
        }
        Err(e) => {
            warn!("Task {} claim failed: {}", task_id, e);
            return;
        }
    }

    let outcome = index_document(&ctx, &owner_id, &document_id).await;
    let now = Utc::now().to_rfc3339();

    let update = match &outcome {
        Ok(chunk_count) => {
            debug!(
                "Indexed document {} into {} chunks (task {})",
                document_id, chunk_count, task_id
            );
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                completed_at: Some(now),
                ..Default::default()
            }
        }
        Err(e) => {
            warn!("Indexing document {} failed: {}", document_id, e);
            TaskUpdate {
                status: Some(TaskStatus::Failed),
                completed_at: Some(now),
                last_error: Some(e.to_string()),
                ..Default::default()
            }
        }
    };

    // Terminal commit. `false` means a newer submission owns the row now;
    // this worker's result is discarded without a trace.
    match ctx.tasks.update_if_current(&task_id, &task_token, update).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(
                "Task {} result discarded, token {} no longer current",
                task_id, task_token
            );
        }
        Err(e) => {
            warn!("Task {} commit failed: {}", task_id, e);
        }
    }
}

/// Delete old vectors, re-fetch, chunk, embed, insert. Returns the number
/// of chunks written.
///
/// Old vectors go first: a failure anywhere after, including the fetch,
/// leaves the document absent from search rather than stale or half new.
async fn index_document(ctx: &WorkerContext, owner_id: &str, document_id: &str) -> Result<usize> {
    let removed = ctx
        .index
        .delete(&VectorFilter::for_document(owner_id, document_id))
        .await?;
    if removed > 0 {
        debug!("Removed {} stale vectors for document {}", removed, document_id);
    }

    let doc = ctx
        .documents
        .fetch(owner_id, document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    let chunks = chunk_by_tokens(&doc.content, &doc.id, &ctx.chunk_config)?;
    if chunks.is_empty() {
        debug!("Document {} has no indexable content", document_id);
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_in_batches(ctx.embedder.as_ref(), texts, ctx.batch_size).await?;
    if embeddings.len() != chunks.len() {
        return Err(Error::Embedding(format!(
            "Got {} embeddings for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    let now = Utc::now().to_rfc3339();
    let points: Vec<ChunkPoint> = chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, vector)| ChunkPoint {
            id: chunk.point_id(&doc.id),
            vector,
            payload: ChunkPayload {
                document_id: doc.id.clone(),
                owner_id: doc.owner_id.clone(),
                knowledge_base_id: doc.knowledge_base_id.clone(),
                document_name: doc.name.clone(),
                chunk_index: chunk.index as i32,
                chunk_hash: chunk.hash.clone(),
                text: chunk.text.clone(),
                updated_at: now.clone(),
            },
        })
        .collect();

    ctx.index.insert(points).await?;
    Ok(chunks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::{DocType, SqliteDocuments};
    use crate::store::SearchResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory vector index with the same filter semantics as Qdrant
    #[derive(Default)]
    struct MemoryIndex {
        points: StdMutex<HashMap<Uuid, ChunkPoint>>,
    }

    impl MemoryIndex {
        fn len(&self) -> usize {
            self.points.lock().unwrap().len()
        }

        fn texts(&self) -> Vec<String> {
            let mut texts: Vec<String> = self
                .points
                .lock()
                .unwrap()
                .values()
                .map(|p| p.payload.text.clone())
                .collect();
            texts.sort();
            texts
        }

        fn matches(filter: &VectorFilter, payload: &ChunkPayload) -> bool {
            filter
                .owner_id
                .as_ref()
                .is_none_or(|v| *v == payload.owner_id)
                && filter
                    .document_id
                    .as_ref()
                    .is_none_or(|v| *v == payload.document_id)
                && filter
                    .knowledge_base_id
                    .as_ref()
                    .is_none_or(|v| *v == payload.knowledge_base_id)
        }
    }

    #[async_trait]
    impl VectorIndex for MemoryIndex {
        async fn insert(&self, points: Vec<ChunkPoint>) -> Result<()> {
            let mut map = self.points.lock().unwrap();
            for point in points {
                map.insert(point.id, point);
            }
            Ok(())
        }

        async fn delete(&self, filter: &VectorFilter) -> Result<u64> {
            let mut map = self.points.lock().unwrap();
            let before = map.len();
            map.retain(|_, p| !Self::matches(filter, &p.payload));
            Ok((before - map.len()) as u64)
        }

        async fn search(
            &self,
            _query_vector: Vec<f32>,
            limit: usize,
            filter: &VectorFilter,
        ) -> Result<Vec<SearchResult>> {
            let map = self.points.lock().unwrap();
            Ok(map
                .values()
                .filter(|p| Self::matches(filter, &p.payload))
                .take(limit)
                .map(|p| SearchResult {
                    id: p.id.to_string(),
                    score: 1.0,
                    payload: p.payload.clone(),
                })
                .collect())
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("backend unavailable".to_string()))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    /// Embedder whose first call blocks until the gate opens. Later calls
    /// pass straight through. Used to hold one worker mid-flight.
    struct GatedEmbedder {
        gate: Semaphore,
        first_blocked: AtomicBool,
        calls: AtomicUsize,
    }

    impl GatedEmbedder {
        fn new() -> Self {
            Self {
                gate: Semaphore::new(0),
                first_blocked: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn open(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl Embedder for GatedEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                self.first_blocked.store(true, Ordering::SeqCst);
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|_| Error::Embedding("gate closed".to_string()))?;
            }
            Ok(texts.iter().map(|_| vec![0.1; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "gated"
        }
    }

    struct Fixture {
        hook: SyncHook,
        tasks: TaskDb,
        docs: SqliteDocuments,
        index: Arc<MemoryIndex>,
        _tmp: TempDir,
    }

    async fn setup(embedder: Arc<dyn Embedder>, max_workers: usize) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let tasks = TaskDb::new(&tmp.path().join("test.db")).await.unwrap();
        let docs = SqliteDocuments::new(tasks.pool().clone());
        let index = Arc::new(MemoryIndex::default());

        let mut config = Config::default();
        config.sync.max_workers = max_workers;
        config.chunk.max_tokens = 8;
        config.chunk.overlap_tokens = 2;

        let hook = SyncHook::new(
            tasks.clone(),
            Arc::new(docs.clone()),
            embedder,
            index.clone() as Arc<dyn VectorIndex>,
            &config,
        );

        Fixture {
            hook,
            tasks,
            docs,
            index,
            _tmp: tmp,
        }
    }

    async fn store_note(fx: &Fixture, content: &str) -> Document {
        let doc = Document::new(
            "alice".to_string(),
            "kb-1".to_string(),
            "notes.md".to_string(),
            DocType::Note,
            content.to_string(),
        );
        fx.docs.upsert(&doc).await.unwrap();
        doc
    }

    async fn wait_until<F>(mut cond: F)
    where
        F: FnMut() -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_index_note_end_to_end() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        let content = (0..20).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        let doc = store_note(&fx, &content).await;

        let task = fx.hook.on_document_created(&doc).await.unwrap().unwrap();
        assert_eq!(task.get_status().unwrap(), TaskStatus::Indexing);
        assert!(task.started_at.is_some());

        fx.hook.wait_idle().await;

        let row = fx
            .tasks
            .get_by_document(&doc.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_status().unwrap(), TaskStatus::Completed);
        assert!(row.completed_at.is_some());
        assert!(row.worker_ref.is_some());
        assert!(row.last_error.is_none());

        // 20 tokens, windows of 8 with advance 6: chunks at 0, 6, 12
        assert_eq!(fx.index.len(), 3);
        let points = fx.index.points.lock().unwrap();
        for point in points.values() {
            assert_eq!(point.payload.document_id, doc.id);
            assert_eq!(point.payload.owner_id, "alice");
            assert_eq!(point.payload.knowledge_base_id, "kb-1");
            assert_eq!(point.vector.len(), 4);
        }
    }

    #[tokio::test]
    async fn test_container_documents_are_skipped() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        let folder = Document::new(
            "alice".to_string(),
            "kb-1".to_string(),
            "projects".to_string(),
            DocType::Folder,
            String::new(),
        );

        let result = fx.hook.on_document_created(&folder).await.unwrap();
        assert!(result.is_none());
        assert!(fx
            .tasks
            .get_by_document(&folder.id, "alice")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_disabled_hook_ignores_events() {
        let mut fx = setup(Arc::new(FixedEmbedder), 4).await;
        fx.hook = fx.hook.disabled();
        let doc = store_note(&fx, "some content here").await;

        assert!(fx.hook.on_document_created(&doc).await.unwrap().is_none());
        assert_eq!(fx.hook.on_document_deleted("alice", &doc.id).await.unwrap(), 0);
        assert!(fx.tasks.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_vectors() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        let long = (0..20).map(|i| format!("old{}", i)).collect::<Vec<_>>().join(" ");
        let mut doc = store_note(&fx, &long).await;

        fx.hook.on_document_created(&doc).await.unwrap();
        fx.hook.wait_idle().await;
        assert_eq!(fx.index.len(), 3);

        doc.content = "fresh short text".to_string();
        doc.updated_at = Utc::now().to_rfc3339();
        fx.docs.upsert(&doc).await.unwrap();

        fx.hook.on_document_updated(&doc).await.unwrap();
        fx.hook.wait_idle().await;

        assert_eq!(fx.index.len(), 1);
        assert_eq!(fx.index.texts(), vec!["fresh short text".to_string()]);
    }

    #[tokio::test]
    async fn test_embedding_failure_marks_failed() {
        let fx = setup(Arc::new(FailingEmbedder), 4).await;
        let doc = store_note(&fx, "content that will not embed").await;

        fx.hook.on_document_created(&doc).await.unwrap();
        fx.hook.wait_idle().await;

        let row = fx
            .tasks
            .get_by_document(&doc.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_status().unwrap(), TaskStatus::Failed);
        assert!(row
            .last_error
            .as_deref()
            .unwrap()
            .contains("backend unavailable"));
        assert!(row.completed_at.is_some());
        // Old vectors stay deleted, new ones never landed
        assert_eq!(fx.index.len(), 0);
    }

    #[tokio::test]
    async fn test_missing_document_marks_failed() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        // Never stored in the source table
        let doc = Document::new(
            "alice".to_string(),
            "kb-1".to_string(),
            "ghost.md".to_string(),
            DocType::Note,
            "never persisted".to_string(),
        );

        fx.hook.on_document_created(&doc).await.unwrap();
        fx.hook.wait_idle().await;

        let row = fx
            .tasks
            .get_by_document(&doc.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_status().unwrap(), TaskStatus::Failed);
        assert!(row.last_error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_failed_fetch_still_clears_old_vectors() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        let doc = store_note(&fx, "one two three four five six seven eight nine ten").await;

        fx.hook.on_document_created(&doc).await.unwrap();
        fx.hook.wait_idle().await;
        assert!(fx.index.len() > 0);

        // Pull the row out from under the next run, past the hook
        fx.docs.delete("alice", &doc.id).await.unwrap();

        fx.hook.submit(&doc).await.unwrap();
        fx.hook.wait_idle().await;

        let row = fx
            .tasks
            .get_by_document(&doc.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_status().unwrap(), TaskStatus::Failed);
        assert!(row.last_error.as_deref().unwrap().contains("not found"));
        // The failed run must not leave the previous run's vectors searchable
        assert_eq!(fx.index.len(), 0);
    }

    #[tokio::test]
    async fn test_empty_document_completes_with_no_vectors() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        let doc = store_note(&fx, "   \n  ").await;

        fx.hook.on_document_created(&doc).await.unwrap();
        fx.hook.wait_idle().await;

        let row = fx
            .tasks
            .get_by_document(&doc.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_status().unwrap(), TaskStatus::Completed);
        assert_eq!(fx.index.len(), 0);
    }

    /// Three rapid submissions, one worker slot. The first worker stalls in
    /// the embedder, the second gets superseded while queued (and must not
    /// call the embedder at all), the third wins.
    #[tokio::test]
    async fn test_superseded_workers_lose_to_latest_token() {
        let embedder = Arc::new(GatedEmbedder::new());
        let fx = setup(embedder.clone(), 1).await;
        let mut doc = store_note(&fx, "version one of the text").await;

        let t1 = fx.hook.submit(&doc).await.unwrap().unwrap();
        wait_until(|| embedder.first_blocked.load(Ordering::SeqCst)).await;

        doc.content = "version two of the text".to_string();
        fx.docs.upsert(&doc).await.unwrap();
        let t2 = fx.hook.submit(&doc).await.unwrap().unwrap();

        doc.content = "version three of the text".to_string();
        fx.docs.upsert(&doc).await.unwrap();
        let t3 = fx.hook.submit(&doc).await.unwrap().unwrap();

        assert_eq!(t1.id, t2.id);
        assert_eq!(t2.id, t3.id);
        assert_ne!(t1.task_token, t3.task_token);

        embedder.open();
        fx.hook.wait_idle().await;

        let row = fx
            .tasks
            .get_by_document(&doc.id, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_status().unwrap(), TaskStatus::Completed);
        assert_eq!(row.task_token, t3.task_token);

        // Worker 2 saw a newer token at its pre-check and never embedded:
        // only the stalled worker and the winner reached the embedder.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_commit_does_not_overwrite_winner() {
        let embedder = Arc::new(GatedEmbedder::new());
        let fx = setup(embedder.clone(), 4).await;
        let mut doc = store_note(&fx, "first draft").await;

        let t1 = fx.hook.submit(&doc).await.unwrap().unwrap();
        wait_until(|| embedder.first_blocked.load(Ordering::SeqCst)).await;

        doc.content = "second draft".to_string();
        fx.docs.upsert(&doc).await.unwrap();
        let t2 = fx.hook.submit(&doc).await.unwrap().unwrap();

        // Let the fresh worker win first
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(Some(row)) = fx.tasks.get_by_id(&t2.id).await {
                    if row.task_token == t2.task_token
                        && row.get_status().map(|s| s.is_terminal()).unwrap_or(false)
                    {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("fresh worker should complete");

        // Now release the stale worker; its commit must be a no-op
        embedder.open();
        fx.hook.wait_idle().await;

        let row = fx.tasks.get_by_id(&t1.id).await.unwrap().unwrap();
        assert_eq!(row.get_status().unwrap(), TaskStatus::Completed);
        assert_eq!(row.task_token, t2.task_token);
    }

    #[tokio::test]
    async fn test_handle_registry_prunes_and_drains() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        let doc_a = store_note(&fx, "first document text").await;
        let task_a = fx.hook.submit(&doc_a).await.unwrap().unwrap();
        assert!(fx.hook.handles.lock().await.contains_key(&task_a.task_token));

        // Let the first worker's future finish without draining the registry
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if fx.hook.handles.lock().await.values().all(|h| h.is_finished()) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first worker should finish");

        // The next submission prunes the finished entry
        let doc_b = store_note(&fx, "second document text").await;
        let task_b = fx.hook.submit(&doc_b).await.unwrap().unwrap();
        {
            let handles = fx.hook.handles.lock().await;
            assert_eq!(handles.len(), 1);
            assert!(handles.contains_key(&task_b.task_token));
        }

        fx.hook.wait_idle().await;
        assert!(fx.hook.handles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_document_deleted_removes_task_and_vectors() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;
        let doc = store_note(&fx, "text to be deleted soon").await;

        fx.hook.on_document_created(&doc).await.unwrap();
        fx.hook.wait_idle().await;
        assert!(fx.index.len() > 0);

        let removed = fx.hook.on_document_deleted("alice", &doc.id).await.unwrap();
        assert_eq!(removed as usize, 1);
        assert!(fx
            .tasks
            .get_by_document(&doc.id, "alice")
            .await
            .unwrap()
            .is_none());
        assert_eq!(fx.index.len(), 0);
    }

    #[tokio::test]
    async fn test_knowledge_base_deleted_clears_everything() {
        let fx = setup(Arc::new(FixedEmbedder), 4).await;

        let doc_a = store_note(&fx, "first document text").await;
        let doc_b = Document::new(
            "alice".to_string(),
            "kb-2".to_string(),
            "other.md".to_string(),
            DocType::Note,
            "second document text".to_string(),
        );
        fx.docs.upsert(&doc_b).await.unwrap();

        fx.hook.on_document_created(&doc_a).await.unwrap();
        fx.hook.on_document_created(&doc_b).await.unwrap();
        fx.hook.wait_idle().await;
        assert_eq!(fx.index.len(), 2);

        fx.hook.on_knowledge_base_deleted("alice", "kb-1").await.unwrap();

        // kb-2 survives intact
        assert_eq!(fx.index.len(), 1);
        let remaining = fx.tasks.list(Some("alice")).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].knowledge_base_id, "kb-2");
    }
}
