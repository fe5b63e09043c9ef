//! Qdrant vector database integration
//!
//! This module provides the [`VectorIndex`] seam the orchestrator works
//! against, plus the Qdrant-backed implementation:
//! - Collection management
//! - Point insert operations
//! - Metadata-filtered delete (the delete-then-rebuild primitive)
//! - Vector search

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, ScalarQuantizationBuilder, SearchPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};

/// Boolean predicate over chunk metadata.
///
/// Present fields are ANDed; an empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub owner_id: Option<String>,
    pub document_id: Option<String>,
    pub knowledge_base_id: Option<String>,
}

impl VectorFilter {
    /// Filter for all vectors of one document
    pub fn for_document(owner_id: &str, document_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            document_id: Some(document_id.to_string()),
            knowledge_base_id: None,
        }
    }

    /// Filter for all vectors of one knowledge base
    pub fn for_knowledge_base(owner_id: &str, knowledge_base_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            document_id: None,
            knowledge_base_id: Some(knowledge_base_id.to_string()),
        }
    }

    fn to_qdrant_filter(&self) -> Option<Filter> {
        let mut must: Vec<Condition> = Vec::new();

        if let Some(ref owner_id) = self.owner_id {
            must.push(Condition::matches("owner_id", owner_id.clone()));
        }
        if let Some(ref document_id) = self.document_id {
            must.push(Condition::matches("document_id", document_id.clone()));
        }
        if let Some(ref kb_id) = self.knowledge_base_id {
            must.push(Condition::matches("knowledge_base_id", kb_id.clone()));
        }

        if must.is_empty() {
            return None;
        }

        Some(Filter {
            must,
            should: vec![],
            must_not: vec![],
            min_should: None,
        })
    }
}

/// Search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// The vector-store collaborator the indexing core depends on
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert (or overwrite, by point id) chunk vectors
    async fn insert(&self, points: Vec<ChunkPoint>) -> Result<()>;

    /// Delete all vectors matching the filter; returns how many matched.
    /// Idempotent: deleting nothing is not an error.
    async fn delete(&self, filter: &VectorFilter) -> Result<u64>;

    /// Similarity search restricted by the filter
    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SearchResult>>;
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding.dimension,
        )
        .await
    }

    /// Create a new store connection directly with URL and collection name
    pub async fn new(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    /// Get the expected vector dimension for this store
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Ensure the collection exists with correct configuration
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self.client.collection_exists(&self.collection).await?;

        if exists {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        let exists = self.client.collection_exists(&self.collection).await?;
        Ok(exists)
    }

    /// Get collection point count (status surface)
    pub async fn points_count(&self) -> Result<u64> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(0);
        }
        let info = self.client.collection_info(&self.collection).await?;
        Ok(info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0))
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn insert(&self, points: Vec<ChunkPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {}, got {}",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs: Vec<PointStruct> =
            points.into_iter().map(|p| p.to_point_struct()).collect();

        self.client
            .upsert_points(qdrant_client::qdrant::UpsertPointsBuilder::new(
                &self.collection,
                point_structs,
            ))
            .await?;

        Ok(())
    }

    async fn delete(&self, filter: &VectorFilter) -> Result<u64> {
        let Some(qdrant_filter) = filter.to_qdrant_filter() else {
            return Err(Error::Qdrant(
                "Refusing to delete with an empty filter".to_string(),
            ));
        };

        // Qdrant's delete response carries no count, so count first. The two
        // steps need not be atomic: the number only feeds logs and stats.
        let count = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(qdrant_filter.clone())
                    .exact(true),
            )
            .await?
            .result
            .map(|r| r.count)
            .unwrap_or(0);

        debug!(
            "Deleting {} points from collection {} ({:?})",
            count, self.collection, filter
        );

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(qdrant_filter))
            .await?;

        Ok(count)
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<SearchResult>> {
        debug!(
            "Searching collection {} with limit {}",
            self.collection, limit
        );

        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
                .with_payload(true);

        if let Some(qdrant_filter) = filter.to_qdrant_filter() {
            search_builder = search_builder.filter(qdrant_filter);
        }

        let response = self.client.search_points(search_builder).await?;

        let results: Vec<SearchResult> = response
            .result
            .into_iter()
            .map(|p| {
                let payload: ChunkPayload = p
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect::<serde_json::Map<String, Value>>()
                    .into();

                SearchResult {
                    id: point_id_to_string(p.id),
                    score: p.score,
                    payload,
                }
            })
            .collect();

        Ok(results)
    }
}

/// Convert PointId to string
fn point_id_to_string(id: Option<qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;

    match id.and_then(|i| i.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_filter_to_qdrant() {
        let filter = VectorFilter::for_document("alice", "doc-1");
        let qdrant_filter = filter.to_qdrant_filter().unwrap();
        assert_eq!(qdrant_filter.must.len(), 2);

        let filter = VectorFilter::for_knowledge_base("alice", "kb-1");
        let qdrant_filter = filter.to_qdrant_filter().unwrap();
        assert_eq!(qdrant_filter.must.len(), 2);

        assert!(VectorFilter::default().to_qdrant_filter().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_dimension_mismatch() {
        // Client construction is lazy, so no running Qdrant is needed here
        let store = QdrantStore::new("http://127.0.0.1:6334", "test_collection", 3)
            .await
            .expect("store should initialize");

        let point = ChunkPoint {
            id: Uuid::new_v4(),
            vector: vec![0.1, 0.2],
            payload: ChunkPayload {
                document_id: "doc-1".to_string(),
                owner_id: "alice".to_string(),
                knowledge_base_id: "kb-1".to_string(),
                document_name: "notes.md".to_string(),
                chunk_index: 0,
                chunk_hash: "hash123".to_string(),
                text: "chunk text".to_string(),
                updated_at: "2024-01-01T00:00:00Z".to_string(),
            },
        };

        let err = store
            .insert(vec![point])
            .await
            .expect_err("should reject mismatched vector length");

        match err {
            Error::Qdrant(message) => assert!(message.contains("dimension mismatch")),
            other => panic!("expected qdrant error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_requires_scope() {
        let store = QdrantStore::new("http://127.0.0.1:6334", "test_collection", 3)
            .await
            .expect("store should initialize");

        let err = store
            .delete(&VectorFilter::default())
            .await
            .expect_err("unscoped delete must be refused");
        assert!(matches!(err, Error::Qdrant(_)));
    }
}
