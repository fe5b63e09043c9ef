//! Payload schema for Qdrant points

use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// A point ready to be upserted to Qdrant
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), self.vector, payload_map)
    }
}

/// Payload stored with each chunk in Qdrant.
///
/// The id triple (document, owner, knowledge base) is what delete and search
/// filters match on; everything else is retrieval-time provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Document ID this chunk came from
    pub document_id: String,

    /// Owner of the document
    pub owner_id: String,

    /// Knowledge base the document belongs to
    pub knowledge_base_id: String,

    /// Document name (for display)
    pub document_name: String,

    /// Chunk index within the document
    pub chunk_index: i32,

    /// Hash of the chunk content
    pub chunk_hash: String,

    /// The chunk text itself
    pub text: String,

    /// When this chunk was indexed
    pub updated_at: String,
}

impl ChunkPayload {
    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert(
            "document_id".to_string(),
            string_to_qdrant(&self.document_id),
        );
        map.insert("owner_id".to_string(), string_to_qdrant(&self.owner_id));
        map.insert(
            "knowledge_base_id".to_string(),
            string_to_qdrant(&self.knowledge_base_id),
        );
        map.insert(
            "document_name".to_string(),
            string_to_qdrant(&self.document_name),
        );
        map.insert(
            "chunk_index".to_string(),
            int_to_qdrant(self.chunk_index as i64),
        );
        map.insert("chunk_hash".to_string(), string_to_qdrant(&self.chunk_hash));
        map.insert("text".to_string(), string_to_qdrant(&self.text));
        map.insert("updated_at".to_string(), string_to_qdrant(&self.updated_at));

        map
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(
            s.to_string(),
        )),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

impl From<Map<String, Value>> for ChunkPayload {
    fn from(map: Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(map)).unwrap_or_else(|_| ChunkPayload {
            document_id: String::new(),
            owner_id: String::new(),
            knowledge_base_id: String::new(),
            document_name: String::new(),
            chunk_index: 0,
            chunk_hash: String::new(),
            text: String::new(),
            updated_at: String::new(),
        })
    }
}
