//! Default values for configuration

/// Default Qdrant URL for local development
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default environment variable name for Qdrant API key
pub fn default_qdrant_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

/// Default collection name
pub fn default_collection_name() -> String {
    "memovault_chunks".to_string()
}

/// Default embedding backend ("local" or "http")
pub fn default_embedding_backend() -> String {
    "local".to_string()
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension for bge-small-en-v1.5
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default base URL for the HTTP embedding backend
pub fn default_embedding_http_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

/// Default maximum tokens per chunk
pub fn default_chunk_max_tokens() -> usize {
    512
}

/// Default overlap tokens between consecutive chunks
pub fn default_chunk_overlap_tokens() -> usize {
    128
}

/// Default number of concurrent indexing workers
pub fn default_sync_max_workers() -> usize {
    4
}

/// Default indexing task timeout in seconds (5 minutes)
pub fn default_sync_timeout_secs() -> u64 {
    300
}

/// Default interval between reaper sweeps in seconds
pub fn default_reaper_interval_secs() -> u64 {
    60
}

/// Default number of search results
pub fn default_search_k() -> usize {
    5
}

/// Default maximum search results
pub fn default_search_max_results() -> usize {
    100
}
