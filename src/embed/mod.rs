//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - Local embedding support via fastembed
//! - An OpenAI-compatible HTTP backend
//! - Batch processing for efficiency

mod http_backend;
#[cfg(feature = "local-embed")]
mod local;

pub use http_backend::*;
#[cfg(feature = "local-embed")]
pub use local::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.backend.as_str() {
        "http" => Ok(Box::new(HttpEmbedder::new(config)?)),
        "local" => {
            #[cfg(feature = "local-embed")]
            {
                Ok(Box::new(LocalEmbedder::new(config)?))
            }
            #[cfg(not(feature = "local-embed"))]
            {
                Err(Error::Embedding(
                    "Local backend requires the 'local-embed' feature".to_string(),
                ))
            }
        }
        other => Err(Error::Embedding(format!(
            "Unknown embedding backend: {}",
            other
        ))),
    }
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch_texts: Vec<String> = chunk.to_vec();
        let embeddings = embedder.embed(batch_texts).await?;
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_embed_in_batches_preserves_order_and_count() {
        let texts: Vec<String> = (0..10).map(|i| format!("text {}", i)).collect();
        let embeddings = embed_in_batches(&FixedEmbedder, texts, 3).await.unwrap();
        assert_eq!(embeddings.len(), 10);
        assert!(embeddings.iter().all(|v| v.len() == 4));
    }
}
