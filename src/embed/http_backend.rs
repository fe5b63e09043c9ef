//! OpenAI-compatible HTTP embedding backend
//!
//! Talks to any server exposing `POST /v1/embeddings` with the usual
//! `{"model": .., "input": [..]}` request shape. Useful when embeddings run
//! in a separate process (Ollama, vLLM, llama.cpp server, hosted APIs).

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP embedder against an OpenAI-compatible endpoint
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let endpoint = format!("{}/v1/embeddings", config.http_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model_name: config.model.clone(),
            dimension: config.dimension,
        })
    }

    fn validate_dimensions(&self, embeddings: &[Vec<f32>]) -> Result<()> {
        if let Some(mismatch) = embeddings.iter().find(|vec| vec.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_name,
                self.dimension,
                mismatch.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts via {}", texts.len(), self.endpoint);

        let request = EmbeddingsRequest {
            model: &self.model_name,
            input: &texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Embedding backend returned {}: {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingsResponse = response.json().await?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Embedding backend returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        // The API is allowed to reorder; the index field is authoritative
        parsed.data.sort_by_key(|item| item.index);
        let embeddings: Vec<Vec<f32>> = parsed.data.into_iter().map(|i| i.embedding).collect();

        self.validate_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
