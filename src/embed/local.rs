//! In-process embedding backend
//!
//! Loads an ONNX model through fastembed and serializes inference behind a
//! mutex. Only models from the supported table can be loaded; for anything
//! else, point the `http` backend at a server that hosts the model.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Models the local backend can load, with their output dimensions.
/// Must stay in step with [`resolve_model`].
const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("BAAI/bge-small-en-v1.5", 384),
    ("BAAI/bge-base-en-v1.5", 768),
    ("BAAI/bge-large-en-v1.5", 1024),
    ("sentence-transformers/all-MiniLM-L6-v2", 384),
];

fn resolve_model(model_name: &str) -> Option<EmbeddingModel> {
    match model_name {
        "BAAI/bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-large-en-v1.5" => Some(EmbeddingModel::BGELargeENV15),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        _ => None,
    }
}

/// Dimension a supported model produces, `None` for unsupported names
pub fn known_model_dimension(model_name: &str) -> Option<usize> {
    SUPPORTED_MODELS
        .iter()
        .find(|(name, _)| *name == model_name)
        .map(|(_, dimension)| *dimension)
}

/// Local embedder over fastembed
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl LocalEmbedder {
    /// Validate the config against the supported-model table, then load the
    /// model. Both error cases fire before any download starts.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_enum = resolve_model(&config.model).ok_or_else(|| {
            let supported: Vec<&str> = SUPPORTED_MODELS.iter().map(|(name, _)| *name).collect();
            Error::Config(format!(
                "Model '{}' cannot be loaded locally (supported: {}); \
                 use the http backend for other models",
                config.model,
                supported.join(", ")
            ))
        })?;

        let dimension = known_model_dimension(&config.model).unwrap_or(config.dimension);
        if config.dimension != dimension {
            return Err(Error::Config(format!(
                "embedding.dimension is {} but model '{}' produces {}-dimensional vectors",
                config.dimension, config.model, dimension
            )));
        }

        info!("Loading local embedding model {}", config.model);
        let model =
            TextEmbedding::try_new(InitOptions::new(model_enum).with_show_download_progress(true))
                .map_err(|e| {
                    Error::Embedding(format!("Could not load model '{}': {}", config.model, e))
                })?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: config.model.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Inference is CPU-bound and blocking; run it on the blocking pool,
        // one batch at a time through the model mutex
        let model = Arc::clone(&self.model);
        let vectors = tokio::task::spawn_blocking(move || model.blocking_lock().embed(texts, None))
            .await
            .map_err(|e| Error::Embedding(format!("Inference task failed: {}", e)))?
            .map_err(|e| Error::Embedding(format!("Inference failed: {}", e)))?;

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
