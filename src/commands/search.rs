//! Search command implementation

use crate::config::Config;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::store::{VectorFilter, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Number of results; defaults to config
    pub k: Option<usize>,

    /// Restrict to one knowledge base
    pub knowledge_base_id: Option<String>,
}

/// A single search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    pub document_id: String,
    pub document_name: String,
    pub knowledge_base_id: String,
    pub chunk_index: i32,
    pub text: String,
}

/// Embed the query and run a filtered similarity search
pub async fn cmd_search(
    config: &Config,
    embedder: &dyn Embedder,
    store: &dyn VectorIndex,
    owner_id: &str,
    query: &str,
    options: SearchOptions,
) -> Result<Vec<SearchHit>> {
    let k = options
        .k
        .unwrap_or(config.search.default_k)
        .min(config.search.max_results)
        .max(1);

    info!("Searching for '{}' (k={})", query, k);

    let mut embeddings = embedder.embed(vec![query.to_string()]).await?;
    let query_vector = embeddings
        .pop()
        .ok_or_else(|| Error::Embedding("Embedder returned no vector for query".to_string()))?;

    let filter = VectorFilter {
        owner_id: Some(owner_id.to_string()),
        document_id: None,
        knowledge_base_id: options.knowledge_base_id,
    };

    let results = store.search(query_vector, k, &filter).await?;

    Ok(results
        .into_iter()
        .map(|r| SearchHit {
            score: r.score,
            document_id: r.payload.document_id,
            document_name: r.payload.document_name,
            knowledge_base_id: r.payload.knowledge_base_id,
            chunk_index: r.payload.chunk_index,
            text: r.payload.text,
        })
        .collect())
}

/// Print search results to console
pub fn print_search_results(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }

    println!("\n{} result(s):\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            i + 1,
            hit.score,
            hit.document_name,
            hit.chunk_index
        );

        let preview: String = hit.text.chars().take(200).collect();
        let ellipsis = if hit.text.chars().count() > 200 { "…" } else { "" };
        println!("   {}{}\n", preview.replace('\n', " "), ellipsis);
    }
}
