//! Token-based text chunking
//!
//! Splits document text into overlapping, token-bounded spans. Sizes and
//! overlaps are measured in tokens (the unit shared with the embedding
//! model), not characters. Chunk text is sliced from the source by byte
//! range, so spelling and intra-span whitespace survive verbatim.

use crate::config::ChunkConfig;
use crate::error::{Error, Result};
use blake3::Hasher;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

/// A text chunk with provenance metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content
    pub text: String,

    /// Offset of the first token within the document's token stream
    pub token_start: usize,

    /// Number of tokens covered by this chunk
    pub token_count: usize,

    /// Chunk index (0-based)
    pub index: usize,

    /// Blake3 hash of the chunk text
    pub hash: String,
}

impl TextChunk {
    /// Compute the hash for a chunk of the given document
    pub fn compute_hash(text: &str, document_id: &str) -> String {
        let mut hasher = Hasher::new();
        hasher.update(document_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Stable vector-store point ID, derived from document and content.
    ///
    /// Re-indexing unchanged content yields the same IDs, so an insert after
    /// delete is a true replacement rather than an accumulation.
    pub fn point_id(&self, document_id: &str) -> Uuid {
        let seed = format!("{}:{}:{}", document_id, self.index, self.hash);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
    }
}

/// Tokenize text into word-bound segments with byte offsets.
///
/// Whitespace-only segments are skipped; they are not tokens, merely the
/// gaps between them.
fn tokenize(text: &str) -> Vec<(usize, &str)> {
    text.split_word_bound_indices()
        .filter(|(_, s)| !s.trim().is_empty())
        .collect()
}

/// Count the tokens the chunker would see in `text`
pub fn count_tokens(text: &str) -> usize {
    tokenize(text).len()
}

/// Split text into overlapping token-bounded chunks.
///
/// Consecutive chunks share `overlap_tokens` tokens; dropping each chunk's
/// overlap prefix (except the first chunk's) and concatenating reconstructs
/// the original token stream. Empty or whitespace-only input yields no
/// chunks. Rejects configurations where the slider could not advance.
pub fn chunk_by_tokens(text: &str, document_id: &str, config: &ChunkConfig) -> Result<Vec<TextChunk>> {
    if config.max_tokens == 0 {
        return Err(Error::Config("max_tokens must be positive".to_string()));
    }
    if config.overlap_tokens >= config.max_tokens {
        return Err(Error::Config(format!(
            "overlap_tokens ({}) must be < max_tokens ({})",
            config.overlap_tokens, config.max_tokens
        )));
    }

    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let advance = config.max_tokens - config.overlap_tokens;
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut index = 0;

    loop {
        let end = std::cmp::min(start + config.max_tokens, tokens.len());

        let byte_start = tokens[start].0;
        let byte_end = tokens[end - 1].0 + tokens[end - 1].1.len();
        let chunk_text = text[byte_start..byte_end].to_string();
        let hash = TextChunk::compute_hash(&chunk_text, document_id);

        chunks.push(TextChunk {
            text: chunk_text,
            token_start: start,
            token_count: end - start,
            index,
            hash,
        });

        if end == tokens.len() {
            break;
        }
        start += advance;
        index += 1;
    }

    Ok(chunks)
}

/// Compute a stable hash for a string
pub fn compute_text_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}
