// Vector index module
// Pluggable storage backends for chunk embeddings: a local LanceDB table, a
// remote HTTP vector service, and an in-memory index for tests and backend
// comparison.

#[cfg(test)]
mod tests;

pub mod http;
pub mod lance;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::embeddings::chunking::chunk_key;

pub use http::HttpVectorIndex;
pub use lance::LanceVectorIndex;
pub use memory::InMemoryVectorIndex;

/// Stored chunk text is capped so metadata stays small; the full document
/// lives in the object store.
pub const METADATA_TEXT_LIMIT: usize = 500;

/// Upper bound on chunks per document, used when deleting by generated keys.
pub const MAX_CHUNKS_PER_DOCUMENT: usize = 1000;

/// Metadata stored alongside each chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Document this chunk came from
    pub source_id: String,
    /// Object store key of the full document
    pub object_key: String,
    /// Meeting title
    pub title: String,
    /// Primary speaker of the meeting, empty when no real name was found
    #[serde(default)]
    pub speaker: String,
    /// Chunk text, capped at [`METADATA_TEXT_LIMIT`] characters
    pub text: String,
    /// Position of the chunk within the document
    pub chunk_index: u32,
    /// RFC 3339 timestamp of when the vector was written
    pub created_at: String,
}

impl ChunkMetadata {
    /// Cap the stored text at the metadata limit, respecting char boundaries.
    #[inline]
    pub fn truncate_text(&mut self) {
        if self.text.len() > METADATA_TEXT_LIMIT {
            let mut end = METADATA_TEXT_LIMIT;
            while !self.text.is_char_boundary(end) {
                end -= 1;
            }
            self.text.truncate(end);
        }
    }
}

/// One vector plus its metadata, keyed by `{source_id}_chunk_{index:04}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub key: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A query match. `score` is descending-better; backends that report
/// distances or nothing at all normalize into this field.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub key: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// One page of a key listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Opaque cursor for the next page; `None` when the listing is complete.
    pub next_cursor: Option<String>,
}

/// Positional score for backends that return ranked results without a
/// native similarity: 1.0 for the top hit, decreasing by 0.05 per rank,
/// floored at zero.
#[inline]
pub fn synthetic_score(rank: usize) -> f32 {
    (1.0 - rank as f32 * 0.05).max(0.0)
}

/// Storage backend for chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by key.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Return up to `top_k` nearest records, best first, optionally limited
    /// to one source document.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<VectorHit>>;

    /// Page through every key in the index.
    async fn list_keys(&self, page_size: usize, cursor: Option<String>) -> Result<ListPage>;

    /// Fetch full records by key; missing keys are skipped.
    async fn fetch(&self, keys: &[String]) -> Result<Vec<VectorRecord>>;

    /// Remove records by key; absent keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Total number of stored vectors.
    async fn count(&self) -> Result<u64>;

    /// Remove every chunk of one document.
    ///
    /// The default deletes by generated chunk keys, bounded by
    /// [`MAX_CHUNKS_PER_DOCUMENT`]; backends with predicate deletes
    /// override this.
    async fn delete_document(&self, source_id: &str) -> Result<()> {
        let keys: Vec<String> = (0..MAX_CHUNKS_PER_DOCUMENT)
            .map(|i| chunk_key(source_id, i))
            .collect();
        self.delete(&keys).await
    }
}
