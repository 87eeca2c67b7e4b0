
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{MeetsearchError, Result};

/// A window of consecutive words ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position of this chunk within the document
    pub index: usize,
    /// The chunk text with whitespace normalized to single spaces
    pub text: String,
}

/// Configuration for word-window chunking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in words
    pub chunk_size: usize,
    /// Words shared between adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

/// Split text into overlapping word windows.
///
/// Each window holds `chunk_size` words and shares `overlap` words with its
/// predecessor. The window that reaches the final word ends the sequence, so
/// no chunk consists solely of overlap carried over from the previous one.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if config.overlap >= config.chunk_size {
        return Err(MeetsearchError::Config(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            config.overlap, config.chunk_size
        )));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = usize::min(start + config.chunk_size, words.len());
        chunks.push(Chunk {
            index: chunks.len(),
            text: words[start..end].join(" "),
        });

        if end == words.len() {
            break;
        }
        start = end - config.overlap;
    }

    debug!(
        "Chunked {} words into {} windows (size {}, overlap {})",
        words.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    Ok(chunks)
}

/// Vector key for one chunk of a document. The index is zero-padded so keys
/// for the same document sort in chunk order.
#[inline]
pub fn chunk_key(source_id: &str, index: usize) -> String {
    format!("{source_id}_chunk_{index:04}")
}
