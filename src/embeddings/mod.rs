// Embeddings module
// Word-window chunking and the HTTP client for the embedding service.

pub mod chunking;
pub mod client;

pub use chunking::{Chunk, ChunkingConfig, chunk_key, chunk_text};
pub use client::EmbeddingClient;
