use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeetsearchError>;

#[derive(Error, Debug)]
pub enum MeetsearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Metadata index error: {0}")]
    MetadataIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod compare;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod parser;
pub mod search;
pub mod store;
pub mod vectors;
