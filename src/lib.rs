use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(
        "Batch length mismatch: {ids} ids, {documents} documents, {embeddings} embeddings, {metadatas} metadatas"
    )]
    BatchMismatch {
        ids: usize,
        documents: usize,
        embeddings: usize,
        metadatas: usize,
    },

    #[error("Duplicate chunk id in batch: {0}")]
    DuplicateId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunks;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod index;
pub mod metadata;

pub use chunks::{Chunk, ChunkType, split_oversized_chunks};
pub use embeddings::{Embedder, OllamaClient};
pub use index::{DocumentIndex, QueryRequest, QueryResult, compute_file_hash};
pub use metadata::{Metadata, MetadataScalar, MetadataValue, clean_metadata};
