// LanceDB vector database module
// Handles vector storage and similarity search for chunk embeddings


pub mod vector_store;

pub use vector_store::ChunkCollection;

use crate::chunks::ChunkType;
use crate::metadata::Metadata;

/// A chunk row written to the collection
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Unique identifier for this row
    pub id: String,
    /// The embedding of the chunk's content or image surrogate
    pub vector: Vec<f32>,
    /// Stored document text; absent for image chunks without content
    pub document: Option<String>,
    /// Identifier of the document the chunk belongs to
    pub doc_id: String,
    pub chunk_type: ChunkType,
    /// Page number, -1 when unknown
    pub page: i64,
    /// Content hash of the source file, used for duplicate detection
    pub file_hash: Option<String>,
    /// Image reference for image chunks
    pub image_uri: Option<String>,
    /// Cleaned metadata, stored as JSON
    pub metadata: Metadata,
    pub created_at: String,
}

/// A row returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHit {
    pub id: String,
    pub document: Option<String>,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Quote a string as a SQL literal for LanceDB filter predicates
#[inline]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
