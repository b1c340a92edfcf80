// Database module
// Persistent vector collection backed by LanceDB

pub mod lancedb;

pub use lancedb::{ChunkCollection, ChunkRecord, StoredHit};
