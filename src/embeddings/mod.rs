// Embeddings module
// Embedding generation seam and the Ollama client behind it

pub mod ollama;

use anyhow::Result;

pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaClient};

/// Turns text into embedding vectors
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input order
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text
    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding service returned no vector for query"))
    }
}
