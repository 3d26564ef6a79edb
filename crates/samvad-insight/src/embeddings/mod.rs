pub mod e5;

use anyhow::Result;

pub use e5::{E5Config, E5Embeddings};

/// Text embedding capability used for both index building and queries.
///
/// Queries and documents must go through the same implementation and the
/// same normalization — mismatched normalization silently degrades ranking
/// quality without erroring.
pub trait EmbeddingModel: Send + Sync {
    /// Embed a retrieval query (with the prefix the model expects).
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a knowledge passage.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed passages for index building.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_document(t)).collect()
    }

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;
}
