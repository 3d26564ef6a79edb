//! Nearest-neighbor retrieval of knowledge items for a free-text query.

use anyhow::Result;
use std::sync::Arc;

use super::cache::CachedIndex;
use crate::embeddings::EmbeddingModel;
use crate::types::KnowledgeItem;

pub struct RetrievalEngine {
    cached: CachedIndex,
    items: Vec<KnowledgeItem>,
    embedder: Arc<dyn EmbeddingModel>,
}

impl RetrievalEngine {
    /// `items` must be the knowledge base the index was built from; the
    /// parallel-structure invariant is checked once here.
    pub fn new(
        cached: CachedIndex,
        items: Vec<KnowledgeItem>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Result<Self> {
        anyhow::ensure!(
            cached.index.len() == items.len() && cached.texts.len() == items.len(),
            "Index ({}), texts ({}) and knowledge base ({}) must be parallel",
            cached.index.len(),
            cached.texts.len(),
            items.len()
        );
        Ok(Self {
            cached,
            items,
            embedder,
        })
    }

    pub fn index_size(&self) -> usize {
        self.cached.index.len()
    }

    pub fn content_hash(&self) -> &str {
        &self.cached.content_hash
    }

    /// Top-k knowledge items for the query, ascending by vector distance.
    /// The query goes through the same embedding capability and
    /// normalization as the indexed passages.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeItem>> {
        if self.cached.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query)?;
        let hits = self.cached.index.search(&query_vector, top_k);

        tracing::debug!(
            query_len = query.len(),
            hits = hits.len(),
            "Retrieved knowledge items"
        );

        Ok(hits
            .into_iter()
            .filter_map(|(i, _)| self.items.get(i).cloned())
            .collect())
    }
}
