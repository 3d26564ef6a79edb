//! Content-hash gated persistence of the knowledge index.
//!
//! Three artifacts per knowledge-base basename: the binary vector index,
//! a JSON array of the parallel embedding-input texts, and a plain-text
//! md5 digest of the backing file. All three must exist and agree for a
//! cache hit; anything else (including corruption) means a full rebuild.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::base::KnowledgeBase;
use super::index::FlatIndex;
use crate::embeddings::EmbeddingModel;

/// A loaded-or-built index together with its parallel texts and the hash
/// of the knowledge base it was built from.
#[derive(Debug, Clone)]
pub struct CachedIndex {
    pub index: FlatIndex,
    pub texts: Vec<String>,
    pub content_hash: String,
}

pub struct IndexCache {
    cache_dir: PathBuf,
}

impl IndexCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn artifact_paths(&self, cache_key: &str) -> (PathBuf, PathBuf, PathBuf) {
        (
            self.cache_dir.join(format!("{}.index", cache_key)),
            self.cache_dir.join(format!("{}_texts.json", cache_key)),
            self.cache_dir.join(format!("{}.hash", cache_key)),
        )
    }

    /// Return a valid index for the knowledge base, loading the persisted
    /// one when its stored hash matches the current file content and
    /// rebuilding (and overwriting all three artifacts) otherwise.
    ///
    /// Identical content never re-embeds; any content change triggers
    /// exactly one rebuild before the next query.
    pub fn load_or_build(
        &self,
        kb: &KnowledgeBase,
        embedder: &dyn EmbeddingModel,
    ) -> Result<CachedIndex> {
        let current_hash = compute_file_hash(kb.path())?;

        if let Some(cached) = self.try_load(&kb.cache_key(), &current_hash, kb.len()) {
            tracing::info!(
                key = %kb.cache_key(),
                vectors = cached.index.len(),
                "Loaded cached knowledge index"
            );
            return Ok(cached);
        }

        tracing::info!(key = %kb.cache_key(), "Cache missing or stale, building knowledge index");
        self.build_and_persist(kb, embedder, current_hash)
    }

    /// Load the three artifacts if they are all present and consistent.
    /// Any failure is a cache miss, never an error.
    fn try_load(&self, cache_key: &str, current_hash: &str, kb_len: usize) -> Option<CachedIndex> {
        let (index_path, texts_path, hash_path) = self.artifact_paths(cache_key);
        if !index_path.exists() || !texts_path.exists() || !hash_path.exists() {
            return None;
        }

        let stored_hash = std::fs::read_to_string(&hash_path).ok()?.trim().to_string();
        if stored_hash != current_hash {
            tracing::info!(key = %cache_key, "Knowledge base changed, cache is stale");
            return None;
        }

        let index = match FlatIndex::read_from(&index_path) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(key = %cache_key, error = %e, "Cached index unreadable, rebuilding");
                return None;
            }
        };
        let texts: Vec<String> = std::fs::read_to_string(&texts_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())?;

        // Parallel-structure invariant: vectors, texts and knowledge items
        // must agree before the index may serve queries.
        if index.len() != texts.len() || index.len() != kb_len {
            tracing::warn!(
                key = %cache_key,
                vectors = index.len(),
                texts = texts.len(),
                items = kb_len,
                "Cache artifacts inconsistent, rebuilding"
            );
            return None;
        }

        Some(CachedIndex {
            index,
            texts,
            content_hash: stored_hash,
        })
    }

    fn build_and_persist(
        &self,
        kb: &KnowledgeBase,
        embedder: &dyn EmbeddingModel,
        content_hash: String,
    ) -> Result<CachedIndex> {
        let texts = kb.embedding_texts();
        let refs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
        let vectors = embedder
            .embed_documents(&refs)
            .context("Failed to embed knowledge base")?;
        let index = FlatIndex::from_vectors(vectors)?;

        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Failed to create cache dir: {}", self.cache_dir.display()))?;
        let (index_path, texts_path, hash_path) = self.artifact_paths(&kb.cache_key());
        index.write_to(&index_path)?;
        std::fs::write(&texts_path, serde_json::to_string(&texts)?)
            .with_context(|| format!("Failed to write {}", texts_path.display()))?;
        std::fs::write(&hash_path, &content_hash)
            .with_context(|| format!("Failed to write {}", hash_path.display()))?;

        tracing::info!(
            key = %kb.cache_key(),
            vectors = index.len(),
            "Knowledge index built and persisted"
        );

        Ok(CachedIndex {
            index,
            texts,
            content_hash,
        })
    }
}

/// md5 digest over the full file bytes, hex-encoded.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read for hashing: {}", path.display()))?;
    Ok(format!("{:x}", md5::compute(&bytes)))
}
