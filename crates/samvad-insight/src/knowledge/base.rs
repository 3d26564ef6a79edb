//! The external, versioned knowledge base. Read-only to the pipeline.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::types::KnowledgeItem;

pub struct KnowledgeBase {
    path: PathBuf,
    items: Vec<KnowledgeItem>,
}

impl KnowledgeBase {
    /// Load a knowledge base from its JSON file (an array of
    /// content/source/keywords items). Unreadable input is fatal for the
    /// run.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge base: {}", path.display()))?;
        let items: Vec<KnowledgeItem> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse knowledge base: {}", path.display()))?;

        tracing::info!(path = %path.display(), items = items.len(), "Knowledge base loaded");

        Ok(Self {
            path: path.to_path_buf(),
            items,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename used to key the cache artifacts.
    pub fn cache_key(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "knowledge".to_string())
    }

    pub fn items(&self) -> &[KnowledgeItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Embedding input strings, parallel to `items()`.
    pub fn embedding_texts(&self) -> Vec<String> {
        self.items.iter().map(|item| item.embedding_text()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_items_and_derives_cache_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"content":"а","source":"s","keywords":["к"]}},{{"content":"б","source":"t","keywords":[]}}]"#
        )
        .unwrap();

        let kb = KnowledgeBase::load(&path).unwrap();
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.cache_key(), "kb");
        assert_eq!(kb.embedding_texts()[0], "к а");
        assert_eq!(kb.embedding_texts()[1], " б");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(KnowledgeBase::load(Path::new("/nonexistent/kb.json")).is_err());
    }
}
