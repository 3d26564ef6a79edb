pub mod sentiment;

use anyhow::Result;

pub use sentiment::{OnnxSentimentClassifier, SentimentModelConfig};

/// Multi-class sentiment/emotion classification capability.
///
/// Implementations must be safe for concurrent invocation; models that are
/// not thread-safe internally serialize calls behind a single dispatch
/// point (see `OnnxSentimentClassifier`).
pub trait SentimentClassifier: Send + Sync {
    /// Score one text. Returns (label, score) pairs in model label order;
    /// callers fold arbitrary labels onto the recognized classes.
    fn classify(&self, text: &str) -> Result<Vec<(String, f32)>>;

    /// Score a batch of texts. The default forwards to `classify`;
    /// model-backed implementations override this with true batching.
    fn classify_batch(&self, texts: &[&str]) -> Result<Vec<Vec<(String, f32)>>> {
        texts.iter().map(|t| self.classify(t)).collect()
    }
}
