//! Text-generation capability.
//!
//! Local GGUF inference via llama.cpp and an OpenAI-compatible HTTP
//! provider share one trait; the advisor only sees `dyn LLMProvider`.

pub mod external;
pub mod llamacpp;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use external::ExternalProvider;
pub use llamacpp::LlamaCppProvider;

/// Core trait for generation providers.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    /// Provider metadata for logging and diagnostics.
    fn info(&self) -> ProviderInfo;

    /// Whether the provider can serve requests.
    async fn is_ready(&self) -> bool {
        true
    }
}

/// Decoding parameters for one generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    /// 0.0 selects greedy (deterministic) decoding.
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    pub stop_sequences: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            stop_sequences: Vec::new(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub context_window: usize,
    pub is_local: bool,
}

/// Provider for generation-disabled runs: every call fails, and the
/// advisor's containment turns that into an error-tagged advice text.
pub struct NullProvider;

#[async_trait]
impl LLMProvider for NullProvider {
    async fn generate(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String> {
        Err(anyhow!("LLM is disabled or not initialized"))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "disabled".to_string(),
            model: String::new(),
            context_window: 0,
            is_local: true,
        }
    }

    async fn is_ready(&self) -> bool {
        false
    }
}

/// Truncate generated text at the first occurrence of any stop sequence.
/// Providers that cannot stop server-side apply this client-side so both
/// paths honor the same contract.
pub(crate) fn apply_stop_sequences(text: &str, stop_sequences: &[String]) -> String {
    let mut cut = text.len();
    for seq in stop_sequences {
        if seq.is_empty() {
            continue;
        }
        if let Some(pos) = text.find(seq.as_str()) {
            cut = cut.min(pos);
        }
    }
    text[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_sequences_cut_at_earliest_match() {
        let text = "совет один\n\nАнализ переписки: ...";
        let stops = vec!["Анализ переписки:".to_string(), "\n\n".to_string()];
        assert_eq!(apply_stop_sequences(text, &stops), "совет один");
    }

    #[test]
    fn text_without_stops_is_unchanged() {
        let stops = vec!["###".to_string()];
        assert_eq!(apply_stop_sequences("совет", &stops), "совет");
    }

    #[tokio::test]
    async fn null_provider_always_errors() {
        let provider = NullProvider;
        assert!(!provider.is_ready().await);
        assert!(provider
            .generate("привет", &GenerationConfig::default())
            .await
            .is_err());
    }
}
