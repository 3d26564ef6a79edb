//! Advice generation with failure containment.

use std::sync::Arc;

use crate::config::AdviceConfig;
use crate::llm::{GenerationConfig, LLMProvider};
use crate::types::{AdviceResult, AnalysisReport, KnowledgeItem};

use super::prompt::build_advice_prompt;

pub struct AdviceGenerator {
    llm: Arc<dyn LLMProvider>,
    config: AdviceConfig,
}

impl AdviceGenerator {
    pub fn new(llm: Arc<dyn LLMProvider>, config: AdviceConfig) -> Self {
        Self { llm, config }
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            stop_sequences: self.config.stop_sequences.clone(),
            seed: None,
        }
    }

    /// Generate the advisory text. Provider failures never propagate past
    /// this boundary: the result carries an error-tagged text instead.
    pub async fn generate(
        &self,
        report: &AnalysisReport,
        facts: &[KnowledgeItem],
    ) -> AdviceResult {
        let prompt = build_advice_prompt(report, facts);
        match self.llm.generate(&prompt, &self.generation_config()).await {
            Ok(text) => AdviceResult {
                text: text.trim().to_string(),
            },
            Err(e) => {
                tracing::error!(error = %e, "Advice generation failed");
                AdviceResult {
                    text: format!("Ошибка генерации: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::profile::assemble_report;
    use crate::llm::{NullProvider, ProviderInfo};
    use anyhow::Result;
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn generate(&self, _prompt: &str, config: &GenerationConfig) -> Result<String> {
            assert_eq!(config.max_tokens, 256);
            assert!(config
                .stop_sequences
                .iter()
                .any(|s| s == "Анализ переписки:"));
            Ok("  1. Говорите прямо.\n2. Слушайте.  ".to_string())
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "echo".to_string(),
                model: "echo".to_string(),
                context_window: 2048,
                is_local: true,
            }
        }
    }

    fn report() -> AnalysisReport {
        assemble_report("d".to_string(), None, Vec::new(), Vec::new())
    }

    #[tokio::test]
    async fn successful_generation_is_trimmed() {
        let generator = AdviceGenerator::new(Arc::new(EchoProvider), AdviceConfig::default());
        let advice = generator.generate(&report(), &[]).await;
        assert!(!advice.is_error());
        assert_eq!(advice.text, "1. Говорите прямо.\n2. Слушайте.");
    }

    #[tokio::test]
    async fn provider_failure_is_contained() {
        let generator = AdviceGenerator::new(Arc::new(NullProvider), AdviceConfig::default());
        let advice = generator.generate(&report(), &[]).await;
        assert!(advice.is_error());
        assert!(advice.text.starts_with("Ошибка генерации:"));
    }
}
