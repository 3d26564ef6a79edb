//! Topic aggregation over a whole dialog.
//!
//! The inference algorithm is a boundary: the engine only requires short
//! topic labels, a count-descending dialog-level list and per-participant
//! interests. Two implementations are provided — a deterministic lexicon
//! counter and an LLM-backed extractor.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::TopicConfig;
use crate::llm::{GenerationConfig, LLMProvider};
use crate::types::{Message, TopicInterests, TopicStat};

/// Dialog-level topic output plus per-participant interests.
#[derive(Debug, Clone, Default)]
pub struct TopicSummary {
    /// Sorted descending by count; label-ascending on ties so repeated
    /// runs produce identical output.
    pub dominant_topics: Vec<TopicStat>,
    pub participant_interests: HashMap<String, TopicInterests>,
}

#[async_trait]
pub trait TopicModel: Send + Sync {
    async fn extract(
        &self,
        messages: &[Message],
        participants: &[String],
    ) -> Result<TopicSummary>;
}

/// Counts topic-lexicon hits per message. A topic counts once per message
/// containing any of its keywords, so topics may overlap and percentages
/// need not sum to 100.
pub struct LexiconTopicModel {
    config: TopicConfig,
}

impl LexiconTopicModel {
    pub fn new(config: TopicConfig) -> Self {
        Self { config }
    }

    fn count_topics(&self, messages: &[&Message]) -> Vec<(String, usize)> {
        let lowered: Vec<String> = messages.iter().map(|m| m.text.to_lowercase()).collect();
        self.config
            .lexicons
            .iter()
            .map(|lexicon| {
                let count = lowered
                    .iter()
                    .filter(|text| {
                        lexicon
                            .keywords
                            .iter()
                            .any(|keyword| text.contains(keyword.to_lowercase().as_str()))
                    })
                    .count();
                (lexicon.label.clone(), count)
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    fn to_stats(&self, mut counts: Vec<(String, usize)>, analyzed: usize) -> Vec<TopicStat> {
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(self.config.max_topics);
        counts
            .into_iter()
            .map(|(topic, count)| TopicStat {
                percentage: if analyzed > 0 {
                    round1(count as f32 / analyzed as f32 * 100.0)
                } else {
                    0.0
                },
                topic,
                count,
            })
            .collect()
    }
}

#[async_trait]
impl TopicModel for LexiconTopicModel {
    async fn extract(
        &self,
        messages: &[Message],
        participants: &[String],
    ) -> Result<TopicSummary> {
        let analyzed: Vec<&Message> = messages.iter().filter(|m| !m.text.is_empty()).collect();
        let dominant_topics = self.to_stats(self.count_topics(&analyzed), analyzed.len());

        let mut participant_interests = HashMap::new();
        for participant in participants {
            let own: Vec<&Message> = analyzed
                .iter()
                .copied()
                .filter(|m| &m.sender == participant)
                .collect();
            let stats = self.to_stats(self.count_topics(&own), own.len());
            participant_interests.insert(
                participant.clone(),
                TopicInterests {
                    main_interest: stats.first().map(|s| s.topic.clone()),
                    ranked: stats.into_iter().map(|s| s.topic).collect(),
                },
            );
        }

        Ok(TopicSummary {
            dominant_topics,
            participant_interests,
        })
    }
}

/// Derives topic labels by asking a generative model for a short keyword
/// summary of the dialog, then grounds counts/percentages by re-counting
/// the labels over the actual messages.
pub struct LlmTopicModel {
    llm: Arc<dyn LLMProvider>,
    max_topics: usize,
}

impl LlmTopicModel {
    pub fn new(llm: Arc<dyn LLMProvider>, max_topics: usize) -> Self {
        Self { llm, max_topics }
    }

    fn dialog_text(messages: &[Message]) -> String {
        messages
            .iter()
            .filter(|m| !m.text.is_empty())
            .map(|m| format!("{}: {}", m.sender, m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn parse_labels(&self, raw: &str) -> Vec<String> {
        let mut labels = Vec::new();
        for token in raw.split([',', '\n', ';']) {
            let label = token
                .trim()
                .trim_matches(|c: char| c == '.' || c == '-' || c == '•')
                .trim()
                .to_lowercase();
            if !label.is_empty() && !labels.contains(&label) {
                labels.push(label);
            }
            if labels.len() == self.max_topics {
                break;
            }
        }
        labels
    }
}

#[async_trait]
impl TopicModel for LlmTopicModel {
    async fn extract(
        &self,
        messages: &[Message],
        participants: &[String],
    ) -> Result<TopicSummary> {
        let dialog = Self::dialog_text(messages);
        if dialog.trim().is_empty() {
            return Ok(TopicSummary::default());
        }

        let prompt = format!(
            "Выдели до {} ключевых тем следующего диалога. \
             Ответь только списком коротких тем через запятую, без пояснений.\n\n\
             Диалог:\n{}\n\nТемы:",
            self.max_topics, dialog
        );
        // Deterministic decoding: topic labels must be reproducible.
        let config = GenerationConfig {
            max_tokens: 64,
            temperature: 0.0,
            stop_sequences: vec!["\n\n".to_string()],
            ..GenerationConfig::default()
        };
        let raw = self.llm.generate(&prompt, &config).await?;
        let labels = self.parse_labels(&raw);
        if labels.is_empty() {
            return Err(anyhow!("Topic model produced no labels"));
        }

        // Ground the labels: count each one over the actual messages so
        // the count/percentage contract holds regardless of model output.
        let lexicons = TopicConfig {
            lexicons: labels
                .iter()
                .map(|label| crate::config::TopicLexicon {
                    label: label.clone(),
                    keywords: vec![label.clone()],
                })
                .collect(),
            max_topics: self.max_topics,
        };
        LexiconTopicModel::new(lexicons)
            .extract(messages, participants)
            .await
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
