//! Per-participant emotion scoring with robust aggregation.

use anyhow::Result;
use std::sync::Arc;

use crate::inference::SentimentClassifier;
use crate::processing::clean_text;
use crate::types::{round3, EmotionClass, EmotionScores, Message, ScoredMessage};

/// Emotion analysis result for one participant.
#[derive(Debug, Clone)]
pub struct EmotionSummary {
    pub messages_count: usize,
    pub emotions_median: EmotionScores,
    pub dominant_emotion: Option<EmotionClass>,
    /// Cleaned texts that were actually scored, in message order. Style
    /// scoring and topic aggregation reuse the raw originals instead.
    pub messages: Vec<ScoredMessage>,
}

impl EmotionSummary {
    /// Stub for a participant with no scorable messages: zeroed
    /// distribution, no dominant emotion.
    pub fn empty() -> Self {
        Self {
            messages_count: 0,
            emotions_median: EmotionScores::default(),
            dominant_emotion: None,
            messages: Vec::new(),
        }
    }
}

pub struct EmotionScorer {
    classifier: Arc<dyn SentimentClassifier>,
    batch_size: usize,
}

impl EmotionScorer {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, batch_size: usize) -> Self {
        Self {
            classifier,
            batch_size: batch_size.max(1),
        }
    }

    /// Score all of a participant's messages and aggregate per-class
    /// medians. Messages that clean down to nothing are skipped; zero
    /// scorable messages yield the stub summary.
    pub fn score_participant(&self, messages: &[Message]) -> Result<EmotionSummary> {
        let mut kept: Vec<(&Message, String)> = Vec::new();
        for message in messages {
            let cleaned = clean_text(&message.text);
            if !cleaned.is_empty() {
                kept.push((message, cleaned));
            }
        }

        if kept.is_empty() {
            return Ok(EmotionSummary::empty());
        }

        let mut scored = Vec::with_capacity(kept.len());
        for chunk in kept.chunks(self.batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|(_, c)| c.as_str()).collect();
            let batch_scores = self.classifier.classify_batch(&texts)?;
            for ((message, _), labels) in chunk.iter().zip(batch_scores) {
                scored.push(ScoredMessage {
                    text: message.text.clone(),
                    time: message.time.clone(),
                    emotion_scores: fold_labels(&labels),
                });
            }
        }

        let mut per_class: [Vec<f32>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for message in &scored {
            for (slot, class) in per_class.iter_mut().zip(EmotionClass::ALL) {
                slot.push(message.emotion_scores.get(class));
            }
        }

        let mut medians = EmotionScores::default();
        for (slot, class) in per_class.iter_mut().zip(EmotionClass::ALL) {
            medians.set(class, round3(median(slot)));
        }

        Ok(EmotionSummary {
            messages_count: scored.len(),
            dominant_emotion: Some(dominant_emotion(&medians)),
            emotions_median: medians,
            messages: scored,
        })
    }
}

/// Fold arbitrary classifier labels onto the three recognized classes.
/// Unrecognized labels are dropped; missing classes stay at 0.0.
pub fn fold_labels(labels: &[(String, f32)]) -> EmotionScores {
    let mut scores = EmotionScores::default();
    for (label, score) in labels {
        if let Some(class) = EmotionClass::from_label(label) {
            scores.set(class, round3(*score));
        }
    }
    scores
}

/// Median with exact midpoint averaging for even counts. The slice is
/// sorted in place.
fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

/// Rank the classes descending (stable: negative/neutral/positive on
/// ties). A strictly-leading "neutral" is deliberately passed over in
/// favor of the runner-up; on a tie the top class stands.
pub fn dominant_emotion(medians: &EmotionScores) -> EmotionClass {
    let ranked = medians.ranked();
    if ranked[0].0 == EmotionClass::Neutral && ranked[0].1 > ranked[1].1 {
        ranked[1].0
    } else {
        ranked[0].0
    }
}
