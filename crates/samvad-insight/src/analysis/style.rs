//! Four-trait communication-style heuristic.
//!
//! Lexicon presence, punctuation and an optional emotion bias feed four
//! trait buckets; the dominant trait is the argmax with an explicit
//! D > I > S > C tie-break.

use crate::config::StyleConfig;
use crate::types::{EmotionScores, StyleBreakdown, StyleTrait, TraitScores};

pub struct StyleClassifier {
    config: StyleConfig,
}

impl StyleClassifier {
    pub fn new(config: StyleConfig) -> Self {
        Self { config }
    }

    /// Score a single raw message. Style scoring deliberately runs over
    /// uncleaned text: the emoji and punctuation the rules depend on do
    /// not survive the cleaner.
    pub fn score_message(&self, text: &str) -> TraitScores {
        let lower = text.to_lowercase();
        let mut scores = TraitScores::default();

        let lexicons: [(StyleTrait, &[String]); 4] = [
            (StyleTrait::D, &self.config.d_keywords),
            (StyleTrait::I, &self.config.i_keywords),
            (StyleTrait::S, &self.config.s_keywords),
            (StyleTrait::C, &self.config.c_keywords),
        ];
        for (trait_, keywords) in lexicons {
            for keyword in keywords {
                if lower.contains(keyword.to_lowercase().as_str()) {
                    scores.add(trait_, 2);
                }
            }
        }

        scores.add(StyleTrait::I, lower.matches('!').count() as u32);
        if self
            .config
            .enthusiasm_emoji
            .iter()
            .any(|emoji| text.contains(emoji.as_str()))
        {
            scores.add(StyleTrait::I, 3);
        }
        scores.add(StyleTrait::C, lower.matches('?').count() as u32);

        scores
    }

    /// Score all of a participant's messages and derive the breakdown.
    /// The emotion bias, when a distribution is supplied, is applied once
    /// over the summed totals — it reflects the participant, not any
    /// single message.
    pub fn score_messages(
        &self,
        texts: &[&str],
        emotions: Option<&EmotionScores>,
    ) -> StyleBreakdown {
        let mut totals = TraitScores::default();
        for text in texts {
            totals.merge(&self.score_message(text));
        }
        if let Some(emotions) = emotions {
            self.apply_emotion_bias(&mut totals, emotions);
        }

        StyleBreakdown {
            percentages: totals.percentages(),
            text_dominant: totals.dominant(),
            raw_scores: totals,
        }
    }

    fn apply_emotion_bias(&self, totals: &mut TraitScores, emotions: &EmotionScores) {
        if emotions.positive > self.config.positive_threshold {
            totals.add(StyleTrait::I, 3);
            totals.add(StyleTrait::S, 1);
        }
        if emotions.negative > self.config.negative_threshold {
            totals.add(StyleTrait::D, 2);
        }
        if emotions.neutral > self.config.neutral_threshold {
            totals.add(StyleTrait::C, 2);
            totals.add(StyleTrait::S, 1);
        }
    }
}
