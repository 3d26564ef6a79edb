use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

use crate::error::PipelineError;

/// One message of a recorded conversation. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// A recorded multi-party conversation, produced by the external loader
/// and consumed read-only by the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    #[serde(alias = "dialog_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Dialog {
    /// Load a dialog from a JSON file. Accepts both `id` and `dialog_id`
    /// as the identifier key.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| PipelineError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// The three sentiment classes every classifier output is folded onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionClass {
    Negative,
    Neutral,
    Positive,
}

impl EmotionClass {
    /// Fixed order used for stable ranking and serialization.
    pub const ALL: [EmotionClass; 3] = [
        EmotionClass::Negative,
        EmotionClass::Neutral,
        EmotionClass::Positive,
    ];

    /// Fold an arbitrary model label onto one of the three classes by
    /// case-insensitive substring match ("Neg", "LABEL_negative", …).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        if label.contains("neg") {
            Some(Self::Negative)
        } else if label.contains("neu") {
            Some(Self::Neutral)
        } else if label.contains("pos") {
            Some(Self::Positive)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        }
    }
}

impl fmt::Display for EmotionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability-like score per sentiment class. All three keys are always
/// present; absent classes stay at 0.0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionScores {
    pub negative: f32,
    pub neutral: f32,
    pub positive: f32,
}

impl EmotionScores {
    pub fn get(&self, class: EmotionClass) -> f32 {
        match class {
            EmotionClass::Negative => self.negative,
            EmotionClass::Neutral => self.neutral,
            EmotionClass::Positive => self.positive,
        }
    }

    pub fn set(&mut self, class: EmotionClass, value: f32) {
        match class {
            EmotionClass::Negative => self.negative = value,
            EmotionClass::Neutral => self.neutral = value,
            EmotionClass::Positive => self.positive = value,
        }
    }

    /// Classes ranked descending by score. Ties keep the fixed
    /// negative/neutral/positive order (stable sort), never map order.
    pub fn ranked(&self) -> [(EmotionClass, f32); 3] {
        let mut ranked = [
            (EmotionClass::Negative, self.negative),
            (EmotionClass::Neutral, self.neutral),
            (EmotionClass::Positive, self.positive),
        ];
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// The four communication-style traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StyleTrait {
    D,
    I,
    S,
    C,
}

impl StyleTrait {
    /// Tie-break priority for dominant-style selection. Explicit and
    /// ordered: semantics must never depend on map iteration order.
    pub const PRIORITY: [StyleTrait; 4] =
        [StyleTrait::D, StyleTrait::I, StyleTrait::S, StyleTrait::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::D => "D",
            Self::I => "I",
            Self::S => "S",
            Self::C => "C",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::D => "Решительный, ориентированный на результат",
            Self::I => "Общительный, эмоциональный, вдохновляющий",
            Self::S => "Стабильный, надежный, спокойный",
            Self::C => "Аналитичный, точный, системный",
        }
    }
}

impl fmt::Display for StyleTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw (non-negative) style totals per trait.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraitScores {
    #[serde(rename = "D")]
    pub d: u32,
    #[serde(rename = "I")]
    pub i: u32,
    #[serde(rename = "S")]
    pub s: u32,
    #[serde(rename = "C")]
    pub c: u32,
}

impl TraitScores {
    pub fn get(&self, trait_: StyleTrait) -> u32 {
        match trait_ {
            StyleTrait::D => self.d,
            StyleTrait::I => self.i,
            StyleTrait::S => self.s,
            StyleTrait::C => self.c,
        }
    }

    pub fn add(&mut self, trait_: StyleTrait, points: u32) {
        match trait_ {
            StyleTrait::D => self.d += points,
            StyleTrait::I => self.i += points,
            StyleTrait::S => self.s += points,
            StyleTrait::C => self.c += points,
        }
    }

    pub fn merge(&mut self, other: &TraitScores) {
        self.d += other.d;
        self.i += other.i;
        self.s += other.s;
        self.c += other.c;
    }

    pub fn total(&self) -> u32 {
        self.d + self.i + self.s + self.c
    }

    /// Argmax over the four totals, ties broken by the fixed D > I > S > C
    /// priority. All-zero totals default to S.
    pub fn dominant(&self) -> StyleTrait {
        if self.total() == 0 {
            return StyleTrait::S;
        }
        let mut best = StyleTrait::PRIORITY[0];
        for trait_ in StyleTrait::PRIORITY {
            if self.get(trait_) > self.get(best) {
                best = trait_;
            }
        }
        best
    }

    /// Each trait's share of the total, ×100. All zeros when total is 0.
    pub fn percentages(&self) -> TraitPercentages {
        let total = self.total();
        if total == 0 {
            return TraitPercentages::default();
        }
        let share = |v: u32| (v as f32 / total as f32) * 100.0;
        TraitPercentages {
            d: share(self.d),
            i: share(self.i),
            s: share(self.s),
            c: share(self.c),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TraitPercentages {
    #[serde(rename = "D")]
    pub d: f32,
    #[serde(rename = "I")]
    pub i: f32,
    #[serde(rename = "S")]
    pub s: f32,
    #[serde(rename = "C")]
    pub c: f32,
}

impl TraitPercentages {
    pub fn sum(&self) -> f32 {
        self.d + self.i + self.s + self.c
    }
}

/// Style classification result for one participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleBreakdown {
    pub raw_scores: TraitScores,
    pub percentages: TraitPercentages,
    pub text_dominant: StyleTrait,
}

/// A dialog-level topic with its occurrence count and share of analyzed
/// messages. Topics may overlap, so percentages need not sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicStat {
    pub topic: String,
    pub count: usize,
    pub percentage: f32,
}

/// Topical interests of one participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopicInterests {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_interest: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranked: Vec<String>,
}

/// A message together with its per-message emotion scores. Only emitted
/// when the run is configured to keep per-message detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub emotion_scores: EmotionScores,
}

/// Behavioral profile of a single participant. Built once per analysis
/// run; participants share no mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub messages_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<EmotionClass>,
    pub emotions_median: EmotionScores,
    pub style: StyleBreakdown,
    /// Self-reported style from an external questionnaire, when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_dominant: Option<StyleTrait>,
    pub topic_interests: TopicInterests,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ScoredMessage>,
}

/// Per-participant task outcome: a profile, or an isolated failure that
/// must not affect sibling participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParticipantOutcome {
    Profile(Box<ParticipantProfile>),
    Failed { error: String },
}

impl ParticipantOutcome {
    pub fn profile(&self) -> Option<&ParticipantProfile> {
        match self {
            Self::Profile(p) => Some(p),
            Self::Failed { .. } => None,
        }
    }
}

/// Mapping sender → outcome that preserves first-appearance order of
/// senders, both in iteration and in JSON serialization.
#[derive(Debug, Clone, Default)]
pub struct ParticipantMap {
    entries: Vec<(String, ParticipantOutcome)>,
}

impl ParticipantMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sender: String, outcome: ParticipantOutcome) {
        if let Some(slot) = self.entries.iter_mut().find(|(s, _)| *s == sender) {
            slot.1 = outcome;
        } else {
            self.entries.push((sender, outcome));
        }
    }

    pub fn get(&self, sender: &str) -> Option<&ParticipantOutcome> {
        self.entries
            .iter()
            .find(|(s, _)| s == sender)
            .map(|(_, o)| o)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParticipantOutcome)> {
        self.entries.iter().map(|(s, o)| (s.as_str(), o))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ParticipantMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (sender, outcome) in &self.entries {
            map.serialize_entry(sender, outcome)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParticipantMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = ParticipantMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of sender to participant outcome")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut result = ParticipantMap::new();
                while let Some((sender, outcome)) = access.next_entry()? {
                    result.insert(sender, outcome);
                }
                Ok(result)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

/// Full analysis output for one dialog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub dialog_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub total_messages_analyzed: usize,
    pub dominant_topics: Vec<TopicStat>,
    pub participants_analysis: ParticipantMap,
}

/// One entry of the external, versioned knowledge base. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeItem {
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl KnowledgeItem {
    /// The string actually embedded for this item: keywords joined by
    /// spaces, then the content.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.keywords.join(" "), self.content)
    }
}

/// Generated advisory text. Generation failures are contained into an
/// error-tagged text instead of propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceResult {
    pub text: String,
}

impl AdviceResult {
    pub fn is_error(&self) -> bool {
        self.text.starts_with("Ошибка генерации")
    }
}

/// Round to 3 decimals, the precision kept by all aggregated scores.
pub(crate) fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}
