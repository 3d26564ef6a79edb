//! Retrieval-query derivation from a dialog profile.

use crate::types::AnalysisReport;

/// Used whenever the profile yields nothing to search for.
pub const FALLBACK_QUERY: &str = "общий психологический анализ межличностной коммуникации";

/// Concatenate dominant topic labels, the deduplicated dominant emotions
/// and the deduplicated style labels (text-derived and self-reported)
/// into one space-joined query. Emotions keep first-appearance order;
/// style labels are sorted — both rules make repeated runs identical.
pub fn build_retrieval_query(report: &AnalysisReport) -> String {
    let mut parts: Vec<String> = report
        .dominant_topics
        .iter()
        .map(|t| t.topic.clone())
        .collect();

    let mut emotions: Vec<String> = Vec::new();
    let mut styles: Vec<String> = Vec::new();
    for (_, outcome) in report.participants_analysis.iter() {
        let Some(profile) = outcome.profile() else {
            continue;
        };
        if let Some(emotion) = profile.dominant_emotion {
            let label = emotion.as_str().to_string();
            if !emotions.contains(&label) {
                emotions.push(label);
            }
        }
        let mut push_style = |label: String| {
            if !styles.contains(&label) {
                styles.push(label);
            }
        };
        push_style(profile.style.text_dominant.to_string());
        if let Some(test_dominant) = profile.test_dominant {
            push_style(test_dominant.to_string());
        }
    }
    styles.sort();

    parts.extend(emotions);
    parts.extend(styles);

    let query = parts.join(" ").trim().to_string();
    if query.is_empty() {
        FALLBACK_QUERY.to_string()
    } else {
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::emotion::EmotionSummary;
    use crate::analysis::profile::{assemble_report, build_participant_profile};
    use crate::types::{
        EmotionClass, EmotionScores, ParticipantOutcome, StyleBreakdown, StyleTrait,
        TopicInterests, TopicStat, TraitScores,
    };

    fn profile(
        emotion: Option<EmotionClass>,
        text_dominant: StyleTrait,
        test_dominant: Option<StyleTrait>,
    ) -> ParticipantOutcome {
        let scores = TraitScores { d: 1, i: 0, s: 0, c: 0 };
        let summary = EmotionSummary {
            messages_count: 1,
            emotions_median: EmotionScores::default(),
            dominant_emotion: emotion,
            messages: Vec::new(),
        };
        ParticipantOutcome::Profile(Box::new(build_participant_profile(
            summary,
            StyleBreakdown {
                raw_scores: scores,
                percentages: scores.percentages(),
                text_dominant,
            },
            TopicInterests::default(),
            test_dominant,
            false,
        )))
    }

    #[test]
    fn query_concatenates_topics_emotions_and_styles() {
        let report = assemble_report(
            "d".to_string(),
            None,
            vec![TopicStat {
                topic: "работа".to_string(),
                count: 2,
                percentage: 50.0,
            }],
            vec![
                (
                    "a".to_string(),
                    profile(Some(EmotionClass::Negative), StyleTrait::D, None),
                ),
                (
                    "b".to_string(),
                    profile(Some(EmotionClass::Positive), StyleTrait::I, Some(StyleTrait::S)),
                ),
            ],
        );
        assert_eq!(build_retrieval_query(&report), "работа negative positive D I S");
    }

    #[test]
    fn duplicates_are_removed() {
        let report = assemble_report(
            "d".to_string(),
            None,
            Vec::new(),
            vec![
                ("a".to_string(), profile(Some(EmotionClass::Positive), StyleTrait::I, None)),
                ("b".to_string(), profile(Some(EmotionClass::Positive), StyleTrait::I, Some(StyleTrait::I))),
            ],
        );
        assert_eq!(build_retrieval_query(&report), "positive I");
    }

    #[test]
    fn empty_profile_falls_back_to_generic_query() {
        let report = assemble_report("d".to_string(), None, Vec::new(), Vec::new());
        assert_eq!(build_retrieval_query(&report), FALLBACK_QUERY);
    }
}
