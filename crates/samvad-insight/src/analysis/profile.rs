//! Deterministic merging of the scoring outputs into profiles and the
//! dialog-level report.

use crate::analysis::emotion::EmotionSummary;
use crate::types::{
    AnalysisReport, ParticipantMap, ParticipantOutcome, ParticipantProfile, StyleBreakdown,
    StyleTrait, TopicInterests, TopicStat,
};

/// Merge one participant's emotion, style and topic outputs. Profiles are
/// built once and never mutated afterwards.
pub fn build_participant_profile(
    emotion: EmotionSummary,
    style: StyleBreakdown,
    interests: TopicInterests,
    test_dominant: Option<StyleTrait>,
    include_messages: bool,
) -> ParticipantProfile {
    ParticipantProfile {
        messages_count: emotion.messages_count,
        dominant_emotion: emotion.dominant_emotion,
        emotions_median: emotion.emotions_median,
        style,
        test_dominant,
        topic_interests: interests,
        messages: if include_messages {
            emotion.messages
        } else {
            Vec::new()
        },
    }
}

/// Merge dialog-level topics and the per-participant outcomes into the
/// final report. Failed participants count no messages; their siblings
/// are unaffected.
pub fn assemble_report(
    dialog_id: String,
    title: Option<String>,
    dominant_topics: Vec<TopicStat>,
    outcomes: Vec<(String, ParticipantOutcome)>,
) -> AnalysisReport {
    let mut participants_analysis = ParticipantMap::new();
    let mut total_messages_analyzed = 0usize;

    for (sender, outcome) in outcomes {
        if let Some(profile) = outcome.profile() {
            total_messages_analyzed += profile.messages_count;
        }
        participants_analysis.insert(sender, outcome);
    }

    AnalysisReport {
        dialog_id,
        title,
        total_messages_analyzed,
        dominant_topics,
        participants_analysis,
    }
}
