//! Grounded prompt assembly for the advice generator.

use crate::types::{AnalysisReport, KnowledgeItem};

/// Build the structured advisory prompt: analysis summary, retrieved
/// facts with source attribution, then the fixed instruction block. The
/// section headers here must match the generator's stop sequences so the
/// model cannot echo them back.
pub fn build_advice_prompt(report: &AnalysisReport, facts: &[KnowledgeItem]) -> String {
    let mut summary_lines = Vec::new();
    summary_lines.push(format!(
        "Диалог: {}",
        report.title.as_deref().unwrap_or("Неизвестно")
    ));
    summary_lines.push(format!(
        "Проанализировано сообщений: {}",
        report.total_messages_analyzed
    ));

    let dominant: Vec<String> = report
        .dominant_topics
        .iter()
        .map(|t| format!("{} ({}%)", t.topic, t.percentage))
        .collect();
    if !dominant.is_empty() {
        summary_lines.push(format!("Основные темы: {}", dominant.join(", ")));
    }

    let mut participants_info = Vec::new();
    for (name, outcome) in report.participants_analysis.iter() {
        let Some(profile) = outcome.profile() else {
            continue;
        };
        let emotion = profile
            .dominant_emotion
            .map(|e| e.to_string())
            .unwrap_or_else(|| "не определена".to_string());
        let style = match profile.test_dominant {
            Some(test) if test != profile.style.text_dominant => {
                format!("{}/{}", profile.style.text_dominant, test)
            }
            _ => profile.style.text_dominant.to_string(),
        };
        let main_topic = profile
            .topic_interests
            .main_interest
            .as_deref()
            .unwrap_or("не определена");
        participants_info.push(format!(
            "- {}: доминирующая эмоция — {}, стиль DISC — {}, интересы — {}",
            name, emotion, style, main_topic
        ));
    }
    if !participants_info.is_empty() {
        summary_lines.push(format!("Участники:\n{}", participants_info.join("\n")));
    }

    let analysis_summary = summary_lines.join("\n");

    let facts_text = if facts.is_empty() {
        "Нет релевантных данных.".to_string()
    } else {
        facts
            .iter()
            .map(|item| format!("• {} (Источник: {})", item.content, item.source))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Ты — лицензированный психолог с 15-летним стажем. На основе анализа переписки \
         и научных данных дай краткий, практичный и обоснованный совет.\n\n\
         Анализ переписки:\n{}\n\n\
         Релевантные научные данные:\n{}\n\n\
         Требования:\n\
         - Давай 3-5 конкретных совета.\n\
         - Ссылайся на источники: «Как отмечает Дж. Готтман…», «Согласно модели DISC…».\n\
         - Избегай общих фраз вроде «нужно лучше общаться».\n\
         - Пиши на русском, в поддерживающем, но профессиональном тоне.\n\
         - Ответ должен быть не длиннее 500 слов.\n\n\
         Ответ:",
        analysis_summary, facts_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::profile::assemble_report;
    use crate::types::TopicStat;

    fn fact(content: &str, source: &str) -> KnowledgeItem {
        KnowledgeItem {
            content: content.to_string(),
            source: source.to_string(),
            keywords: Vec::new(),
        }
    }

    #[test]
    fn prompt_contains_summary_and_attributed_facts() {
        let report = assemble_report(
            "d".to_string(),
            Some("Рабочий чат".to_string()),
            vec![TopicStat {
                topic: "работа".to_string(),
                count: 4,
                percentage: 80.0,
            }],
            Vec::new(),
        );
        let prompt = build_advice_prompt(
            &report,
            &[fact("Критика разрушает доверие", "Дж. Готтман")],
        );

        assert!(prompt.contains("Диалог: Рабочий чат"));
        assert!(prompt.contains("Основные темы: работа (80%)"));
        assert!(prompt.contains("• Критика разрушает доверие (Источник: Дж. Готтман)"));
        assert!(prompt.ends_with("Ответ:"));
    }

    #[test]
    fn empty_facts_use_placeholder() {
        let report = assemble_report("d".to_string(), None, Vec::new(), Vec::new());
        let prompt = build_advice_prompt(&report, &[]);
        assert!(prompt.contains("Нет релевантных данных."));
        assert!(prompt.contains("Диалог: Неизвестно"));
    }
}
