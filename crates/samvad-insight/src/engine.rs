//! Engine tying the analysis pipeline to retrieval-grounded advice.
//!
//! All model-backed capabilities are explicit resources constructed once
//! and injected by reference; tests swap in stubs through
//! `with_capabilities`.

use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::advisor::{build_retrieval_query, AdviceGenerator};
use crate::analysis::profile::{assemble_report, build_participant_profile};
use crate::analysis::{
    EmotionScorer, EmotionSummary, LexiconTopicModel, StyleClassifier, TopicModel, TopicSummary,
};
use crate::config::EngineConfig;
use crate::embeddings::{E5Config, E5Embeddings, EmbeddingModel};
use crate::error::PipelineError;
use crate::inference::{OnnxSentimentClassifier, SentimentClassifier, SentimentModelConfig};
use crate::knowledge::{IndexCache, KnowledgeBase, RetrievalEngine};
use crate::llm::{LLMProvider, LlamaCppProvider};
use crate::processing::group_by_sender;
use crate::types::{
    AdviceResult, AnalysisReport, Dialog, KnowledgeItem, Message, ParticipantOutcome,
    StyleBreakdown, StyleTrait,
};

/// The process-wide model resources the engine runs on.
pub struct Capabilities {
    pub classifier: Arc<dyn SentimentClassifier>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub topics: Arc<dyn TopicModel>,
    pub llm: Arc<dyn LLMProvider>,
}

pub struct AdvisorEngine {
    config: EngineConfig,
    scorer: EmotionScorer,
    styles: StyleClassifier,
    topics: Arc<dyn TopicModel>,
    embedder: Arc<dyn EmbeddingModel>,
    generator: AdviceGenerator,
    pool: rayon::ThreadPool,
    retrieval: RwLock<Option<Arc<RetrievalEngine>>>,
}

impl AdvisorEngine {
    /// Construct the engine with real model backends from config.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let classifier = OnnxSentimentClassifier::new(SentimentModelConfig::new(
            config.models.sentiment_dir.clone(),
            config.models.sentiment_labels.clone(),
        ))
        .context("Failed to load sentiment classifier")?;

        let embedder = E5Embeddings::new(E5Config::new(
            config.models.embedding_dir.clone(),
            config.models.embedding_dimension,
        ))
        .context("Failed to load embedding model")?;

        let llm = LlamaCppProvider::new(&config.models.gguf_path, config.advice.context_window)
            .context("Failed to load advice model")?;

        let topics = Arc::new(LexiconTopicModel::new(config.topics.clone()));

        Self::with_capabilities(
            config,
            Capabilities {
                classifier: Arc::new(classifier),
                embedder: Arc::new(embedder),
                topics,
                llm: Arc::new(llm),
            },
        )
    }

    /// Construct the engine with injected capabilities (stubs in tests,
    /// alternative providers in callers).
    pub fn with_capabilities(config: EngineConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.analysis.workers)
            .build()
            .context("Failed to build analysis worker pool")?;

        let scorer = EmotionScorer::new(
            Arc::clone(&capabilities.classifier),
            config.analysis.batch_size,
        );
        let styles = StyleClassifier::new(config.style.clone());
        let generator = AdviceGenerator::new(capabilities.llm, config.advice.clone());

        Ok(Self {
            scorer,
            styles,
            topics: capabilities.topics,
            embedder: capabilities.embedder,
            generator,
            pool,
            retrieval: RwLock::new(None),
            config,
        })
    }

    /// Release model resources. Dropping the engine does the same; the
    /// explicit form exists so shutdown shows up in the logs.
    pub fn shutdown(self) {
        tracing::info!("Advisor engine shut down, model resources released");
    }

    /// Analyze a dialog into per-participant profiles and a dialog-level
    /// summary. An empty dialog is an error object, not a crash.
    pub async fn analyze_dialog(&self, dialog: &Dialog) -> Result<AnalysisReport, PipelineError> {
        self.analyze_dialog_with_assessments(dialog, &HashMap::new())
            .await
    }

    /// Same as `analyze_dialog`, with externally supplied self-reported
    /// styles (questionnaire results) attached per sender.
    pub async fn analyze_dialog_with_assessments(
        &self,
        dialog: &Dialog,
        assessments: &HashMap<String, StyleTrait>,
    ) -> Result<AnalysisReport, PipelineError> {
        if dialog.messages.is_empty() {
            return Err(PipelineError::EmptyDialog {
                dialog_id: dialog.id.clone(),
            });
        }

        let groups = group_by_sender(&dialog.messages);
        let participants: Vec<String> = groups.iter().map(|(s, _)| s.clone()).collect();

        // Topic inference failures degrade to an empty summary; the
        // dialog-level result is still produced.
        let topic_summary = match self.topics.extract(&dialog.messages, &participants).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(dialog = %dialog.id, error = %e, "Topic inference failed");
                TopicSummary::default()
            }
        };

        // Participants share no mutable state; fan out over the bounded
        // pool and join. Each task resolves to an explicit outcome, so a
        // failing participant never aborts its siblings.
        let outcomes: Vec<(String, ParticipantOutcome)> = self.pool.install(|| {
            groups
                .par_iter()
                .map(|(sender, messages)| {
                    let outcome = match self.analyze_participant(messages) {
                        Ok((emotion, style)) => {
                            let interests = topic_summary
                                .participant_interests
                                .get(sender)
                                .cloned()
                                .unwrap_or_default();
                            ParticipantOutcome::Profile(Box::new(build_participant_profile(
                                emotion,
                                style,
                                interests,
                                assessments.get(sender).copied(),
                                self.config.analysis.include_messages,
                            )))
                        }
                        Err(e) => {
                            tracing::warn!(sender = %sender, error = %e, "Participant analysis failed");
                            ParticipantOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    };
                    (sender.clone(), outcome)
                })
                .collect()
        });

        Ok(assemble_report(
            dialog.id.clone(),
            dialog.title.clone(),
            topic_summary.dominant_topics,
            outcomes,
        ))
    }

    fn analyze_participant(
        &self,
        messages: &[Message],
    ) -> Result<(EmotionSummary, StyleBreakdown)> {
        let emotion = self.scorer.score_participant(messages)?;

        // Style runs over the raw texts: the cleaner strips the emoji and
        // punctuation the style rules score.
        let raw_texts: Vec<&str> = messages
            .iter()
            .map(|m| m.text.as_str())
            .filter(|t| !t.is_empty())
            .collect();
        let median = emotion.emotions_median;
        let bias = (emotion.messages_count > 0).then_some(&median);
        let style = self.styles.score_messages(&raw_texts, bias);

        Ok((emotion, style))
    }

    /// Analyze a dialog file. Unreadable input is fatal for the run.
    pub async fn analyze_file(&self, path: &Path) -> Result<AnalysisReport, PipelineError> {
        let dialog = Dialog::from_path(path)?;
        self.analyze_dialog(&dialog).await
    }

    /// Analyze every `*.json` dialog in a directory, writing one
    /// `<stem>_analysis.json` artifact per input. Per-file failures are
    /// written as error objects and do not stop the batch. Returns the
    /// number of successfully analyzed dialogs.
    pub async fn analyze_dir(&self, dialog_dir: &Path, out_dir: &Path) -> Result<usize> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output dir: {}", out_dir.display()))?;

        let mut analyzed = 0usize;
        for entry in walkdir::WalkDir::new(dialog_dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            let result_json = match self.analyze_file(path).await {
                Ok(report) => {
                    analyzed += 1;
                    serde_json::to_string_pretty(&report)?
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Dialog analysis failed");
                    serde_json::to_string_pretty(&e.to_report())?
                }
            };

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dialog".to_string());
            let out_path = out_dir.join(format!("{}_analysis.json", stem));
            std::fs::write(&out_path, result_json)
                .with_context(|| format!("Failed to write {}", out_path.display()))?;
        }

        tracing::info!(dir = %dialog_dir.display(), analyzed, "Directory analysis complete");
        Ok(analyzed)
    }

    /// Generate a retrieval-grounded advisory for an analysis report.
    /// A missing or unreadable knowledge base is fatal; index and
    /// retrieval failures degrade to ungrounded advice.
    pub async fn advise(&self, report: &AnalysisReport) -> Result<AdviceResult> {
        let query = build_retrieval_query(report);
        let facts = self.gather_facts(&query)?;
        Ok(self.generator.generate(report, &facts).await)
    }

    fn gather_facts(&self, query: &str) -> Result<Vec<KnowledgeItem>> {
        let existing = self.retrieval.read().as_ref().map(Arc::clone);
        let engine = match existing {
            Some(engine) => engine,
            None => {
                let kb = KnowledgeBase::load(&self.config.retrieval.knowledge_base)?;
                let cache = IndexCache::new(self.config.retrieval.cache_dir.clone());
                let built = cache
                    .load_or_build(&kb, self.embedder.as_ref())
                    .and_then(|cached| {
                        RetrievalEngine::new(
                            cached,
                            kb.items().to_vec(),
                            Arc::clone(&self.embedder),
                        )
                    });
                match built {
                    Ok(engine) => {
                        let engine = Arc::new(engine);
                        // Concurrent cache misses may race to build the
                        // same index; last writer wins and both results
                        // are equivalent.
                        *self.retrieval.write() = Some(Arc::clone(&engine));
                        engine
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Knowledge index unavailable, advising without facts");
                        return Ok(Vec::new());
                    }
                }
            }
        };

        Ok(engine
            .retrieve(query, self.config.retrieval.top_k)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Retrieval failed, continuing without facts");
                Vec::new()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::e5::normalize;
    use crate::llm::{GenerationConfig, ProviderInfo};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Keyword-scripted classifier mirroring what the sentiment model
    /// returns on the test corpus. Texts containing the failure marker
    /// error out, for isolation tests.
    struct StubClassifier {
        fail_marker: Option<String>,
    }

    impl StubClassifier {
        fn new() -> Self {
            Self { fail_marker: None }
        }

        fn failing_on(marker: &str) -> Self {
            Self {
                fail_marker: Some(marker.to_string()),
            }
        }
    }

    impl SentimentClassifier for StubClassifier {
        fn classify(&self, text: &str) -> Result<Vec<(String, f32)>> {
            if let Some(marker) = &self.fail_marker {
                if text.contains(marker.as_str()) {
                    return Err(anyhow!("classifier exploded"));
                }
            }
            let lower = text.to_lowercase();
            Ok(if lower.contains("спасибо") || lower.contains("отлично") {
                vec![
                    ("negative".to_string(), 0.05),
                    ("neutral".to_string(), 0.05),
                    ("positive".to_string(), 0.9),
                ]
            } else if lower.contains("срочно") {
                vec![
                    ("negative".to_string(), 0.7),
                    ("neutral".to_string(), 0.2),
                    ("positive".to_string(), 0.1),
                ]
            } else {
                vec![
                    ("negative".to_string(), 0.1),
                    ("neutral".to_string(), 0.8),
                    ("positive".to_string(), 0.1),
                ]
            })
        }
    }

    /// Deterministic byte-sum embedder with a document-embedding counter.
    struct StubEmbedder {
        document_calls: Mutex<usize>,
    }

    impl StubEmbedder {
        fn new() -> Self {
            Self {
                document_calls: Mutex::new(0),
            }
        }
    }

    impl EmbeddingModel for StubEmbedder {
        fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            let sum: u32 = text.bytes().map(|b| b as u32).sum();
            Ok(normalize(vec![
                (sum % 101) as f32 + 1.0,
                (sum % 17) as f32 + 1.0,
            ]))
        }

        fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
            *self.document_calls.lock() += 1;
            self.embed_query(text)
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    /// Records the prompt it was given and returns a fixed advisory.
    struct RecordingProvider {
        prompt: Mutex<String>,
    }

    #[async_trait]
    impl LLMProvider for RecordingProvider {
        async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
            *self.prompt.lock() = prompt.to_string();
            Ok("1. Обсудите дедлайны заранее.".to_string())
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "recording".to_string(),
                model: "stub".to_string(),
                context_window: 2048,
                is_local: true,
            }
        }
    }

    fn test_config(dir: &Path) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.data_dir = dir.to_path_buf();
        config.analysis.workers = 2;
        config.retrieval.knowledge_base = dir.join("kb.json");
        config.retrieval.cache_dir = dir.join("rag_cache");
        config
    }

    fn engine_with(
        dir: &Path,
        classifier: Arc<dyn SentimentClassifier>,
        embedder: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn LLMProvider>,
    ) -> AdvisorEngine {
        let config = test_config(dir);
        let topics = Arc::new(LexiconTopicModel::new(config.topics.clone()));
        AdvisorEngine::with_capabilities(
            config,
            Capabilities {
                classifier,
                embedder,
                topics,
                llm,
            },
        )
        .unwrap()
    }

    fn msg(sender: &str, text: &str) -> Message {
        Message {
            sender: sender.to_string(),
            text: text.to_string(),
            time: None,
        }
    }

    fn two_party_dialog() -> Dialog {
        Dialog {
            id: "d1".to_string(),
            title: Some("Рабочий чат".to_string()),
            messages: vec![
                msg("Алексей", "Срочно нужен результат!"),
                msg("Ирина", "Спасибо, отлично, вместе справимся 😊"),
            ],
        }
    }

    fn write_kb(dir: &Path) {
        std::fs::write(
            dir.join("kb.json"),
            r#"[{"content":"Жёсткие дедлайны повышают напряжение","source":"Дж. Готтман","keywords":["дедлайн","стресс"]}]"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn two_participant_dialog_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::new()),
            Arc::new(StubEmbedder::new()),
            Arc::new(crate::llm::NullProvider),
        );

        let report = engine.analyze_dialog(&two_party_dialog()).await.unwrap();

        assert_eq!(report.dialog_id, "d1");
        assert_eq!(report.total_messages_analyzed, 2);

        let order: Vec<&str> = report.participants_analysis.iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec!["Алексей", "Ирина"]);

        let alexey = report
            .participants_analysis
            .get("Алексей")
            .unwrap()
            .profile()
            .unwrap();
        assert_eq!(alexey.style.text_dominant, StyleTrait::D);
        assert_eq!(alexey.dominant_emotion, Some(crate::types::EmotionClass::Negative));

        let irina = report
            .participants_analysis
            .get("Ирина")
            .unwrap()
            .profile()
            .unwrap();
        assert_eq!(irina.style.text_dominant, StyleTrait::I);
        assert_eq!(irina.dominant_emotion, Some(crate::types::EmotionClass::Positive));
        assert!((irina.style.percentages.sum() - 100.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn empty_dialog_is_an_error_object() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::new()),
            Arc::new(StubEmbedder::new()),
            Arc::new(crate::llm::NullProvider),
        );

        let dialog = Dialog {
            id: "x".to_string(),
            title: None,
            messages: Vec::new(),
        };
        let err = engine.analyze_dialog(&dialog).await.unwrap_err();
        let report = err.to_report();
        assert_eq!(report["dialog_id"], "x");
        assert!(report["error"].as_str().unwrap().contains("Пустой"));
    }

    #[tokio::test]
    async fn participant_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::failing_on("паника")),
            Arc::new(StubEmbedder::new()),
            Arc::new(crate::llm::NullProvider),
        );

        let dialog = Dialog {
            id: "d2".to_string(),
            title: None,
            messages: vec![
                msg("Алексей", "Срочно нужен результат!"),
                msg("Ирина", "у меня паника"),
            ],
        };
        let report = engine.analyze_dialog(&dialog).await.unwrap();

        assert!(report
            .participants_analysis
            .get("Алексей")
            .unwrap()
            .profile()
            .is_some());
        match report.participants_analysis.get("Ирина").unwrap() {
            ParticipantOutcome::Failed { error } => assert!(error.contains("exploded")),
            _ => panic!("expected isolated failure"),
        }
        assert_eq!(report.total_messages_analyzed, 1);
    }

    #[tokio::test]
    async fn advise_grounds_prompt_in_retrieved_facts() {
        let dir = tempfile::tempdir().unwrap();
        write_kb(dir.path());

        let embedder = Arc::new(StubEmbedder::new());
        let llm = Arc::new(RecordingProvider {
            prompt: Mutex::new(String::new()),
        });
        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::new()),
            embedder.clone(),
            llm.clone(),
        );

        let report = engine.analyze_dialog(&two_party_dialog()).await.unwrap();
        let advice = engine.advise(&report).await.unwrap();

        assert_eq!(advice.text, "1. Обсудите дедлайны заранее.");
        let prompt = llm.prompt.lock().clone();
        assert!(prompt.contains("Жёсткие дедлайны повышают напряжение"));
        assert!(prompt.contains("(Источник: Дж. Готтман)"));
        assert!(prompt.contains("Диалог: Рабочий чат"));

        // A second advisory reuses the in-memory index: one document was
        // embedded for the one-item base and never again.
        engine.advise(&report).await.unwrap();
        assert_eq!(*embedder.document_calls.lock(), 1);
    }

    #[tokio::test]
    async fn missing_knowledge_base_is_fatal_for_advice() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::new()),
            Arc::new(StubEmbedder::new()),
            Arc::new(crate::llm::NullProvider),
        );

        let report = engine.analyze_dialog(&two_party_dialog()).await.unwrap();
        assert!(engine.advise(&report).await.is_err());
    }

    #[tokio::test]
    async fn generation_failure_is_error_tagged_not_propagated() {
        let dir = tempfile::tempdir().unwrap();
        write_kb(dir.path());
        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::new()),
            Arc::new(StubEmbedder::new()),
            Arc::new(crate::llm::NullProvider),
        );

        let report = engine.analyze_dialog(&two_party_dialog()).await.unwrap();
        let advice = engine.advise(&report).await.unwrap();
        assert!(advice.is_error());
    }

    #[tokio::test]
    async fn self_assessments_are_attached() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::new()),
            Arc::new(StubEmbedder::new()),
            Arc::new(crate::llm::NullProvider),
        );

        let mut assessments = HashMap::new();
        assessments.insert("Алексей".to_string(), StyleTrait::C);
        let report = engine
            .analyze_dialog_with_assessments(&two_party_dialog(), &assessments)
            .await
            .unwrap();

        let alexey = report
            .participants_analysis
            .get("Алексей")
            .unwrap()
            .profile()
            .unwrap();
        assert_eq!(alexey.test_dominant, Some(StyleTrait::C));
        let irina = report
            .participants_analysis
            .get("Ирина")
            .unwrap()
            .profile()
            .unwrap();
        assert_eq!(irina.test_dominant, None);
    }

    #[tokio::test]
    async fn analyze_dir_writes_artifacts_and_survives_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let dialogs = dir.path().join("dialogs");
        let out = dir.path().join("analysis_results");
        std::fs::create_dir_all(&dialogs).unwrap();

        std::fs::write(
            dialogs.join("1.json"),
            serde_json::to_string(&two_party_dialog()).unwrap(),
        )
        .unwrap();
        std::fs::write(dialogs.join("2.json"), r#"{"id":"x","messages":[]}"#).unwrap();
        std::fs::write(dialogs.join("notes.txt"), "не json").unwrap();

        let engine = engine_with(
            dir.path(),
            Arc::new(StubClassifier::new()),
            Arc::new(StubEmbedder::new()),
            Arc::new(crate::llm::NullProvider),
        );

        let analyzed = engine.analyze_dir(&dialogs, &out).await.unwrap();
        assert_eq!(analyzed, 1);

        let ok: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("1_analysis.json")).unwrap())
                .unwrap();
        assert_eq!(ok["dialog_id"], "d1");

        let failed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("2_analysis.json")).unwrap())
                .unwrap();
        assert_eq!(failed["dialog_id"], "x");
        assert!(failed["error"].as_str().is_some());
    }
}
