use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub models: ModelConfig,
    pub analysis: AnalysisConfig,
    pub style: StyleConfig,
    pub topics: TopicConfig,
    pub retrieval: RetrievalConfig,
    pub advice: AdviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Directory holding the sentiment classifier (model.onnx + tokenizer.json).
    pub sentiment_dir: PathBuf,
    /// Classifier output labels in logit order.
    pub sentiment_labels: Vec<String>,
    /// Directory holding the embedding model (model.onnx + tokenizer.json).
    pub embedding_dir: PathBuf,
    pub embedding_dimension: usize,
    /// GGUF file for the local advice model.
    pub gguf_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Messages per classifier invocation.
    pub batch_size: usize,
    /// Worker threads for the per-participant fan-out.
    pub workers: usize,
    /// Keep per-message emotion scores in the report. Off by default to
    /// bound artifact size on long dialogs.
    pub include_messages: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    pub d_keywords: Vec<String>,
    pub i_keywords: Vec<String>,
    pub s_keywords: Vec<String>,
    pub c_keywords: Vec<String>,
    /// Emoji treated as markers of enthusiasm/affection (trait I bonus).
    pub enthusiasm_emoji: Vec<String>,
    /// Emotion-bias thresholds. Defaults reproduce the reference scoring.
    pub positive_threshold: f32,
    pub negative_threshold: f32,
    pub neutral_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicLexicon {
    pub label: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub lexicons: Vec<TopicLexicon>,
    /// Cap on reported dialog-level topics.
    pub max_topics: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Knowledge base JSON file (array of content/source/keywords items).
    pub knowledge_base: PathBuf,
    /// Directory for the persisted index, text list and hash artifacts.
    pub cache_dir: PathBuf,
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceConfig {
    pub max_tokens: usize,
    /// 0.0 selects greedy decoding.
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    pub context_window: usize,
    /// Stop sequences keep the model from echoing prompt section headers.
    pub stop_sequences: Vec<String>,
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.models.embedding_dimension == 0 {
            return Err("models.embedding_dimension must be > 0".into());
        }
        if self.models.sentiment_labels.is_empty() {
            return Err("models.sentiment_labels must not be empty".into());
        }
        if self.analysis.batch_size == 0 {
            return Err("analysis.batch_size must be > 0".into());
        }
        if self.analysis.workers == 0 {
            return Err("analysis.workers must be > 0".into());
        }
        for (name, value) in [
            ("style.positive_threshold", self.style.positive_threshold),
            ("style.negative_threshold", self.style.negative_threshold),
            ("style.neutral_threshold", self.style.neutral_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0.0, 1.0]", name));
            }
        }
        if self.topics.max_topics == 0 {
            return Err("topics.max_topics must be > 0".into());
        }
        if self.advice.max_tokens == 0 {
            return Err("advice.max_tokens must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("samvad-insight");

        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else {
            data_dir.join("models")
        };

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8);

        Self {
            models: ModelConfig {
                sentiment_dir: model_dir.join("twitter-xlm-roberta-base-sentiment"),
                sentiment_labels: vec![
                    "negative".to_string(),
                    "neutral".to_string(),
                    "positive".to_string(),
                ],
                embedding_dir: model_dir.join("multilingual-e5-large"),
                embedding_dimension: 1024,
                gguf_path: model_dir.join("saiga_mistral_7b.Q4_K_M.gguf"),
            },
            analysis: AnalysisConfig {
                batch_size: 50,
                workers,
                include_messages: false,
            },
            style: StyleConfig::default(),
            topics: TopicConfig::default(),
            retrieval: RetrievalConfig {
                knowledge_base: data_dir.join("psychology_knowledge_base.json"),
                cache_dir: data_dir.join("rag_cache"),
                top_k: 3,
            },
            advice: AdviceConfig::default(),
            data_dir,
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            d_keywords: words(&[
                "срочно", "результат", "контроль", "решаю", "быстро", "успех", "должны",
                "обязательно", "дедлайн", "план",
            ]),
            i_keywords: words(&[
                "отлично", "супер", "круто", "вместе", "команда", "спасибо", "❤️", "😊",
                "😂", "рад", "привет",
            ]),
            s_keywords: words(&[
                "спокойно", "помощь", "поддержка", "стабильность", "доверие", "понимаю",
                "ладно", "хорошо", "нормально",
            ]),
            c_keywords: words(&[
                "анализ", "данные", "детали", "проверить", "точность", "отчёт", "проект",
                "интерфейс", "проверка", "числа",
            ]),
            enthusiasm_emoji: words(&["😊", "😂", "❤️"]),
            positive_threshold: 0.6,
            negative_threshold: 0.6,
            neutral_threshold: 0.8,
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        let topic = |label: &str, keywords: &[&str]| TopicLexicon {
            label: label.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        };
        // Stem forms: matching is by substring, so "встреч" covers both
        // "встреча" and "на встрече".
        Self {
            lexicons: vec![
                topic(
                    "работа",
                    &["работ", "проект", "отчёт", "дедлайн", "задач", "встреч", "презентаци"],
                ),
                topic("семья", &["семь", "дети", "родител", "дом"]),
                topic("отдых", &["отдых", "отпуск", "выходн", "кино", "игр"]),
                topic("здоровье", &["здоров", "врач", "болит", "устал"]),
                topic("финансы", &["деньги", "бюджет", "зарплат", "оплат"]),
                topic("учёба", &["учёб", "экзамен", "курс", "лекци"]),
            ],
            max_topics: 5,
        }
    }
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            context_window: 2048,
            stop_sequences: vec![
                "Анализ переписки:".to_string(),
                "Релевантные научные данные:".to_string(),
                "\n\n".to_string(),
            ],
        }
    }
}
