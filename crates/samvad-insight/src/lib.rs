//! samvad-insight — dialog communication analysis and RAG-grounded advice.
//!
//! The pipeline turns a recorded multi-party conversation into
//! per-participant behavioral profiles (emotion distribution, four-trait
//! communication style, topical interests) and a natural-language advisory
//! grounded in facts retrieved from a content-hash-cached knowledge index.

pub mod advisor;
pub mod analysis;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod inference;
pub mod knowledge;
pub mod llm;
pub mod processing;
pub mod types;

// Re-export the primary surface for convenience
pub use config::EngineConfig;
pub use engine::{AdvisorEngine, Capabilities};
pub use error::PipelineError;
pub use types::{
    AdviceResult, AnalysisReport, Dialog, EmotionClass, KnowledgeItem, Message,
    ParticipantOutcome, ParticipantProfile, StyleTrait,
};

// Re-export capability traits for custom backends
pub use embeddings::EmbeddingModel;
pub use inference::SentimentClassifier;
pub use llm::{GenerationConfig, LLMProvider};

// Re-export common result types
pub use anyhow::{Error, Result};
