//! Multilingual E5 embeddings via ONNX Runtime.
//!
//! Mean-pools the last hidden state over the attention mask and
//! L2-normalizes, so nearest-neighbor search over the resulting vectors
//! ranks by cosine similarity.

use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::EmbeddingModel;

#[derive(Debug, Clone)]
pub struct E5Config {
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
}

impl E5Config {
    pub fn new(model_dir: PathBuf, dimension: usize) -> Self {
        Self {
            model_dir,
            dimension,
            max_length: 512,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum EmbedMode {
    Query,
    Passage,
}

impl EmbedMode {
    /// E5 models are trained with these task prefixes; embedding without
    /// them shifts the vector space.
    fn prefix(&self, text: &str) -> String {
        match self {
            Self::Query => format!("query: {}", text),
            Self::Passage => format!("passage: {}", text),
        }
    }
}

pub struct E5Embeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    config: E5Config,
    cache: Arc<RwLock<lru::LruCache<String, Vec<f32>>>>,
}

impl E5Embeddings {
    pub fn new(config: E5Config) -> Result<Self> {
        let model_path = Self::find_model(&config.model_dir)?;
        let tokenizer_path = config.model_dir.join("tokenizer.json");

        if !tokenizer_path.exists() {
            return Err(anyhow!(
                "Tokenizer not found at: {}",
                tokenizer_path.display()
            ));
        }
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {:?}", e))?;

        let model_bytes = std::fs::read(&model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .with_inter_threads(1)
            .map_err(|e| anyhow!("Inter threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        tracing::info!(
            model = %model_path.display(),
            dimension = config.dimension,
            "Embedding model loaded"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
            cache: Arc::new(RwLock::new(lru::LruCache::new(
                std::num::NonZeroUsize::new(1000).expect("cache size is non-zero"),
            ))),
        })
    }

    fn find_model(model_dir: &Path) -> Result<PathBuf> {
        let candidates = [
            model_dir.join("model_O4.onnx"),
            model_dir.join("model.onnx"),
        ];
        for path in &candidates {
            if path.exists() {
                return Ok(path.clone());
            }
        }
        Err(anyhow!(
            "No embedding model found in: {}",
            model_dir.display()
        ))
    }

    fn embed_with_mode(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        let cache_key = format!("{:?}:{}", mode, text);
        if let Some(cached) = self.cache.write().get(&cache_key) {
            return Ok(cached.clone());
        }

        let embedding = self
            .embed_batch_with_mode(&[text], mode)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedding model returned no vector"))?;

        self.cache.write().put(cache_key, embedding.clone());
        Ok(embedding)
    }

    fn embed_batch_with_mode(&self, texts: &[&str], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        const MAX_BATCH: usize = 8;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let encodings: Vec<_> = batch
                .iter()
                .map(|text| {
                    self.tokenizer
                        .encode(mode.prefix(text).as_str(), true)
                        .map_err(|e| anyhow!("Tokenization failed: {:?}", e))
                })
                .collect::<Result<_>>()?;

            let padded_len = encodings
                .iter()
                .map(|e| e.get_ids().len().min(self.config.max_length))
                .max()
                .unwrap_or(1)
                .max(1);
            let batch_size = encodings.len();

            let mut ids_flat = Vec::with_capacity(batch_size * padded_len);
            let mut mask_flat = Vec::with_capacity(batch_size * padded_len);

            for enc in &encodings {
                let len = enc.get_ids().len().min(padded_len);
                for i in 0..len {
                    ids_flat.push(enc.get_ids()[i] as i64);
                    mask_flat.push(enc.get_attention_mask()[i] as i64);
                }
                for _ in len..padded_len {
                    ids_flat.push(1i64); // XLM-R pad token
                    mask_flat.push(0i64);
                }
            }

            let shape = vec![batch_size, padded_len];
            let input_ids = Value::from_array((shape.clone(), ids_flat))
                .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
            let attention_mask = Value::from_array((shape, mask_flat.clone()))
                .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

            let inputs = ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ];

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs)
                .map_err(|e| anyhow!("Embedding inference failed: {:?}", e))?;

            let (out_shape, data) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract hidden state: {:?}", e))?;

            let seq_len = out_shape[1] as usize;
            let hidden_dim = out_shape[2] as usize;

            for sample in 0..batch_size {
                let mask_offset = sample * padded_len;
                let sample_offset = sample * seq_len * hidden_dim;
                let mut pooled = vec![0.0f32; hidden_dim];
                let mut mask_sum = 0.0f32;

                for pos in 0..seq_len.min(padded_len) {
                    if mask_flat[mask_offset + pos] == 0 {
                        continue;
                    }
                    mask_sum += 1.0;
                    let offset = sample_offset + pos * hidden_dim;
                    for dim in 0..hidden_dim {
                        pooled[dim] += data[offset + dim];
                    }
                }

                if mask_sum > 0.0 {
                    for value in &mut pooled {
                        *value /= mask_sum;
                    }
                }

                all_embeddings.push(normalize(pooled));
            }
        }

        Ok(all_embeddings)
    }
}

/// L2-normalize in place; near-zero vectors are returned unchanged.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

impl EmbeddingModel for E5Embeddings {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_mode(text, EmbedMode::Query)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_mode(text, EmbedMode::Passage)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch_with_mode(texts, EmbedMode::Passage)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn mode_prefixes_differ() {
        assert_eq!(EmbedMode::Query.prefix("тест"), "query: тест");
        assert_eq!(EmbedMode::Passage.prefix("тест"), "passage: тест");
    }
}
