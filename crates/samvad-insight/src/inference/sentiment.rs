//! ONNX-backed multilingual sentiment classifier.
//!
//! Runs an XLM-RoBERTa sequence-classification model exported to ONNX and
//! softmaxes the logits into per-class scores. The session is shared behind
//! a mutex: one dispatch point, safe to call from the analysis worker pool.

use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::SentimentClassifier;

#[derive(Debug, Clone)]
pub struct SentimentModelConfig {
    pub model_dir: PathBuf,
    /// Output labels in logit order, e.g. ["negative", "neutral", "positive"].
    pub labels: Vec<String>,
    pub max_length: usize,
}

impl SentimentModelConfig {
    pub fn new(model_dir: PathBuf, labels: Vec<String>) -> Self {
        Self {
            model_dir,
            labels,
            max_length: 512,
        }
    }
}

pub struct OnnxSentimentClassifier {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    config: SentimentModelConfig,
}

impl OnnxSentimentClassifier {
    pub fn new(config: SentimentModelConfig) -> Result<Self> {
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

        let model_bytes = std::fs::read(&model_path)?;
        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Opt level: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load sentiment model: {:?}", e))?;

        tracing::info!(
            model = %model_path.display(),
            labels = ?config.labels,
            "Sentiment classifier loaded"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
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
            "No sentiment model found in: {}",
            model_dir.display()
        ))
    }

    fn label_scores(&self, logits: &[f32]) -> Vec<(String, f32)> {
        let probs = softmax(logits);
        self.config
            .labels
            .iter()
            .zip(probs)
            .map(|(label, p)| (label.clone(), p))
            .collect()
    }
}

impl SentimentClassifier for OnnxSentimentClassifier {
    fn classify(&self, text: &str) -> Result<Vec<(String, f32)>> {
        let results = self.classify_batch(&[text])?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Classifier returned no scores"))
    }

    fn classify_batch(&self, texts: &[&str]) -> Result<Vec<Vec<(String, f32)>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings: Vec<_> = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(*text, true)
                    .map_err(|e| anyhow!("Tokenization failed: {:?}", e))
            })
            .collect::<Result<_>>()?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.config.max_length))
            .max()
            .unwrap_or(1)
            .max(1);
        let batch_size = encodings.len();

        let mut ids_flat = Vec::with_capacity(batch_size * max_len);
        let mut mask_flat = Vec::with_capacity(batch_size * max_len);

        for enc in &encodings {
            let len = enc.get_ids().len().min(max_len);
            for i in 0..len {
                ids_flat.push(enc.get_ids()[i] as i64);
                mask_flat.push(enc.get_attention_mask()[i] as i64);
            }
            for _ in len..max_len {
                ids_flat.push(1i64); // XLM-R pad token
                mask_flat.push(0i64);
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids = Value::from_array((shape.clone(), ids_flat))
            .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
        let attention_mask = Value::from_array((shape, mask_flat))
            .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

        let inputs = ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
        ];

        let mut session = self.session.lock();
        let outputs = session
            .run(inputs)
            .map_err(|e| anyhow!("Sentiment inference failed: {:?}", e))?;

        let (out_shape, data) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract logits: {:?}", e))?;

        let num_labels = if out_shape.len() == 2 {
            out_shape[1] as usize
        } else {
            self.config.labels.len()
        };
        if num_labels != self.config.labels.len() {
            return Err(anyhow!(
                "Model emits {} classes but {} labels are configured",
                num_labels,
                self.config.labels.len()
            ));
        }

        let mut results = Vec::with_capacity(batch_size);
        for sample in 0..batch_size {
            let offset = sample * num_labels;
            if offset + num_labels > data.len() {
                return Err(anyhow!("Logits tensor shorter than expected"));
            }
            results.push(self.label_scores(&data[offset..offset + num_labels]));
        }
        Ok(results)
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let a = softmax(&[0.0, 1.0]);
        let b = softmax(&[100.0, 101.0]);
        assert!((a[0] - b[0]).abs() < 1e-5);
    }
}
