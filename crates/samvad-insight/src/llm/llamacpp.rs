//! Local GGUF inference via llama-cpp-2 bindings.
//!
//! llama.cpp is synchronous and CPU-bound, so generation runs under
//! `spawn_blocking`; the async trait surface stays non-blocking.

use anyhow::{anyhow, Context as AnyhowContext, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::LlamaModel;
use llama_cpp_2::sampling::LlamaSampler;

use super::{GenerationConfig, LLMProvider, ProviderInfo};

pub struct LlamaCppProvider {
    model: Arc<LlamaModel>,
    backend: Arc<LlamaBackend>,
    model_name: String,
    context_window: usize,
}

// SAFETY: LlamaModel and LlamaBackend are thread-safe for read-only
// operations. Mutable state (LlamaContext) is created per-inference call
// and never shared.
unsafe impl Send for LlamaCppProvider {}
unsafe impl Sync for LlamaCppProvider {}

impl LlamaCppProvider {
    pub fn new(gguf_path: &Path, context_window: usize) -> Result<Self> {
        let backend = LlamaBackend::init().context("Failed to initialize llama.cpp backend")?;

        if !gguf_path.exists() {
            return Err(anyhow!("GGUF model not found at: {}", gguf_path.display()));
        }

        tracing::info!(path = %gguf_path.display(), "Loading GGUF model via llama.cpp");

        let model_params = LlamaModelParams::default();
        let model = LlamaModel::load_from_file(&backend, gguf_path, &model_params)
            .map_err(|e| {
                anyhow!(
                    "Failed to load GGUF model from {}: {:?}",
                    gguf_path.display(),
                    e
                )
            })?;

        let model_name = Self::display_name(gguf_path);
        tracing::info!(model = %model_name, context_window, "llama.cpp model loaded");

        Ok(Self {
            model: Arc::new(model),
            backend: Arc::new(backend),
            model_name,
            context_window: context_window.max(512),
        })
    }

    fn display_name(gguf_path: &Path) -> String {
        gguf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gguf".to_string())
    }

    /// Synchronous inference, called from `spawn_blocking`.
    fn run_inference(
        model: &LlamaModel,
        backend: &LlamaBackend,
        context_window: usize,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String> {
        let n_ctx = context_window as u32;
        let ctx_params =
            LlamaContextParams::default().with_n_ctx(std::num::NonZeroU32::new(n_ctx));
        let mut ctx = model
            .new_context(backend, ctx_params)
            .map_err(|e| anyhow!("Failed to create llama context: {:?}", e))?;

        let tokens = model
            .str_to_token(prompt, llama_cpp_2::model::AddBos::Always)
            .map_err(|e| anyhow!("Tokenization failed: {:?}", e))?;

        let n_prompt = tokens.len();
        if n_prompt == 0 {
            return Ok(String::new());
        }

        // Keep room for the completion inside the context window.
        let max_prompt_tokens =
            (n_ctx as usize).saturating_sub(config.max_tokens.min(n_ctx as usize / 2));
        let tokens = if n_prompt > max_prompt_tokens {
            tracing::warn!(
                n_prompt,
                max = max_prompt_tokens,
                "Prompt truncated to fit context window"
            );
            tokens[n_prompt - max_prompt_tokens..].to_vec()
        } else {
            tokens
        };
        let n_prompt = tokens.len();

        // Feed the prompt in chunks of n_batch to respect llama.cpp's
        // per-decode token limit.
        let n_batch = 2048usize;
        let mut batch = LlamaBatch::new(n_batch, 1);
        let mut processed = 0usize;
        while processed < n_prompt {
            batch.clear();
            let chunk_end = (processed + n_batch).min(n_prompt);
            for i in processed..chunk_end {
                let is_last = i == n_prompt - 1;
                batch
                    .add(tokens[i], i as i32, &[0], is_last)
                    .map_err(|_| anyhow!("Failed to add token to batch"))?;
            }
            ctx.decode(&mut batch).map_err(|e| {
                anyhow!("Prompt decode chunk {}-{} failed: {:?}", processed, chunk_end, e)
            })?;
            processed = chunk_end;
        }

        // Greedy when temperature is 0, sampled otherwise.
        let mut sampler = if config.temperature <= 0.0 {
            LlamaSampler::chain_simple([LlamaSampler::greedy()])
        } else {
            LlamaSampler::chain_simple([
                LlamaSampler::temp(config.temperature),
                LlamaSampler::top_p(config.top_p, 1),
                LlamaSampler::top_k(config.top_k as i32),
                LlamaSampler::dist(config.seed.unwrap_or(0) as u32),
            ])
        };

        let eos_token = model.token_eos();
        let mut output = String::new();
        let mut n_decoded = 0usize;
        let mut cur_pos = n_prompt as i32;

        loop {
            if n_decoded >= config.max_tokens {
                break;
            }

            let new_token = sampler.sample(&ctx, -1);
            if new_token == eos_token {
                break;
            }

            #[allow(deprecated)]
            let token_str = model
                .token_to_str(new_token, llama_cpp_2::model::Special::Tokenize)
                .unwrap_or_default();
            if !token_str.is_empty() {
                output.push_str(&token_str);
            }

            if let Some(seq) = config
                .stop_sequences
                .iter()
                .find(|seq| output.ends_with(seq.as_str()))
            {
                output.truncate(output.len() - seq.len());
                break;
            }

            n_decoded += 1;
            batch.clear();
            batch
                .add(new_token, cur_pos, &[0], true)
                .map_err(|_| anyhow!("Failed to add generated token to batch"))?;
            cur_pos += 1;
            ctx.decode(&mut batch)
                .map_err(|e| anyhow!("Decode step {} failed: {:?}", n_decoded, e))?;
        }

        tracing::debug!(
            prompt_tokens = n_prompt,
            generated_tokens = n_decoded,
            "llama.cpp inference complete"
        );

        Ok(output.trim().to_string())
    }
}

#[async_trait]
impl LLMProvider for LlamaCppProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let model = Arc::clone(&self.model);
        let backend = Arc::clone(&self.backend);
        let context_window = self.context_window;
        let prompt = prompt.to_string();
        let config = config.clone();

        tokio::task::spawn_blocking(move || {
            Self::run_inference(&model, &backend, context_window, &prompt, &config)
        })
        .await
        .map_err(|e| anyhow!("Inference task panicked: {}", e))?
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: format!("llama.cpp ({})", self.model_name),
            model: self.model_name.clone(),
            context_window: self.context_window,
            is_local: true,
        }
    }
}
