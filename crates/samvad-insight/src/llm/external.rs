//! OpenAI-compatible HTTP generation provider.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{apply_stop_sequences, GenerationConfig, LLMProvider, ProviderInfo};

pub struct ExternalProvider {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl ExternalProvider {
    /// `endpoint` is a full chat-completions URL, e.g.
    /// `http://localhost:11434/v1/chat/completions` for Ollama.
    pub fn new(endpoint: String, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        tracing::info!(endpoint = %endpoint, model = %model, "Creating external LLM provider");

        Ok(Self {
            endpoint,
            api_key,
            model,
            client,
        })
    }

    /// Parse a response body as JSON, with a clear error when the server
    /// returned an HTML error page instead.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') || trimmed.starts_with("<!") {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}): {}",
                endpoint,
                status,
                preview
            ));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stop": config.stop_sequences,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", self.endpoint, e))?;

        let parsed: ChatCompletionResponse =
            Self::parse_json_response(response, &self.endpoint).await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Completion response contained no content"))?;

        // Some servers ignore the stop parameter; enforce it client-side.
        Ok(apply_stop_sequences(content.trim(), &config.stop_sequences))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: format!("external ({})", self.endpoint),
            model: self.model.clone(),
            context_window: 8192,
            is_local: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing_extracts_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"совет"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("совет")
        );
    }
}
