//! LLM provider abstraction, grounded in
//! `astrid-llm/src/provider.rs`'s `LlmProvider` trait: a small async-trait
//! surface with sane default methods so a minimal HTTP-backed implementation
//! only has to provide `complete`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ObbyError, ObbyResult};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Sends `prompt` and returns the full completion text.
    async fn complete(&self, prompt: &str) -> ObbyResult<String>;

    /// Rough token estimate used only for batching heuristics, matching
    /// `astrid-llm`'s `text.len() / 4` default.
    fn count_tokens(&self, text: &str) -> usize {
        text.len() / 4
    }

    fn max_context_length(&self) -> usize {
        8192
    }
}

/// Configuration for an HTTP-backed provider. Carries a redacting `Debug`
/// impl so an accidentally logged config never leaks the API key, matching
/// `astrid-llm::ProviderConfig`.
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        ProviderConfig {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.3,
        }
    }

    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn temperature(mut self, value: f32) -> Self {
        self.temperature = value.clamp(0.0, 2.0);
        self
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// An OpenAI-chat-completions-shaped HTTP provider -- the common
/// denominator for self-hosted and hosted LLM endpoints alike.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpLlmProvider {
    pub fn new(config: ProviderConfig) -> Self {
        HttpLlmProvider {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> ObbyResult<String> {
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.try_complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "llm completion attempt failed");
                    last_err = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt)).await;
                    }
                }
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }
}

impl HttpLlmProvider {
    async fn try_complete(&self, prompt: &str) -> ObbyResult<String> {
        let mut request = self.client.post(format!("{}/chat/completions", self.config.base_url)).json(
            &serde_json::json!({
                "model": self.config.model,
                "max_tokens": self.config.max_tokens,
                "temperature": self.config.temperature,
                "messages": [{"role": "user", "content": prompt}],
            }),
        );
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ObbyError::Llm(e.to_string()))?;
        let status = response.status();
        let body: serde_json::Value = response.json().await.map_err(|e| ObbyError::Llm(e.to_string()))?;

        if !status.is_success() {
            return Err(ObbyError::Llm(format!("provider returned {status}: {body}")));
        }

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ObbyError::Llm("missing choices[0].message.content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_config_debug_never_prints_the_api_key() {
        let config = ProviderConfig::new("http://localhost:1234/v1", "gpt-4o-mini")
            .api_key(Some("sk-super-secret".to_string()));
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-super-secret"));
        assert!(rendered.contains("has_api_key: true"));
    }

    #[test]
    fn temperature_is_clamped() {
        let config = ProviderConfig::new("http://localhost", "m").temperature(5.0);
        assert_eq!(config.temperature, 2.0);
    }
}
