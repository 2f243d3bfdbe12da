//! Ollama client struct and builder.

use async_trait::async_trait;
use thoughts::{LlmClient, LlmConfig, LlmError};

use crate::error::{map_http_status, map_reqwest_error};
use crate::types::{GenerateOptions, GenerateRequest, GenerateResponse};

/// Default Ollama API base URL.
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// [`LlmClient`] over Ollama's `/api/generate` endpoint.
///
/// The model and sampling options come from the [`LlmConfig`] passed to each
/// call, so one client can serve nodes configured for different models.
///
/// ```no_run
/// use llm::OllamaClient;
///
/// let client = OllamaClient::new().base_url("http://gpu-box:11434");
/// ```
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Creates a client for a local Ollama at `http://localhost:11434`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Uses a preconfigured HTTP client (proxies, TLS roots, pooling).
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub(crate) fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str, config: &LlmConfig) -> Result<String, LlmError> {
        let url = self.generate_url();
        let body = GenerateRequest {
            model: &config.model,
            prompt,
            stream: false,
            options: GenerateOptions::from(config),
        };

        tracing::debug!(
            url = %url,
            model = %config.model,
            prompt_len = prompt.len(),
            "sending generate request to Ollama"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(timeout) = config.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, config.timeout))?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, config.timeout))?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Ollama returned an error status");
            return Err(map_http_status(status, &headers, &text));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(format!("invalid JSON response: {e}")))?;
        tracing::debug!(
            response_len = parsed.response.len(),
            done = parsed.done,
            eval_count = parsed.eval_count,
            "received generate response"
        );
        Ok(parsed.response)
    }
}
