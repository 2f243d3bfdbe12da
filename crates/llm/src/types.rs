//! Ollama `/api/generate` request/response bodies.

use serde::{Deserialize, Serialize};
use thoughts::LlmConfig;

/// Request body for a non-streaming completion.
#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    /// Always `false`; the client reads one JSON document back.
    pub stream: bool,
    pub options: GenerateOptions,
}

/// Sampling options understood by Ollama.
#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub num_ctx: u32,
    /// Ollama's name for the generated-token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl From<&LlmConfig> for GenerateOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            repeat_penalty: config.repeat_penalty,
            num_ctx: config.num_ctx,
            num_predict: config.max_tokens,
        }
    }
}

/// The fields of the response the client reads; the rest are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: Option<u64>,
}
