//! Test doubles for the [`LlmClient`] port.
//!
//! Enabled with the `test-utils` feature.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{LlmClient, LlmConfig, LlmError};

/// An LLM client that replays queued responses and records every prompt.
///
/// When the queue runs dry every further call fails with
/// [`LlmError::Transport`].
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    /// Create a client that replays `responses` in order.
    pub fn new(responses: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a client whose calls all succeed with the given texts.
    pub fn replying<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(t.into())))
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str, _config: &LlmConfig) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(LlmError::Transport("no scripted response left".into())))
    }
}
