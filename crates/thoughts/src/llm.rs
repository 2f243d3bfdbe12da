//! LLM client port.
//!
//! Nodes see only [`LlmClient`]. Transports (HTTP, local runtimes, test
//! doubles) live in infrastructure crates and implement this trait.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::LlmConfig;

/// Sends one rendered prompt to a model and returns the raw response text.
///
/// A single call is one attempt. Implementations must not retry internally;
/// the calling node's bounded-retry loop owns that decision.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Completes `prompt` using the model and options in `config`.
    async fn complete(&self, prompt: &str, config: &LlmConfig) -> Result<String, LlmError>;
}

/// Failure of a single LLM call. Every variant is recoverable by the node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// The request could not be sent or the connection dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected the request because of rate or quota limits.
    #[error("rate limited")]
    RateLimited {
        /// Server-supplied delay before the next attempt, when present.
        retry_after: Option<Duration>,
    },

    /// The backend answered with a non-success status.
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The backend answered successfully but the body was not understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Minimum delay requested by the backend before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
