//! Configuration values handed to nodes at construction.
//!
//! These are plain serde types; reading them from files or the environment is
//! the embedding application's concern.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// Default number of attempts a node makes before failing.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default ceiling on any single delay between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// LLM model and sampling options.
///
/// Owned by the caller and read-only to nodes; one value may be shared by any
/// number of node instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier, e.g. `"mistral:instruct"`.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens. `None` leaves it to the backend.
    pub max_tokens: Option<u32>,
    /// Per-request timeout. A timeout is a recoverable LLM call failure.
    #[serde(with = "opt_secs")]
    pub timeout: Option<Duration>,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Penalty applied to repeated tokens.
    pub repeat_penalty: f32,
    /// Context window size in tokens.
    pub num_ctx: u32,
}

impl LlmConfig {
    /// Creates a configuration for `model` with default sampling options.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.1,
            max_tokens: None,
            timeout: None,
            top_p: 0.9,
            repeat_penalty: 1.2,
            num_ctx: 4096,
        }
    }
}

/// Bounded-retry settings shared by every node kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per `process` invocation, including the first.
    pub max_attempts: u32,
    /// Delay between attempts when the failure carries no delay of its own.
    #[serde(with = "secs")]
    pub backoff: Duration,
    /// Upper bound on any delay, including one requested by the server.
    #[serde(with = "secs")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::ZERO,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Process-wide engine settings given to each node at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry budget and back-off.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Returns an error if the configuration cannot drive a node.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::ZeroCount {
                what: "retry max_attempts",
            });
        }
        Ok(())
    }

    /// Shorthand for a configuration with the given retry budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            retry: RetryConfig {
                max_attempts,
                ..RetryConfig::default()
            },
        }
    }
}

// Durations are written as fractional seconds in configuration documents.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = LlmConfig::new("mistral:instruct");
        assert_eq!(cfg.model, "mistral:instruct");
        assert_eq!(cfg.temperature, 0.1);
        assert_eq!(cfg.num_ctx, 4096);
        assert_eq!(EngineConfig::default().retry.max_attempts, 3);
    }

    #[test]
    fn deserializes_partial_documents() {
        let cfg: LlmConfig =
            serde_json::from_value(json!({"model": "llama3.2", "timeout": 1.5})).unwrap();
        assert_eq!(cfg.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(cfg.top_p, 0.9);

        let engine: EngineConfig =
            serde_json::from_value(json!({"retry": {"max_attempts": 5}})).unwrap();
        assert_eq!(engine.retry.max_attempts, 5);
        assert_eq!(engine.retry.backoff, Duration::ZERO);
        assert_eq!(engine.retry.max_backoff, DEFAULT_MAX_BACKOFF);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = EngineConfig::with_max_attempts(0).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::ZeroCount { .. }));
        assert!(EngineConfig::with_max_attempts(1).validate().is_ok());
    }
}
