//! Error, failure-taxonomy and retry-policy types for the node contract.
//!
//! [`NodeFailure`] is the only error that reaches a node's terminal state. It is
//! never raised across the node boundary; callers observe it through
//! [`crate::NodeOutcome::Failed`]. Component errors ([`ValidationError`],
//! [`crate::LlmError`], [`ScoringError`]) convert into it with the matching
//! [`FailureKind`].
//!
//! [`RetryPolicy`] is a cross-cutting concern: every failure must be able to
//! produce one so the bounded-retry loop can decide whether to re-attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::LlmError;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a failure is safe to retry and, if so, after what delay.
///
/// - `Retryable` failures: LLM call failures, malformed output, schema
///   violations, cardinality mismatches, scoring errors.
/// - `NonRetryable` failures: missing or erroneous inputs, adopted failures
///   of an embedded node that already spent its own budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// node's configured back-off (zero by default).
        after: Option<Duration>,
    },
    /// The operation must not be retried; the node goes straight to `Failed`.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Kind of failure recorded in a node's terminal [`crate::NodeOutcome::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A required input Thought was absent from the call.
    MissingInput,
    /// A required input carries an upstream node's failure.
    UpstreamError,
    /// An input was not declared by the node or has the wrong Thought kind.
    InputMismatch,
    /// Transport, timeout or quota failure from the LLM client.
    LlmCall,
    /// The LLM output could not be parsed into the expected payload.
    Extraction,
    /// The parsed payload failed Thought schema validation.
    Validation,
    /// The number of produced Thoughts does not match the declared cardinality.
    Cardinality,
    /// A pluggable scorer failed on one of the inputs.
    Scoring,
}

impl FailureKind {
    /// Returns `true` if failures of this kind are consumed by the retry loop.
    pub fn is_recoverable(self) -> bool {
        !matches!(
            self,
            Self::MissingInput | Self::UpstreamError | Self::InputMismatch
        )
    }

    /// Stable name used in error messages and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingInput => "MissingInputError",
            Self::UpstreamError => "UpstreamErrorPropagated",
            Self::InputMismatch => "InputMismatchError",
            Self::LlmCall => "LLMCallError",
            Self::Extraction => "ExtractionError",
            Self::Validation => "ValidationError",
            Self::Cardinality => "CardinalityError",
            Self::Scoring => "ScoringError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed attempt, or the final failure of a node invocation.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct NodeFailure {
    kind: FailureKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_after: Option<Duration>,
    #[serde(default)]
    terminal: bool,
}

impl NodeFailure {
    /// Creates a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            terminal: false,
        }
    }

    /// Requests a minimum delay before the next attempt.
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    /// Marks this failure as final regardless of its kind.
    ///
    /// Used when a node adopts the terminal failure of an embedded node.
    pub fn into_terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Kind of this failure.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Decides whether the retry loop may re-attempt after this failure.
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.terminal || !self.kind.is_recoverable() {
            RetryPolicy::NonRetryable
        } else {
            RetryPolicy::Retryable {
                after: self.retry_after,
            }
        }
    }
}

impl From<ValidationError> for NodeFailure {
    fn from(err: ValidationError) -> Self {
        Self::new(FailureKind::Validation, err.to_string())
    }
}

impl From<ScoringError> for NodeFailure {
    fn from(err: ScoringError) -> Self {
        Self::new(FailureKind::Scoring, err.to_string())
    }
}

impl From<LlmError> for NodeFailure {
    fn from(err: LlmError) -> Self {
        let after = err.retry_after();
        let failure = Self::new(FailureKind::LlmCall, err.to_string());
        match after {
            Some(after) => failure.with_retry_after(after),
            None => failure,
        }
    }
}

// ---------------------------------------------------------------------------
// Schema validation
// ---------------------------------------------------------------------------

/// One field of a Thought's values that violates its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Slash-separated path of the offending field (e.g. `"topics/0/source"`).
    ///
    /// `"<root>"` when the violation concerns the values object as a whole.
    pub field: String,
    /// Description of the violated constraint.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Thought values failed their kind's schema.
///
/// Lists every violation, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error(
    "'{kind}' values violate {} constraint(s): {}",
    .violations.len(),
    join_violations(.violations)
)]
pub struct ValidationError {
    /// Name of the Thought kind whose schema was violated.
    pub kind: String,
    /// Every violated field, in the order the validator reported them.
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Returns the distinct violated field paths.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for v in &self.violations {
            if !fields.contains(&v.field.as_str()) {
                fields.push(&v.field);
            }
        }
        fields
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// A pluggable scorer could not score a Thought.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scoring failed: {0}")]
pub struct ScoringError(pub String);

// ---------------------------------------------------------------------------
// Construction-time errors
// ---------------------------------------------------------------------------

/// A node or Thought kind was configured inconsistently.
///
/// Produced at construction time; a node is never built from an invalid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The JSON Schema bound to a Thought kind does not compile.
    #[error("schema for thought kind '{kind}' is invalid: {reason}")]
    InvalidSchema {
        /// Thought kind name.
        kind: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// A `{input.field}` placeholder refers to an input the node does not declare.
    #[error("placeholder '{{{placeholder}}}' refers to undeclared input; declared: {declared:?}")]
    UnknownPlaceholder {
        /// The offending placeholder without braces.
        placeholder: String,
        /// Input names the node declares.
        declared: Vec<String>,
    },

    /// The same input name was declared twice.
    #[error("input '{0}' is declared more than once")]
    DuplicateInput(String),

    /// A count that must be strictly positive was zero.
    #[error("{what} must be at least 1")]
    ZeroCount {
        /// Which count was zero (e.g. `"repeat count"`).
        what: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_failures_are_never_retried() {
        for kind in [
            FailureKind::MissingInput,
            FailureKind::UpstreamError,
            FailureKind::InputMismatch,
        ] {
            assert_eq!(
                NodeFailure::new(kind, "x").retry_policy(),
                RetryPolicy::NonRetryable
            );
        }
    }

    #[test]
    fn work_failures_are_retryable() {
        for kind in [
            FailureKind::LlmCall,
            FailureKind::Extraction,
            FailureKind::Validation,
            FailureKind::Cardinality,
            FailureKind::Scoring,
        ] {
            assert_eq!(
                NodeFailure::new(kind, "x").retry_policy(),
                RetryPolicy::Retryable { after: None }
            );
        }
    }

    #[test]
    fn terminal_failure_overrides_kind() {
        let f = NodeFailure::new(FailureKind::LlmCall, "quota").into_terminal();
        assert_eq!(f.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(f.kind(), FailureKind::LlmCall);
    }

    #[test]
    fn rate_limit_delay_carries_into_policy() {
        let f = NodeFailure::from(LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        });
        assert_eq!(f.kind(), FailureKind::LlmCall);
        assert_eq!(
            f.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(2))
            }
        );
    }

    #[test]
    fn validation_error_lists_every_violation() {
        let err = ValidationError {
            kind: "summary".into(),
            violations: vec![
                Violation {
                    field: "title".into(),
                    message: "missing".into(),
                },
                Violation {
                    field: "body".into(),
                    message: "not a string".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "'summary' values violate 2 constraint(s): title: missing; body: not a string"
        );
        assert!(std::error::Error::source(&err).is_none());
        assert_eq!(err.fields(), vec!["title", "body"]);
    }

    #[test]
    fn failure_display_names_the_kind() {
        let f = NodeFailure::new(FailureKind::Extraction, "no JSON object found");
        assert_eq!(f.to_string(), "ExtractionError: no JSON object found");
    }
}
