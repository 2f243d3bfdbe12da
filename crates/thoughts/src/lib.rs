//! Core domain for the thought graph engine.
//!
//! This crate contains the Thought data model, the node execution contract
//! every node kind satisfies, the shared bounded-retry state machine, and the
//! port trait through which nodes reach an LLM. Node kinds live in the
//! `nodes` crate; transports live in the `llm` crate.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network I/O.
//! It defines *what* a node needs; infrastructure crates define *how* to
//! supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`NodeId`, `ThoughtId`, `InvocationId`) |
//! | [`types`] | Shared value types (`Cardinality`, `Timestamp`) |
//! | [`errors`] | Failure taxonomy, validation errors, retry policy |
//! | [`config`] | `LlmConfig` and `EngineConfig` |
//! | [`thought`] | `ThoughtKind` and `Thought` |
//! | [`llm`] | The `LlmClient` port |
//! | [`contract`] | The `Node` trait, inputs and outcomes |
//! | [`retry`] | `NodeCore`, `Operation` and the retry loop |

pub mod config;
pub mod contract;
pub mod errors;
pub mod identifiers;
pub mod llm;
pub mod retry;
pub mod thought;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{EngineConfig, LlmConfig, RetryConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF};
pub use contract::{
    Input, InputRequirement, InputSpec, Node, NodeInputs, NodeOutcome, PreparedInputs,
};
pub use errors::{
    ConfigurationError, FailureKind, NodeFailure, RetryPolicy, ScoringError, ValidationError,
    Violation,
};
pub use identifiers::{InvocationId, NodeId, ThoughtId};
pub use llm::{LlmClient, LlmError};
pub use retry::{AttemptContext, AttemptRecord, AttemptState, NodeCore, Operation};
pub use thought::{Thought, ThoughtKind};
pub use types::{Cardinality, Timestamp};
