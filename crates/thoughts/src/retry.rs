//! The bounded-retry state machine shared by every node kind.
//!
//! A concrete node supplies an [`Operation`] (its core work, run once per
//! attempt) and delegates `process` to [`NodeCore::run`], which drives:
//!
//! ```text
//! Pending ──preflight ok──▶ Attempting ──ok──────────────▶ Success
//!    │                        │   ▲
//!    │                        │   └── Retrying ◀── recoverable, budget left
//!    │                        └── non-recoverable / budget spent ──▶ Failed
//!    └──missing / upstream error / mismatch──────────────────────▶ Failed
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::Instrument;

use crate::contract::same_kind;
use crate::{
    Cardinality, ConfigurationError, EngineConfig, FailureKind, InputSpec, InvocationId,
    LlmConfig, NodeFailure, NodeId, NodeInputs, NodeOutcome, PreparedInputs, RetryPolicy, Thought,
    ThoughtKind, Timestamp,
};

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Per-attempt context handed to an [`Operation`].
#[derive(Debug)]
pub struct AttemptContext<'a> {
    /// Node being run.
    pub node_id: &'a NodeId,
    /// Caller-owned LLM configuration.
    pub llm_config: &'a LlmConfig,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Attempt budget for this invocation.
    pub max_attempts: u32,
}

/// The core work of a node kind, run once per attempt.
///
/// An attempt never mutates its inputs, so a retry sees exactly what the
/// failed attempt saw.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Declared inputs, checked before the first attempt.
    fn input_spec(&self) -> InputSpec;

    /// Kind of every produced Thought.
    fn output_kind(&self) -> &Arc<ThoughtKind>;

    /// Outputs a successful attempt must produce.
    fn cardinality(&self) -> Cardinality;

    /// Runs the work once.
    async fn attempt(
        &mut self,
        ctx: &AttemptContext<'_>,
        inputs: &PreparedInputs<'_>,
    ) -> Result<Vec<Thought>, NodeFailure>;
}

// ---------------------------------------------------------------------------
// Attempt bookkeeping
// ---------------------------------------------------------------------------

/// State of one node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Not started.
    Pending,
    /// Running the operation.
    Attempting,
    /// Last attempt failed recoverably; another follows.
    Retrying,
    /// Finished with outputs.
    Success,
    /// Finished with an error.
    Failed,
}

/// Diagnostic record of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// When the attempt started.
    pub started_at: Timestamp,
    /// When it finished.
    pub finished_at: Timestamp,
    /// The failure, if the attempt failed.
    pub failure: Option<NodeFailure>,
}

// ---------------------------------------------------------------------------
// NodeCore
// ---------------------------------------------------------------------------

/// Identity, configuration and per-invocation state common to all node kinds.
#[derive(Debug)]
pub struct NodeCore {
    node_id: NodeId,
    llm_config: Arc<LlmConfig>,
    engine: EngineConfig,
    state: AttemptState,
    outcome: NodeOutcome,
    attempts: Vec<AttemptRecord>,
}

impl NodeCore {
    /// Creates the shared state for a node.
    pub fn new(
        node_id: NodeId,
        llm_config: Arc<LlmConfig>,
        engine: EngineConfig,
    ) -> Result<Self, ConfigurationError> {
        engine.validate()?;
        Ok(Self {
            node_id,
            llm_config,
            engine,
            state: AttemptState::Pending,
            outcome: NodeOutcome::Pending,
            attempts: Vec::new(),
        })
    }

    /// The node's identity.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Caller-owned LLM configuration.
    pub fn llm_config(&self) -> &Arc<LlmConfig> {
        &self.llm_config
    }

    /// Engine settings the node was built with.
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Result of the most recent invocation.
    pub fn outcome(&self) -> &NodeOutcome {
        &self.outcome
    }

    /// State machine position; `Success` or `Failed` after a completed run.
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Attempts made by the most recent invocation.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Runs `op` through preflight and the bounded-retry loop.
    ///
    /// Overwrites the previous outcome and attempt log. Always returns
    /// normally.
    pub async fn run<O: Operation + ?Sized>(
        &mut self,
        op: &mut O,
        inputs: &NodeInputs,
    ) -> NodeOutcome {
        let invocation = InvocationId::new_random();
        let span = tracing::info_span!(
            "node.process",
            node_id = %self.node_id,
            invocation_id = %invocation,
        );
        self.run_inner(op, inputs).instrument(span).await
    }

    async fn run_inner<O: Operation + ?Sized>(
        &mut self,
        op: &mut O,
        inputs: &NodeInputs,
    ) -> NodeOutcome {
        self.state = AttemptState::Pending;
        self.outcome = NodeOutcome::Pending;
        self.attempts.clear();

        let prepared = match PreparedInputs::check(&op.input_spec(), inputs) {
            Ok(prepared) => prepared,
            Err(failure) => {
                tracing::warn!(
                    kind = %failure.kind(),
                    error = failure.message(),
                    "input preflight failed; no attempt made"
                );
                return self.finish_failed(&failure);
            }
        };

        let max_attempts = self.engine.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.state = AttemptState::Attempting;
            let started_at = Timestamp::now();
            tracing::debug!(attempt, max_attempts, "attempt started");

            let ctx = AttemptContext {
                node_id: &self.node_id,
                llm_config: &self.llm_config,
                attempt,
                max_attempts,
            };
            let result = match op.attempt(&ctx, &prepared).await {
                Ok(outputs) => check_outputs(op.output_kind(), op.cardinality(), outputs),
                Err(failure) => Err(failure),
            };

            match result {
                Ok(outputs) => {
                    self.attempts.push(AttemptRecord {
                        attempt,
                        started_at,
                        finished_at: Timestamp::now(),
                        failure: None,
                    });
                    tracing::info!(attempt, outputs = outputs.len(), "node succeeded");
                    self.state = AttemptState::Success;
                    self.outcome = NodeOutcome::Success { outputs };
                    return self.outcome.clone();
                }
                Err(failure) => {
                    self.attempts.push(AttemptRecord {
                        attempt,
                        started_at,
                        finished_at: Timestamp::now(),
                        failure: Some(failure.clone()),
                    });
                    match failure.retry_policy() {
                        RetryPolicy::Retryable { after } if attempt < max_attempts => {
                            self.state = AttemptState::Retrying;
                            tracing::warn!(
                                attempt,
                                max_attempts,
                                kind = %failure.kind(),
                                error = failure.message(),
                                "attempt failed; retrying"
                            );
                            let delay = after
                                .unwrap_or(self.engine.retry.backoff)
                                .min(self.engine.retry.max_backoff);
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            attempt += 1;
                        }
                        _ => {
                            tracing::warn!(
                                attempt,
                                kind = %failure.kind(),
                                error = failure.message(),
                                "node failed"
                            );
                            return self.finish_failed(&failure);
                        }
                    }
                }
            }
        }
    }

    fn finish_failed(&mut self, failure: &NodeFailure) -> NodeOutcome {
        self.state = AttemptState::Failed;
        self.outcome = NodeOutcome::failed(failure);
        self.outcome.clone()
    }
}

/// Every output must be of the declared kind, pass its schema, and the count
/// must match the declared cardinality.
fn check_outputs(
    kind: &Arc<ThoughtKind>,
    cardinality: Cardinality,
    outputs: Vec<Thought>,
) -> Result<Vec<Thought>, NodeFailure> {
    for thought in &outputs {
        if !same_kind(thought.kind(), kind) {
            return Err(NodeFailure::new(
                FailureKind::Validation,
                format!(
                    "output '{}' has kind '{}', expected '{}'",
                    thought.id(),
                    thought.kind().name(),
                    kind.name()
                ),
            ));
        }
        thought.validate()?;
    }
    if !cardinality.accepts(outputs.len()) {
        return Err(NodeFailure::new(
            FailureKind::Cardinality,
            format!("expected {cardinality} outputs, got {}", outputs.len()),
        ));
    }
    Ok(outputs)
}
