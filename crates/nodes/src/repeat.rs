//! The Repeat node: run an embedded Generator k times and concatenate.

use std::sync::Arc;

use async_trait::async_trait;
use thoughts::{
    AttemptContext, Cardinality, ConfigurationError, EngineConfig, FailureKind, InputSpec, Node,
    NodeCore, NodeFailure, NodeId, NodeInputs, NodeOutcome, Operation, PreparedInputs, Thought,
    ThoughtKind,
};

use crate::Generator;

/// Runs an embedded [`Generator`] `k` times on the same inputs.
///
/// Outputs are concatenated in run order. The first failed run stops the
/// repetition; Repeat then fails with the generator's kind and message and
/// discards everything produced so far. The generator has already spent its
/// own retry budget, so that failure is not retried again here.
pub struct Repeat {
    core: NodeCore,
    op: RepeatOp,
}

impl Repeat {
    /// Wraps `generator`, sharing its LLM configuration.
    pub fn new(
        node_id: NodeId,
        generator: Generator,
        k: usize,
        engine: EngineConfig,
    ) -> Result<Self, ConfigurationError> {
        if k == 0 {
            return Err(ConfigurationError::ZeroCount {
                what: "repeat count",
            });
        }
        let llm_config = Arc::clone(generator.llm_config());
        Ok(Self {
            core: NodeCore::new(node_id, llm_config, engine)?,
            op: RepeatOp {
                kind: generator.output_thought_kind(),
                generator,
                k,
            },
        })
    }

    /// Number of runs per invocation.
    pub fn count(&self) -> usize {
        self.op.k
    }

    /// The embedded generator, holding the state of its last run.
    pub fn generator(&self) -> &Generator {
        &self.op.generator
    }
}

impl std::fmt::Debug for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repeat")
            .field("node_id", self.core.node_id())
            .field("k", &self.op.k)
            .field("generator", &self.op.generator)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Node for Repeat {
    fn node_id(&self) -> &NodeId {
        self.core.node_id()
    }

    fn input_thoughts(&self) -> InputSpec {
        self.op.input_spec()
    }

    fn output_thought_kind(&self) -> Arc<ThoughtKind> {
        Arc::clone(&self.op.kind)
    }

    fn output_cardinality(&self) -> Cardinality {
        self.op.cardinality()
    }

    fn outcome(&self) -> &NodeOutcome {
        self.core.outcome()
    }

    async fn process(&mut self, inputs: &NodeInputs) -> NodeOutcome {
        self.core.run(&mut self.op, inputs).await
    }
}

struct RepeatOp {
    generator: Generator,
    kind: Arc<ThoughtKind>,
    k: usize,
}

#[async_trait]
impl Operation for RepeatOp {
    fn input_spec(&self) -> InputSpec {
        self.generator.input_thoughts()
    }

    fn output_kind(&self) -> &Arc<ThoughtKind> {
        &self.kind
    }

    fn cardinality(&self) -> Cardinality {
        self.generator.output_cardinality().times(self.k)
    }

    async fn attempt(
        &mut self,
        _ctx: &AttemptContext<'_>,
        inputs: &PreparedInputs<'_>,
    ) -> Result<Vec<Thought>, NodeFailure> {
        let mut outputs = Vec::new();
        for run in 1..=self.k {
            tracing::debug!(run, of = self.k, "starting repetition");
            match self.generator.process(inputs.source()).await {
                NodeOutcome::Success { outputs: produced } => outputs.extend(produced),
                other => {
                    let kind = other.failure_kind().unwrap_or(FailureKind::UpstreamError);
                    let message = other
                        .error_message()
                        .unwrap_or("embedded generator did not complete")
                        .to_string();
                    tracing::debug!(run, %kind, "repetition failed; stopping");
                    return Err(NodeFailure::new(kind, message).into_terminal());
                }
            }
        }
        Ok(outputs)
    }
}
