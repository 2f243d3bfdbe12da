//! The Generator node: prompt, call the LLM, extract and validate.

use std::sync::Arc;

use async_trait::async_trait;
use thoughts::{
    AttemptContext, AttemptRecord, Cardinality, ConfigurationError, EngineConfig, InputRequirement,
    InputSpec, LlmClient, LlmConfig, Node, NodeCore, NodeFailure, NodeId, NodeInputs, NodeOutcome,
    Operation, PreparedInputs, Thought, ThoughtId, ThoughtKind,
};

use crate::extract::{extract_json, split_payload};
use crate::prompt::{output_format_instruction, render_prompt, TaskTemplate};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures a [`Generator`].
///
/// ```no_run
/// # use std::sync::Arc;
/// # use nodes::Generator;
/// # use thoughts::{EngineConfig, LlmClient, LlmConfig, NodeId, ThoughtKind};
/// # fn demo(llm: Arc<dyn LlmClient>, text: Arc<ThoughtKind>, summary: Arc<ThoughtKind>) {
/// let node = Generator::builder(
///     NodeId::new("summarize").unwrap(),
///     "Summarize {doc.body} in one sentence.",
///     summary,
/// )
/// .input("doc", text)
/// .build(llm, Arc::new(LlmConfig::new("llama3.2")), EngineConfig::default())
/// .unwrap();
/// # }
/// ```
#[derive(Debug)]
#[must_use]
pub struct GeneratorBuilder {
    node_id: NodeId,
    instruction: String,
    output_kind: Arc<ThoughtKind>,
    inputs: Vec<InputRequirement>,
    cardinality: Cardinality,
}

impl GeneratorBuilder {
    /// Declares a named input of the given kind.
    pub fn input(mut self, name: impl Into<String>, kind: Arc<ThoughtKind>) -> Self {
        self.inputs.push(InputRequirement {
            name: name.into(),
            kind,
        });
        self
    }

    /// Sets the number of outputs per run. Defaults to one.
    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Validates the declaration and builds the node.
    pub fn build(
        self,
        llm: Arc<dyn LlmClient>,
        llm_config: Arc<LlmConfig>,
        engine: EngineConfig,
    ) -> Result<Generator, ConfigurationError> {
        for (i, req) in self.inputs.iter().enumerate() {
            if self.inputs[..i].iter().any(|r| r.name == req.name) {
                return Err(ConfigurationError::DuplicateInput(req.name.clone()));
            }
        }
        if self.cardinality == Cardinality::Exactly(0) {
            return Err(ConfigurationError::ZeroCount {
                what: "output cardinality",
            });
        }
        let template = TaskTemplate::parse(self.instruction, &self.inputs)?;
        let format_instruction =
            output_format_instruction(self.output_kind.schema(), self.cardinality);

        Ok(Generator {
            core: NodeCore::new(self.node_id, llm_config, engine)?,
            op: GenerateOp {
                llm,
                template,
                inputs: self.inputs,
                output_kind: self.output_kind,
                cardinality: self.cardinality,
                format_instruction,
                next_seq: 0,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Produces new Thoughts from its inputs with one LLM call per attempt.
///
/// Unparsable output, schema violations, wrong item counts and LLM call
/// failures all count against the retry budget.
pub struct Generator {
    core: NodeCore,
    op: GenerateOp,
}

impl Generator {
    /// Starts configuring a generator.
    pub fn builder(
        node_id: NodeId,
        task_instruction: impl Into<String>,
        output_kind: Arc<ThoughtKind>,
    ) -> GeneratorBuilder {
        GeneratorBuilder {
            node_id,
            instruction: task_instruction.into(),
            output_kind,
            inputs: Vec::new(),
            cardinality: Cardinality::ONE,
        }
    }

    /// The task instruction as written, placeholders unsubstituted.
    pub fn task_instruction(&self) -> &str {
        self.op.template.as_str()
    }

    /// Declared inputs in declaration order.
    pub fn mapping(&self) -> &[InputRequirement] {
        &self.op.inputs
    }

    /// LLM settings used for every call this node makes.
    pub fn llm_config(&self) -> &Arc<LlmConfig> {
        self.core.llm_config()
    }

    /// Attempts made by the most recent `process`.
    pub fn attempts(&self) -> &[AttemptRecord] {
        self.core.attempts()
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("node_id", self.core.node_id())
            .field("task_instruction", &self.task_instruction())
            .field("output_kind", &self.op.output_kind.name())
            .field("cardinality", &self.op.cardinality)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Node for Generator {
    fn node_id(&self) -> &NodeId {
        self.core.node_id()
    }

    fn input_thoughts(&self) -> InputSpec {
        self.op.input_spec()
    }

    fn output_thought_kind(&self) -> Arc<ThoughtKind> {
        Arc::clone(&self.op.output_kind)
    }

    fn output_cardinality(&self) -> Cardinality {
        self.op.cardinality
    }

    fn outcome(&self) -> &NodeOutcome {
        self.core.outcome()
    }

    async fn process(&mut self, inputs: &NodeInputs) -> NodeOutcome {
        self.core.run(&mut self.op, inputs).await
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

struct GenerateOp {
    llm: Arc<dyn LlmClient>,
    template: TaskTemplate,
    inputs: Vec<InputRequirement>,
    output_kind: Arc<ThoughtKind>,
    cardinality: Cardinality,
    format_instruction: String,
    // Never reset, so output ids stay unique across invocations.
    next_seq: u64,
}

#[async_trait]
impl Operation for GenerateOp {
    fn input_spec(&self) -> InputSpec {
        InputSpec::Named(self.inputs.clone())
    }

    fn output_kind(&self) -> &Arc<ThoughtKind> {
        &self.output_kind
    }

    fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    async fn attempt(
        &mut self,
        ctx: &AttemptContext<'_>,
        inputs: &PreparedInputs<'_>,
    ) -> Result<Vec<Thought>, NodeFailure> {
        let prompt = render_prompt(
            &self.template,
            &self.inputs,
            inputs,
            &self.format_instruction,
        )?;
        tracing::debug!(
            attempt = ctx.attempt,
            prompt_len = prompt.len(),
            model = %ctx.llm_config.model,
            "calling llm"
        );

        let response = self.llm.complete(&prompt, ctx.llm_config).await?;
        tracing::debug!(attempt = ctx.attempt, response_len = response.len(), "llm responded");

        let payload = extract_json(&response)?;
        split_payload(payload, self.cardinality)?
            .into_iter()
            .map(|values| {
                let id = ThoughtId::for_output(ctx.node_id, self.next_seq);
                self.next_seq += 1;
                Thought::validated(id, Arc::clone(&self.output_kind), values)
                    .map_err(NodeFailure::from)
            })
            .collect()
    }
}
