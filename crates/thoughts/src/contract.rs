//! The node execution contract.
//!
//! Every node kind implements [`Node`]. A graph executor feeds a node
//! [`NodeInputs`] and reads back a [`NodeOutcome`]; it never needs to know
//! which concrete kind it is driving.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{Cardinality, FailureKind, NodeFailure, NodeId, Thought, ThoughtKind};

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// A unit of work in a thought graph.
///
/// `process` never panics or returns an error: every failure ends up in the
/// returned (and stored) [`NodeOutcome::Failed`]. Each invocation starts from
/// scratch; nothing carries over from a previous run.
#[async_trait]
pub trait Node: Send + Sync {
    /// The node's identity.
    fn node_id(&self) -> &NodeId;

    /// Thought kinds this node requires as inputs.
    fn input_thoughts(&self) -> InputSpec;

    /// Kind of every Thought this node produces.
    fn output_thought_kind(&self) -> Arc<ThoughtKind>;

    /// Number of outputs a successful run produces.
    fn output_cardinality(&self) -> Cardinality;

    /// Result of the most recent `process` invocation.
    fn outcome(&self) -> &NodeOutcome;

    /// Runs the node to completion on `inputs`.
    async fn process(&mut self, inputs: &NodeInputs) -> NodeOutcome;

    /// Outputs of the last run; empty unless it succeeded.
    fn outputs(&self) -> &[Thought] {
        self.outcome().outputs()
    }

    /// `true` if the last run ended in failure.
    fn has_error(&self) -> bool {
        self.outcome().has_error()
    }

    /// Failure description of the last run, if it failed.
    fn error_message(&self) -> Option<&str> {
        self.outcome().error_message()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal state of a node invocation.
///
/// Outputs are non-empty exactly when the run succeeded; the two arms are
/// mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The node has not completed a run yet.
    #[default]
    Pending,
    /// The run produced validated outputs.
    Success {
        /// Output Thoughts in production order.
        outputs: Vec<Thought>,
    },
    /// The run failed; no outputs are exposed.
    Failed {
        /// Kind of the final failure.
        kind: FailureKind,
        /// Description of the final failure.
        message: String,
    },
}

impl NodeOutcome {
    /// Builds the failed arm from a failure.
    pub fn failed(failure: &NodeFailure) -> Self {
        Self::Failed {
            kind: failure.kind(),
            message: failure.message().to_string(),
        }
    }

    /// Outputs, empty unless successful.
    pub fn outputs(&self) -> &[Thought] {
        match self {
            Self::Success { outputs } => outputs,
            _ => &[],
        }
    }

    /// `true` for the failed arm.
    pub fn has_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// `true` for the success arm.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure message, if failed.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Failure kind, if failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Input declarations
// ---------------------------------------------------------------------------

/// One named input a node requires.
#[derive(Debug, Clone)]
pub struct InputRequirement {
    /// Name the caller must supply the Thought under.
    pub name: String,
    /// Required Thought kind.
    pub kind: Arc<ThoughtKind>,
}

/// Inputs a node declares, checked before any work is attempted.
#[derive(Debug, Clone)]
pub enum InputSpec {
    /// Exactly these named inputs, in declaration order; no others.
    Named(Vec<InputRequirement>),
    /// One or more inputs under any names, all of this kind.
    AnyOf(Arc<ThoughtKind>),
}

impl InputSpec {
    /// The set of distinct kinds this spec accepts, in declaration order.
    pub fn kinds(&self) -> Vec<Arc<ThoughtKind>> {
        match self {
            Self::Named(reqs) => {
                let mut kinds: Vec<Arc<ThoughtKind>> = Vec::new();
                for req in reqs {
                    if !kinds.iter().any(|k| same_kind(k, &req.kind)) {
                        kinds.push(Arc::clone(&req.kind));
                    }
                }
                kinds
            }
            Self::AnyOf(kind) => vec![Arc::clone(kind)],
        }
    }
}

pub(crate) fn same_kind(a: &Arc<ThoughtKind>, b: &Arc<ThoughtKind>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One entry fed into a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A Thought produced upstream or supplied by the caller.
    Thought(Thought),
    /// The upstream node that should have produced this input failed.
    Failed {
        /// The failed upstream node.
        node_id: NodeId,
        /// Its error message.
        message: String,
    },
}

/// Ordered, name-keyed collection of inputs.
///
/// Insertion order is the caller-supplied order nodes such as KeepBest rely on
/// for tie-breaking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs {
    entries: Vec<(String, Input)>,
}

impl NodeInputs {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Self::insert`] for a Thought.
    pub fn with_thought(mut self, name: impl Into<String>, thought: Thought) -> Self {
        self.insert(name, Input::Thought(thought));
        self
    }

    /// Inserts `input` under `name`, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, input: Input) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = input,
            None => self.entries.push((name, input)),
        }
    }

    /// Feeds `node`'s last outcome into the input `name`.
    ///
    /// A successful node contributes its first output, a failed node a
    /// [`Input::Failed`] entry. A node that has not run contributes nothing,
    /// so the input is reported missing.
    pub fn insert_from(&mut self, name: impl Into<String>, node: &dyn Node) {
        match node.outcome() {
            NodeOutcome::Success { outputs } => {
                if let Some(first) = outputs.first() {
                    self.insert(name, Input::Thought(first.clone()));
                }
            }
            NodeOutcome::Failed { message, .. } => self.insert(
                name,
                Input::Failed {
                    node_id: node.node_id().clone(),
                    message: message.clone(),
                },
            ),
            NodeOutcome::Pending => {}
        }
    }

    /// Fans out every output of `node` as `{prefix}_0`, `{prefix}_1`, …
    ///
    /// This is how a multi-output node feeds a node that accepts any number of
    /// same-kind inputs. A failed node yields a single failed `prefix` entry.
    pub fn from_outputs(prefix: &str, node: &dyn Node) -> Self {
        let mut inputs = Self::new();
        match node.outcome() {
            NodeOutcome::Success { outputs } => {
                for (i, thought) in outputs.iter().enumerate() {
                    inputs.insert(format!("{prefix}_{i}"), Input::Thought(thought.clone()));
                }
            }
            NodeOutcome::Failed { message, .. } => inputs.insert(
                prefix,
                Input::Failed {
                    node_id: node.node_id().clone(),
                    message: message.clone(),
                },
            ),
            NodeOutcome::Pending => {}
        }
        inputs
    }

    /// Looks up an input by name.
    pub fn get(&self, name: &str) -> Option<&Input> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, input)| input)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.entries.iter().map(|(n, i)| (n.as_str(), i))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Preflight
// ---------------------------------------------------------------------------

/// Inputs that passed preflight: every declared input is present, healthy and
/// of the declared kind.
#[derive(Debug)]
pub struct PreparedInputs<'a> {
    source: &'a NodeInputs,
    thoughts: Vec<(&'a str, &'a Thought)>,
}

impl<'a> PreparedInputs<'a> {
    /// Checks `inputs` against `spec`, failing on the first offending input.
    ///
    /// Missing, failed and mismatched inputs are never retried.
    pub fn check(spec: &InputSpec, inputs: &'a NodeInputs) -> Result<Self, NodeFailure> {
        let thoughts = match spec {
            InputSpec::Named(reqs) => {
                let mut thoughts = Vec::with_capacity(reqs.len());
                for req in reqs {
                    let (name, input) = inputs
                        .entries
                        .iter()
                        .find(|(n, _)| *n == req.name)
                        .ok_or_else(|| {
                            NodeFailure::new(
                                FailureKind::MissingInput,
                                format!("required input '{}' is missing", req.name),
                            )
                        })?;
                    thoughts.push((name.as_str(), healthy(name, input, &req.kind)?));
                }
                if let Some((name, _)) = inputs
                    .entries
                    .iter()
                    .find(|(n, _)| !reqs.iter().any(|r| r.name == *n))
                {
                    return Err(NodeFailure::new(
                        FailureKind::InputMismatch,
                        format!("input '{name}' is not declared by this node"),
                    ));
                }
                thoughts
            }
            InputSpec::AnyOf(kind) => {
                if inputs.is_empty() {
                    return Err(NodeFailure::new(
                        FailureKind::MissingInput,
                        format!("at least one '{}' input is required", kind.name()),
                    ));
                }
                inputs
                    .entries
                    .iter()
                    .map(|(name, input)| Ok((name.as_str(), healthy(name, input, kind)?)))
                    .collect::<Result<Vec<_>, NodeFailure>>()?
            }
        };
        Ok(Self {
            source: inputs,
            thoughts,
        })
    }

    /// The raw inputs these were prepared from.
    pub fn source(&self) -> &'a NodeInputs {
        self.source
    }

    /// Looks up a prepared Thought by name.
    pub fn get(&self, name: &str) -> Option<&'a Thought> {
        self.thoughts
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
    }

    /// Like [`Self::get`] but reports an absent input as a failure.
    pub fn require(&self, name: &str) -> Result<&'a Thought, NodeFailure> {
        self.get(name).ok_or_else(|| {
            NodeFailure::new(
                FailureKind::MissingInput,
                format!("required input '{name}' is missing"),
            )
        })
    }

    /// Prepared Thoughts in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Thought)> + '_ {
        self.thoughts.iter().copied()
    }

    /// Number of prepared Thoughts.
    pub fn len(&self) -> usize {
        self.thoughts.len()
    }

    /// `true` if nothing was prepared.
    pub fn is_empty(&self) -> bool {
        self.thoughts.is_empty()
    }
}

fn healthy<'a>(
    name: &str,
    input: &'a Input,
    kind: &Arc<ThoughtKind>,
) -> Result<&'a Thought, NodeFailure> {
    match input {
        Input::Failed { node_id, message } => Err(NodeFailure::new(
            FailureKind::UpstreamError,
            format!("input '{name}' failed upstream in node '{node_id}': {message}"),
        )),
        Input::Thought(t) if !same_kind(t.kind(), kind) => Err(NodeFailure::new(
            FailureKind::InputMismatch,
            format!(
                "input '{name}' has kind '{}', expected '{}'",
                t.kind().name(),
                kind.name()
            ),
        )),
        Input::Thought(t) => Ok(t),
    }
}
