//! The KeepBest node: select the highest-ranked of several same-kind inputs.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use thoughts::{
    AttemptContext, Cardinality, ConfigurationError, EngineConfig, FailureKind, InputSpec,
    LlmConfig, Node, NodeCore, NodeFailure, NodeId, NodeInputs, NodeOutcome, Operation,
    PreparedInputs, Thought, ThoughtId, ThoughtKind,
};

use crate::scoring::{Scorer, Scores};

/// Reduces its inputs to the single best one.
///
/// Accepts any number of inputs of one kind, under any names. The output is
/// the winning input itself, not a copy: `outputs()[0].same_as(winner)`.
/// Ties keep the earlier input in caller order.
pub struct KeepBest {
    core: NodeCore,
    op: SelectOp,
}

impl KeepBest {
    /// Creates a node selecting among inputs of `kind` ranked by `scorer`.
    pub fn new(
        node_id: NodeId,
        kind: Arc<ThoughtKind>,
        scorer: impl Scorer + 'static,
        llm_config: Arc<LlmConfig>,
        engine: EngineConfig,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            core: NodeCore::new(node_id, llm_config, engine)?,
            op: SelectOp {
                kind,
                scorer: Box::new(scorer),
                scored: Vec::new(),
            },
        })
    }

    /// Scores computed by the last attempt of the most recent `process`, in
    /// input order. Empty when that invocation failed its input check.
    pub fn scored(&self) -> &[(ThoughtId, Scores)] {
        &self.op.scored
    }
}

impl std::fmt::Debug for KeepBest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepBest")
            .field("node_id", self.core.node_id())
            .field("kind", &self.op.kind.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Node for KeepBest {
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
        Cardinality::ONE
    }

    fn outcome(&self) -> &NodeOutcome {
        self.core.outcome()
    }

    async fn process(&mut self, inputs: &NodeInputs) -> NodeOutcome {
        self.op.scored.clear();
        self.core.run(&mut self.op, inputs).await
    }
}

struct SelectOp {
    kind: Arc<ThoughtKind>,
    scorer: Box<dyn Scorer>,
    scored: Vec<(ThoughtId, Scores)>,
}

#[async_trait]
impl Operation for SelectOp {
    fn input_spec(&self) -> InputSpec {
        InputSpec::AnyOf(Arc::clone(&self.kind))
    }

    fn output_kind(&self) -> &Arc<ThoughtKind> {
        &self.kind
    }

    fn cardinality(&self) -> Cardinality {
        Cardinality::ONE
    }

    async fn attempt(
        &mut self,
        _ctx: &AttemptContext<'_>,
        inputs: &PreparedInputs<'_>,
    ) -> Result<Vec<Thought>, NodeFailure> {
        self.scored.clear();
        let mut best: Option<(&Thought, usize)> = None;

        for (name, thought) in inputs.iter() {
            let scores = self.scorer.assign_scores(thought).map_err(|e| {
                NodeFailure::new(
                    FailureKind::Scoring,
                    format!("scoring input '{name}' failed: {}", e.0),
                )
            })?;
            if let Some((score, _)) = scores.iter().find(|(_, v)| v.is_nan()) {
                return Err(NodeFailure::new(
                    FailureKind::Scoring,
                    format!("score '{score}' of input '{name}' is NaN"),
                ));
            }
            self.scored.push((thought.id().clone(), scores));
            let index = self.scored.len() - 1;

            let better = match best {
                None => true,
                Some((_, best_index)) => {
                    self.scorer
                        .compare(&self.scored[index].1, &self.scored[best_index].1)
                        == Ordering::Greater
                }
            };
            if better {
                best = Some((thought, index));
            }
        }

        tracing::debug!(candidates = self.scored.len(), "inputs scored");
        Ok(best
            .map(|(thought, _)| vec![thought.clone()])
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};
    use thoughts::{Input, ScoringError};

    use super::*;
    use crate::scoring::{FnScorer, Ranking};

    fn candidate() -> Arc<ThoughtKind> {
        ThoughtKind::new(
            "candidate",
            json!({
                "type": "object",
                "required": ["s"],
                "properties": {"s": {"type": "number"}}
            }),
        )
        .unwrap()
    }

    fn thought(kind: &Arc<ThoughtKind>, id: &str, s: f64) -> Thought {
        let mut values = Map::new();
        values.insert("s".into(), json!(s));
        Thought::new(ThoughtId::new(id).unwrap(), Arc::clone(kind), values)
    }

    fn by_field() -> FnScorer<impl Fn(&Thought) -> Result<Scores, ScoringError> + Send + Sync> {
        FnScorer::new(|t: &Thought| {
            let s = t
                .get("s")
                .and_then(Value::as_f64)
                .ok_or_else(|| ScoringError("field 's' is not a number".into()))?;
            Ok(Scores::from([("s".to_string(), s)]))
        })
    }

    fn keeper(kind: &Arc<ThoughtKind>) -> KeepBest {
        KeepBest::new(
            NodeId::new("keep").unwrap(),
            Arc::clone(kind),
            by_field(),
            Arc::new(LlmConfig::default()),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn tie_keeps_the_earlier_input() {
        let kind = candidate();
        let inputs = NodeInputs::new()
            .with_thought("a", thought(&kind, "t1", 0.8))
            .with_thought("b", thought(&kind, "t2", 0.9))
            .with_thought("c", thought(&kind, "t3", 0.9));
        let mut node = keeper(&kind);

        let outcome = node.process(&inputs).await;

        assert_eq!(outcome.outputs().len(), 1);
        assert_eq!(outcome.outputs()[0].id().as_str(), "t2");
        assert_eq!(node.scored().len(), 3);
    }

    #[tokio::test]
    async fn output_is_the_winning_input_itself() {
        let kind = candidate();
        let winner = thought(&kind, "w", 5.0);
        let inputs = NodeInputs::new()
            .with_thought("x", thought(&kind, "l", 1.0))
            .with_thought("y", winner.clone());
        let mut node = keeper(&kind);

        node.process(&inputs).await;

        assert!(node.outputs()[0].same_as(&winner));
    }

    #[tokio::test]
    async fn single_input_wins() {
        let kind = candidate();
        let mut node = keeper(&kind);
        let outcome = node
            .process(&NodeInputs::new().with_thought("only", thought(&kind, "t", -3.0)))
            .await;
        assert_eq!(outcome.outputs()[0].id().as_str(), "t");
    }

    #[tokio::test]
    async fn custom_ranking_prefers_lowest_cost() {
        let kind = candidate();
        let scorer = FnScorer::new(|t: &Thought| {
            let cost = t.get("s").and_then(Value::as_f64).unwrap_or_default();
            Ok(Scores::from([("neg_cost".to_string(), -cost)]))
        })
        .with_ranking(Ranking::Sum);
        let mut node = KeepBest::new(
            NodeId::new("cheapest").unwrap(),
            Arc::clone(&kind),
            scorer,
            Arc::new(LlmConfig::default()),
            EngineConfig::default(),
        )
        .unwrap();
        let inputs = NodeInputs::new()
            .with_thought("a", thought(&kind, "pricey", 10.0))
            .with_thought("b", thought(&kind, "cheap", 2.0));

        let outcome = node.process(&inputs).await;

        assert_eq!(outcome.outputs()[0].id().as_str(), "cheap");
    }

    #[tokio::test]
    async fn scoring_failure_is_retried_then_reported() {
        let kind = candidate();
        let mut values = Map::new();
        values.insert("s".into(), json!("high"));
        let broken = Thought::new(ThoughtId::new("bad").unwrap(), Arc::clone(&kind), values);
        let mut node = KeepBest::new(
            NodeId::new("keep").unwrap(),
            Arc::clone(&kind),
            by_field(),
            Arc::new(LlmConfig::default()),
            EngineConfig::with_max_attempts(2),
        )
        .unwrap();

        let outcome = node
            .process(&NodeInputs::new().with_thought("x", broken))
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Scoring));
        assert!(node.error_message().is_some_and(|m| m.contains("'x'")));
        assert_eq!(node.core.attempts().len(), 2);
    }

    #[tokio::test]
    async fn nan_score_is_a_scoring_failure() {
        let kind = candidate();
        let scorer = FnScorer::new(|_: &Thought| Ok(Scores::from([("s".to_string(), f64::NAN)])));
        let mut node = KeepBest::new(
            NodeId::new("keep").unwrap(),
            Arc::clone(&kind),
            scorer,
            Arc::new(LlmConfig::default()),
            EngineConfig::with_max_attempts(1),
        )
        .unwrap();

        let outcome = node
            .process(&NodeInputs::new().with_thought("x", thought(&kind, "t", 1.0)))
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::Scoring));
    }

    #[tokio::test]
    async fn scores_do_not_survive_into_a_failed_invocation() {
        let kind = candidate();
        let mut node = keeper(&kind);
        node.process(&NodeInputs::new().with_thought("a", thought(&kind, "t", 1.0)))
            .await;
        assert_eq!(node.scored().len(), 1);

        let mut failed = NodeInputs::new();
        failed.insert(
            "a",
            Input::Failed {
                node_id: NodeId::new("gen").unwrap(),
                message: "LlmCallError: timed out".into(),
            },
        );
        node.process(&failed).await;

        assert!(node.has_error());
        assert!(node.scored().is_empty());
    }

    #[tokio::test]
    async fn failed_or_foreign_inputs_short_circuit() {
        let kind = candidate();
        let other = ThoughtKind::new("other", json!({"type": "object"})).unwrap();
        let mut node = keeper(&kind);

        let mut failed = NodeInputs::new().with_thought("a", thought(&kind, "t", 1.0));
        failed.insert(
            "b",
            Input::Failed {
                node_id: NodeId::new("gen").unwrap(),
                message: "ExtractionError: no JSON".into(),
            },
        );
        let outcome = node.process(&failed).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::UpstreamError));
        assert!(node.scored().is_empty());

        let foreign = NodeInputs::new().with_thought(
            "a",
            Thought::new(ThoughtId::new("o").unwrap(), other, Map::new()),
        );
        let outcome = node.process(&foreign).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::InputMismatch));

        let outcome = node.process(&NodeInputs::new()).await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::MissingInput));
    }
}
