//! Concrete node kinds for the thought graph engine.
//!
//! Each node pairs a [`thoughts::NodeCore`] with a private
//! [`thoughts::Operation`] and implements [`thoughts::Node`] by delegating
//! `process` to the core's retry loop.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Nodes sequence calls between the domain types in
//! [`thoughts`] and the [`thoughts::LlmClient`] port. Transports live in the
//! `llm` crate.
//!
//! ## Node Kinds
//!
//! | Node | Produces |
//! |------|----------|
//! | [`Generator`] | New Thoughts extracted from one LLM response per attempt |
//! | [`KeepBest`] | The best-scoring of its same-kind inputs |
//! | [`Repeat`] | The concatenated outputs of `k` runs of an embedded [`Generator`] |

pub mod extract;
pub mod generator;
pub mod keep_best;
pub mod prompt;
pub mod repeat;
pub mod scoring;

pub use extract::{extract_json, split_payload, PayloadError};
pub use generator::{Generator, GeneratorBuilder};
pub use keep_best::KeepBest;
pub use prompt::{example_from_schema, output_format_instruction, TaskTemplate};
pub use repeat::Repeat;
pub use scoring::{FnScorer, Ranking, Scorer, Scores};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use thoughts::test_utils::ScriptedLlm;
    use thoughts::{
        Cardinality, EngineConfig, LlmConfig, Node, NodeId, NodeInputs, ScoringError, Thought,
        ThoughtId, ThoughtKind,
    };

    use super::*;

    fn int_set() -> Arc<ThoughtKind> {
        ThoughtKind::new(
            "int_set",
            json!({
                "type": "object",
                "required": ["values", "size"],
                "properties": {
                    "values": {"type": "array", "items": {"type": "integer"}},
                    "size": {"type": "integer", "minimum": 0}
                },
                "additionalProperties": false
            }),
        )
        .unwrap()
    }

    fn sortedness(t: &Thought) -> Result<Scores, ScoringError> {
        let values: Vec<i64> = t
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| ScoringError("missing 'values'".into()))?
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        let ordered = values.windows(2).filter(|w| w[0] <= w[1]).count();
        let score = if values.len() <= 1 {
            1.0
        } else {
            ordered as f64 / (values.len() - 1) as f64
        };
        Ok(Scores::from([("ordering_score".to_string(), score)]))
    }

    // Repeat a sorter, then keep the best-ordered candidate.
    #[tokio::test]
    async fn repeat_then_keep_best_selects_sorted_candidate() {
        let kind = int_set();
        let llm = Arc::new(ScriptedLlm::replying([
            r#"{"values": [3, 1, 2], "size": 3}"#,
            r#"{"values": [1, 2, 3], "size": 3}"#,
            r#"{"values": [2, 1, 3], "size": 3}"#,
        ]));
        let config = Arc::new(LlmConfig::new("test-model"));

        let sorter = Generator::builder(
            NodeId::new("sorter").unwrap(),
            "Sort these numbers in ascending order: {input.values}",
            Arc::clone(&kind),
        )
        .input("input", Arc::clone(&kind))
        .build(llm.clone(), Arc::clone(&config), EngineConfig::default())
        .unwrap();
        let mut repeater =
            Repeat::new(NodeId::new("repeater").unwrap(), sorter, 3, EngineConfig::default())
                .unwrap();
        let mut keeper = KeepBest::new(
            NodeId::new("keeper").unwrap(),
            Arc::clone(&kind),
            FnScorer::new(sortedness),
            config,
            EngineConfig::default(),
        )
        .unwrap();

        let Value::Object(values) = json!({"values": [3, 2, 1], "size": 3}) else {
            unreachable!()
        };
        let source = Thought::new(ThoughtId::new("input").unwrap(), Arc::clone(&kind), values);
        repeater
            .process(&NodeInputs::new().with_thought("input", source))
            .await;
        assert_eq!(repeater.outputs().len(), 3);

        let outcome = keeper
            .process(&NodeInputs::from_outputs("candidate", &repeater))
            .await;

        assert_eq!(outcome.outputs().len(), 1);
        assert_eq!(outcome.outputs()[0].get("values"), Some(&json!([1, 2, 3])));
        assert!(outcome.outputs()[0].same_as(&repeater.outputs()[1]));
        assert_eq!(keeper.output_cardinality(), Cardinality::ONE);
    }

    #[tokio::test]
    async fn failed_repeat_propagates_into_keep_best() {
        let kind = int_set();
        let llm = Arc::new(ScriptedLlm::replying(["nothing useful"]));
        let sorter = Generator::builder(NodeId::new("sorter").unwrap(), "Sort", Arc::clone(&kind))
            .build(
                llm.clone(),
                Arc::new(LlmConfig::default()),
                EngineConfig::with_max_attempts(1),
            )
            .unwrap();
        let mut repeater =
            Repeat::new(NodeId::new("repeater").unwrap(), sorter, 2, EngineConfig::default())
                .unwrap();
        let mut keeper = KeepBest::new(
            NodeId::new("keeper").unwrap(),
            Arc::clone(&kind),
            FnScorer::new(sortedness),
            Arc::new(LlmConfig::default()),
            EngineConfig::default(),
        )
        .unwrap();

        repeater.process(&NodeInputs::new()).await;
        assert!(repeater.has_error());

        keeper
            .process(&NodeInputs::from_outputs("candidate", &repeater))
            .await;

        assert!(keeper.has_error());
        assert!(keeper
            .error_message()
            .is_some_and(|m| m.contains("repeater")));
        assert_eq!(llm.calls(), 1);
    }
}
