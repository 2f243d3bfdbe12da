//! Prompt rendering for generator nodes.
//!
//! A rendered prompt is the fresh-conversation preamble, the task instruction
//! with its `{input.field}` placeholders substituted, an `Inputs` section with
//! every declared input's [`Thought::format_for_template`], and an
//! output-format instruction derived from the output kind's schema.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thoughts::{
    Cardinality, ConfigurationError, FailureKind, InputRequirement, NodeFailure, PreparedInputs,
    Thought,
};

const PREAMBLE: &str =
    "IMPORTANT: This is a new conversation. Ignore all previous context and history.";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(\w+)\.(\w+)\}").unwrap_or_else(|e| unreachable!("placeholder pattern: {e}"))
});

// ---------------------------------------------------------------------------
// Task instruction template
// ---------------------------------------------------------------------------

/// A task instruction whose placeholders are known to name declared inputs.
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    instruction: String,
}

impl TaskTemplate {
    /// Checks every `{input.field}` placeholder in `instruction` against `declared`.
    pub fn parse(
        instruction: impl Into<String>,
        declared: &[InputRequirement],
    ) -> Result<Self, ConfigurationError> {
        let instruction = instruction.into();
        for caps in PLACEHOLDER.captures_iter(&instruction) {
            let input = &caps[1];
            if !declared.iter().any(|r| r.name == input) {
                return Err(ConfigurationError::UnknownPlaceholder {
                    placeholder: format!("{}.{}", input, &caps[2]),
                    declared: declared.iter().map(|r| r.name.clone()).collect(),
                });
            }
        }
        Ok(Self { instruction })
    }

    /// The instruction text as written.
    pub fn as_str(&self) -> &str {
        &self.instruction
    }

    /// Substitutes placeholders with the named fields of `inputs`.
    ///
    /// A placeholder naming a field the supplied Thought lacks is a missing input.
    pub fn substitute(&self, inputs: &PreparedInputs<'_>) -> Result<String, NodeFailure> {
        let mut out = String::with_capacity(self.instruction.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(&self.instruction) {
            let Some(whole) = caps.get(0) else { continue };
            let (input, field) = (&caps[1], &caps[2]);
            let value = inputs
                .require(input)?
                .field_for_template(field)
                .ok_or_else(|| {
                    NodeFailure::new(
                        FailureKind::MissingInput,
                        format!("input '{input}' has no field '{field}' for placeholder"),
                    )
                })?;
            out.push_str(&self.instruction[last..whole.start()]);
            out.push_str(&value);
            last = whole.end();
        }
        out.push_str(&self.instruction[last..]);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Full prompt
// ---------------------------------------------------------------------------

/// Renders the complete prompt for one attempt.
pub fn render_prompt(
    template: &TaskTemplate,
    declared: &[InputRequirement],
    inputs: &PreparedInputs<'_>,
    format_instruction: &str,
) -> Result<String, NodeFailure> {
    let mut prompt = format!("{PREAMBLE}\n\n{}\n", template.substitute(inputs)?.trim());
    if !declared.is_empty() {
        prompt.push_str("\nInputs:\n");
        for req in declared {
            let thought: &Thought = inputs.require(&req.name)?;
            prompt.push_str(&format!(
                "[{}] ({})\n{}\n",
                req.name,
                thought.kind().name(),
                thought.format_for_template()
            ));
        }
    }
    prompt.push_str(format_instruction);
    Ok(prompt)
}

/// Describes the JSON document the model must answer with.
pub fn output_format_instruction(schema: &Value, cardinality: Cardinality) -> String {
    let example = match cardinality {
        Cardinality::Exactly(1) => example_from_schema(schema),
        _ => {
            let mut wrapper = Map::new();
            wrapper.insert(
                "items".to_string(),
                Value::Array(vec![example_from_schema(schema)]),
            );
            Value::Object(wrapper)
        }
    };
    let example = serde_json::to_string_pretty(&example).unwrap_or_else(|_| example.to_string());

    let count_rule = match cardinality {
        Cardinality::Exactly(1) => {
            "- The JSON must contain all the fields shown in the example".to_string()
        }
        Cardinality::Exactly(n) => {
            format!("- The JSON must contain an 'items' array with exactly {n} elements")
        }
        Cardinality::Variable => {
            "- The JSON must contain an 'items' array with one or more elements".to_string()
        }
    };

    format!(
        "\nProvide the response as a JSON object with the following structure:\n\
         {example}\n\
         \nOutput requirements:\n\
         {count_rule}\n\
         - Use exactly the same field names as shown\n\
         - Ensure all required fields are included\n\
         - Return only the JSON object, without additional text\n"
    )
}

/// Builds an example document from a schema, filling required properties only.
pub fn example_from_schema(schema: &Value) -> Value {
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let mut out = Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, prop) in props {
                    if required.contains(&name.as_str()) {
                        out.insert(name.clone(), example_from_schema(prop));
                    }
                }
            }
            Value::Object(out)
        }
        Some("array") => {
            let item = schema
                .get("items")
                .map(example_from_schema)
                .unwrap_or(Value::Null);
            if item.is_number() {
                Value::from(vec![1, 2, 3])
            } else {
                Value::Array(vec![item])
            }
        }
        Some("string") => Value::from("example"),
        Some("number") => Value::from(1.23),
        Some("integer") => Value::from(42),
        Some("boolean") => Value::Bool(true),
        _ => Value::Null,
    }
}
