//! The Thought data model.
//!
//! A [`ThoughtKind`] names a family of Thoughts and binds the JSON Schema their
//! values must satisfy. A [`Thought`] is one data unit of that kind: an id, a
//! map of named values, and a shared reference to its kind.
//!
//! Thoughts are immutable. Cloning a Thought is cheap and the clone refers to
//! the same underlying data, so a node that forwards an input (KeepBest) hands
//! on a reference rather than a copy; see [`Thought::same_as`].

use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use serde::ser::SerializeStruct;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{ConfigurationError, ThoughtId, ValidationError, Violation};

/// Field path reported for violations that concern the whole values object.
const ROOT_FIELD: &str = "<root>";

// ---------------------------------------------------------------------------
// ThoughtKind
// ---------------------------------------------------------------------------

/// A named Thought type and its bound JSON Schema.
///
/// The schema is compiled once at construction; every Thought of this kind
/// is validated against the same compiled schema regardless of which node
/// produced it.
pub struct ThoughtKind {
    name: String,
    schema: Value,
    compiled: JSONSchema,
}

impl ThoughtKind {
    /// Compiles `schema` and binds it to `name`.
    pub fn new(name: impl Into<String>, schema: Value) -> Result<Arc<Self>, ConfigurationError> {
        let name = name.into();
        let compiled =
            JSONSchema::compile(&schema).map_err(|e| ConfigurationError::InvalidSchema {
                kind: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(Self {
            name,
            schema,
            compiled,
        }))
    }

    /// Kind name, e.g. `"int_set"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw schema document.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Checks `values` against the schema, collecting every violation.
    pub fn validate(&self, values: &Value) -> Result<(), ValidationError> {
        let violations: Vec<Violation> = match self.compiled.validate(values) {
            Ok(()) => return Ok(()),
            Err(errors) => errors.flat_map(|err| violations_of(&err)).collect(),
        };
        Err(ValidationError {
            kind: self.name.clone(),
            violations,
        })
    }
}

impl std::fmt::Debug for ThoughtKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThoughtKind")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ThoughtKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.schema == other.schema
    }
}

/// Maps one validator error onto the field(s) it concerns.
///
/// `required` and `additionalProperties` errors are reported at the parent
/// object; the offending property names live in the error kind.
fn violations_of(err: &jsonschema::ValidationError<'_>) -> Vec<Violation> {
    let base = err.instance_path.to_string();
    let base = base.trim_start_matches('/');
    let join = |prop: &str| {
        if base.is_empty() {
            prop.to_string()
        } else {
            format!("{base}/{prop}")
        }
    };
    let message = err.to_string();
    match &err.kind {
        ValidationErrorKind::Required { property } => {
            let prop = property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string());
            vec![Violation {
                field: join(&prop),
                message,
            }]
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|prop| Violation {
                field: join(prop),
                message: format!("unexpected property '{prop}'"),
            })
            .collect(),
        _ => vec![Violation {
            field: if base.is_empty() {
                ROOT_FIELD.to_string()
            } else {
                base.to_string()
            },
            message,
        }],
    }
}

// ---------------------------------------------------------------------------
// Thought
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ThoughtInner {
    id: ThoughtId,
    kind: Arc<ThoughtKind>,
    values: Map<String, Value>,
}

/// An immutable, schema-bound data unit passed between nodes.
///
/// Construction does not validate; [`Thought::validated`] does, and nodes
/// call [`Thought::validate`] before exposing any Thought as output.
#[derive(Debug, Clone)]
pub struct Thought {
    inner: Arc<ThoughtInner>,
}

impl Thought {
    /// Creates a candidate Thought. Call [`Self::validate`] before trusting it.
    pub fn new(id: ThoughtId, kind: Arc<ThoughtKind>, values: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(ThoughtInner { id, kind, values }),
        }
    }

    /// Creates a Thought and validates it in one step.
    pub fn validated(
        id: ThoughtId,
        kind: Arc<ThoughtKind>,
        values: Map<String, Value>,
    ) -> Result<Self, ValidationError> {
        let thought = Self::new(id, kind, values);
        thought.validate()?;
        Ok(thought)
    }

    /// The Thought's identifier.
    pub fn id(&self) -> &ThoughtId {
        &self.inner.id
    }

    /// The Thought's kind.
    pub fn kind(&self) -> &Arc<ThoughtKind> {
        &self.inner.kind
    }

    /// The named values.
    pub fn values(&self) -> &Map<String, Value> {
        &self.inner.values
    }

    /// Looks up a single value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.inner.values.get(field)
    }

    /// Returns `true` if `other` refers to the very same Thought.
    pub fn same_as(&self, other: &Thought) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Checks the values against the kind's schema, listing every violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.inner
            .kind
            .validate(&Value::Object(self.inner.values.clone()))
    }

    /// Renders one field for embedding in a prompt.
    ///
    /// Returns `None` when the field is absent.
    pub fn field_for_template(&self, field: &str) -> Option<String> {
        self.get(field).map(render_value)
    }

    /// Renders all values as `key: value` lines in sorted key order.
    ///
    /// Pure and total: the same values always render to the same text.
    pub fn format_for_template(&self) -> String {
        let mut keys: Vec<&String> = self.inner.values.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|k| format!("{k}: {}", render_value(&self.inner.values[k.as_str()])))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Serialize for Thought {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Thought", 3)?;
        s.serialize_field("thought_id", &self.inner.id)?;
        s.serialize_field("kind", self.inner.kind.name())?;
        s.serialize_field("values", &self.inner.values)?;
        s.end()
    }
}

impl PartialEq for Thought {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
            || (self.inner.id == other.inner.id
                && self.inner.kind.name() == other.inner.kind.name()
                && self.inner.values == other.inner.values)
    }
}

/// Strings render raw, arrays of scalars comma-joined, everything else as
/// compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn topics_kind() -> Arc<ThoughtKind> {
        ThoughtKind::new(
            "topics",
            json!({
                "type": "object",
                "required": ["topics", "source"],
                "properties": {
                    "source": {"type": "string"},
                    "topics": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["topic_name", "content"],
                            "properties": {
                                "topic_name": {"type": "string"},
                                "content": {"type": "string"}
                            },
                            "additionalProperties": false
                        }
                    }
                },
                "additionalProperties": false
            }),
        )
        .unwrap()
    }

    fn thought(values: Value) -> Thought {
        let Value::Object(map) = values else {
            panic!("test values must be an object")
        };
        Thought::new(ThoughtId::new("t1").unwrap(), topics_kind(), map)
    }

    #[test]
    fn conforming_values_validate() {
        let t = thought(json!({
            "source": "interview_001.txt",
            "topics": [{"topic_name": "pay", "content": "salaries"}]
        }));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn every_violated_field_is_listed() {
        let t = thought(json!({
            "topics": [{"topic_name": 7}],
            "extra": true
        }));
        let err = t.validate().unwrap_err();
        let fields = err.fields();
        assert!(fields.contains(&"source"), "{fields:?}");
        assert!(fields.contains(&"extra"), "{fields:?}");
        assert!(fields.contains(&"topics/0/content"), "{fields:?}");
        assert!(fields.contains(&"topics/0/topic_name"), "{fields:?}");
        assert_eq!(err.kind, "topics");
    }

    #[test]
    fn invalid_schema_is_a_configuration_error() {
        let err = ThoughtKind::new("broken", json!({"type": 12})).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSchema { kind, .. } if kind == "broken"));
    }

    #[test]
    fn template_rendering_is_sorted_and_deterministic() {
        let t = thought(json!({
            "source": "a.txt",
            "topics": [{"content": "y", "topic_name": "x"}]
        }));
        let rendered = t.format_for_template();
        assert_eq!(
            rendered,
            "source: a.txt\ntopics: [{\"content\":\"y\",\"topic_name\":\"x\"}]"
        );
        assert_eq!(rendered, t.clone().format_for_template());
    }

    #[test]
    fn scalar_arrays_render_comma_joined() {
        assert_eq!(render_value(&json!([3, 1, 2])), "3, 1, 2");
        assert_eq!(render_value(&json!("plain")), "plain");
        assert_eq!(render_value(&json!(null)), "null");
    }

    #[test]
    fn field_lookup_for_template() {
        let t = thought(json!({"source": "a.txt", "topics": []}));
        assert_eq!(t.field_for_template("source").as_deref(), Some("a.txt"));
        assert_eq!(t.field_for_template("missing"), None);
    }

    #[test]
    fn clones_share_identity() {
        let t = thought(json!({"source": "a", "topics": []}));
        let c = t.clone();
        assert!(t.same_as(&c));
        let copy = thought(json!({"source": "a", "topics": []}));
        assert!(!t.same_as(&copy));
        assert_eq!(t, copy);
    }

    #[test]
    fn serializes_with_kind_name() {
        let t = thought(json!({"source": "a", "topics": []}));
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["thought_id"], "t1");
        assert_eq!(v["kind"], "topics");
        assert_eq!(v["values"]["source"], "a");
    }
}
