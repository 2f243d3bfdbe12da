//! Pulling JSON payloads out of free-form model output.

use serde_json::{Map, Value};
use thiserror::Error;
use thoughts::{Cardinality, FailureKind, NodeFailure};

/// Why a model response could not be turned into output values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The response holds no `{...}` region at all.
    #[error("no JSON object found in model output")]
    NoObject,

    /// Candidate regions exist but none parses; carries the first parse error.
    #[error("model output is not valid JSON: {0}")]
    Malformed(String),

    /// Several outputs were expected but the payload has no `items` array.
    #[error("expected an 'items' array in model output")]
    MissingItems,

    /// An `items` entry is not an object.
    #[error("item {index} is not a JSON object")]
    NotAnObject { index: usize },

    /// The `items` array has a count the cardinality rejects.
    #[error("expected {expected} items, got {actual}")]
    WrongCount { expected: Cardinality, actual: usize },
}

impl From<PayloadError> for NodeFailure {
    fn from(err: PayloadError) -> Self {
        let kind = match err {
            PayloadError::WrongCount { .. } => FailureKind::Cardinality,
            _ => FailureKind::Extraction,
        };
        NodeFailure::new(kind, err.to_string())
    }
}

/// Parses the structured payload out of a model response.
///
/// The whole response is tried first. Otherwise balanced `{...}` regions are
/// scanned left to right and the first one that parses as an object wins.
/// Braces inside JSON string literals are ignored, so `{"a": "}"}` is found
/// whole.
pub fn extract_json(text: &str) -> Result<Map<String, Value>, PayloadError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(map);
    }

    let mut first_error = None;
    let mut from = 0;
    while let Some(found) = text[from..].find('{') {
        let start = from + found;
        let Some(end) = balanced_end(text, start) else {
            from = start + 1;
            continue;
        };
        match serde_json::from_str::<Value>(&text[start..end]) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
        from = start + 1;
    }

    // Last resort: first '{' through last '}'.
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            match serde_json::from_str::<Value>(&text[start..=end]) {
                Ok(Value::Object(map)) => return Ok(map),
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert_with(|| e.to_string());
                }
            }
        }
    }

    Err(first_error.map_or(PayloadError::NoObject, PayloadError::Malformed))
}

/// Byte offset just past the `}` closing the `{` at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits an extracted payload into one value map per output.
///
/// A single output is the object itself. Any other cardinality expects the
/// outputs under an `items` array.
pub fn split_payload(
    payload: Map<String, Value>,
    cardinality: Cardinality,
) -> Result<Vec<Map<String, Value>>, PayloadError> {
    if cardinality.is_one() {
        return Ok(vec![payload]);
    }

    let mut payload = payload;
    let Some(Value::Array(items)) = payload.remove("items") else {
        return Err(PayloadError::MissingItems);
    };
    if !cardinality.accepts(items.len()) {
        return Err(PayloadError::WrongCount {
            expected: cardinality,
            actual: items.len(),
        });
    }
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(PayloadError::NotAnObject { index }),
        })
        .collect()
}
