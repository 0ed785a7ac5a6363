//! Structural equality between an actual and an expected resource.
//!
//! Both sides are serialized and compared field by field, so anything a
//! resource marks `#[serde(skip)]` (references to sibling resources, for
//! example) never takes part in the comparison.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("unable to serialize resource for comparison: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cannot compare {actual} with {expected}")]
    ShapeMismatch {
        actual: &'static str,
        expected: &'static str,
    },
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether `actual` and `expected` serialize to the same value.
///
/// Map ordering is irrelevant. Values of different top level shapes are a
/// malformed comparison and return an error.
pub fn is_equal<T: Serialize>(actual: &T, expected: &T) -> Result<bool, CompareError> {
    let actual = serde_json::to_value(actual)?;
    let expected = serde_json::to_value(expected)?;
    if shape(&actual) != shape(&expected) {
        return Err(CompareError::ShapeMismatch {
            actual: shape(&actual),
            expected: shape(&expected),
        });
    }
    Ok(actual == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    #[allow(dead_code)]
    struct Thing {
        name: String,
        tags: HashMap<String, String>,
        #[serde(skip)]
        scratch: u32,
    }

    fn thing(pairs: &[(&str, &str)], scratch: u32) -> Thing {
        Thing {
            name: "a".to_string(),
            tags: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            scratch,
        }
    }

    #[test]
    fn test_map_order_and_skipped_fields_ignored() {
        let a = thing(&[("x", "1"), ("y", "2")], 1);
        let b = thing(&[("y", "2"), ("x", "1")], 2);
        assert!(is_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_differing_tag_value() {
        let a = thing(&[("x", "1")], 0);
        let b = thing(&[("x", "2")], 0);
        assert!(!is_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let a: Option<Vec<u8>> = None;
        let b: Option<Vec<u8>> = Some(vec![1]);
        let err = is_equal(&a, &b).unwrap_err();
        assert!(matches!(err, CompareError::ShapeMismatch { .. }));
    }
}
