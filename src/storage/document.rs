//! Schemaless documents as stored in collections
//!
//! Documents are JSON objects. The identity field is always [`ID_FIELD`] and
//! holds a string.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A stored document
pub type Document = Map<String, Value>;

/// Name of the identity field
pub const ID_FIELD: &str = "_id";

/// Identity of a document, if present and a string
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Resolve a dotted field path (`provincia_row.name`) against a document
///
/// Returns `None` when any segment is missing or traverses a non-object.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Total order over JSON scalars used by sort stages
///
/// Missing/null sorts first, then booleans, numbers, strings; arrays and
/// objects compare equal to each other and sort last.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Equality used by match stages
///
/// Numbers compare by value so `5` matches `5.0`; everything else is
/// structural JSON equality.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_get_path_nested() {
        let d = doc(json!({"_id": "x", "region_row": {"name": "Coquimbo"}}));
        assert_eq!(document_id(&d), Some("x"));
        assert_eq!(get_path(&d, "region_row.name"), Some(&json!("Coquimbo")));
        assert_eq!(get_path(&d, "region_row.code"), None);
        assert_eq!(get_path(&d, "_id.name"), None);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(Some(&json!(1)), Some(&json!(2.5))),
            Ordering::Less
        );
        assert_eq!(compare_values(None, Some(&json!("a"))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }

    #[test]
    fn test_numeric_equality() {
        assert!(values_equal(&json!(5), &json!(5.0)));
        assert!(!values_equal(&json!("5"), &json!(5)));
    }
}
