//! Structured filter expressions over dimension rows
//!
//! The wire shape is a JSON object mapping field names to a scalar (exact
//! match), an array of scalars (membership) or a nested object (filter on
//! the attributes of the row the classifier references). A bare array of
//! codes is a shortcut for "code is one of these".
//!
//! ```text
//! {"provincia": {"region": "05"}, "tipo": ["rural", "mixta"]}
//!   └─ nested: provincia → region == "05"
//!                               └─ local: tipo ∈ {rural, mixta}
//! ```
//!
//! Expressions are parsed into tagged variants up front so the compiler never
//! inspects JSON types.

pub mod compiler;

pub use compiler::{FilterCompiler, JOIN_SUFFIX};

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum FilterExpr {
    /// Row code is one of these values
    Codes(Vec<Value>),
    /// Per-field conditions
    Fields(FieldFilter),
}

/// Per-field conditions, all of which must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
    entries: Vec<(String, FilterValue)>,
}

/// Condition on one field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Field equals the scalar
    Equals(Value),
    /// Field equals one of the scalars
    OneOf(Vec<Value>),
    /// The row referenced by this classifier field satisfies the nested filter
    Nested(FieldFilter),
}

impl FilterExpr {
    /// Parse the wire shape; `null` means no filter
    pub fn from_json(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Array(items) => Ok(Some(FilterExpr::Codes(scalars(items, "code list")?))),
            Value::Object(_) => Ok(Some(FilterExpr::Fields(FieldFilter::from_json(value)?))),
            other => Err(Error::InvalidFilter(format!(
                "filter must be an object or an array of codes, got {}",
                type_name(other)
            ))),
        }
    }

    /// Parse a JSON string (as received in an HTTP query parameter)
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidFilter(format!("malformed filter JSON: {}", e)))?;
        Self::from_json(&value)
    }

    /// Nesting depth (1 for a flat filter)
    pub fn depth(&self) -> usize {
        match self {
            FilterExpr::Codes(_) => 1,
            FilterExpr::Fields(f) => f.depth(),
        }
    }
}

impl TryFrom<Value> for FilterExpr {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(&value)?
            .ok_or_else(|| Error::InvalidFilter("filter cannot be null".to_string()))
    }
}

impl FieldFilter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`
    pub fn equals(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((field.into(), FilterValue::Equals(value.into())));
        self
    }

    /// Require `field` to be one of `values`
    pub fn one_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.push((field.into(), FilterValue::OneOf(values)));
        self
    }

    /// Require the row referenced by classifier `field` to satisfy `nested`
    pub fn nested(mut self, field: impl Into<String>, nested: FieldFilter) -> Self {
        self.entries.push((field.into(), FilterValue::Nested(nested)));
        self
    }

    /// Conditions in declaration order
    pub fn entries(&self) -> &[(String, FilterValue)] {
        &self.entries
    }

    /// True when there are no conditions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nesting depth (1 for a flat filter)
    pub fn depth(&self) -> usize {
        1 + self
            .entries
            .iter()
            .filter_map(|(_, v)| match v {
                FilterValue::Nested(inner) => Some(inner.depth()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidFilter(format!(
                "nested filter must be an object, got {}",
                type_name(value)
            )));
        };
        let mut entries = Vec::with_capacity(map.len());
        for (field, v) in map {
            let condition = match v {
                Value::Array(items) => FilterValue::OneOf(scalars(items, field)?),
                Value::Object(_) => FilterValue::Nested(FieldFilter::from_json(v)?),
                scalar => FilterValue::Equals(scalar.clone()),
            };
            entries.push((field.clone(), condition));
        }
        Ok(Self { entries })
    }
}

fn scalars(items: &[Value], context: &str) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| match item {
            Value::Array(_) | Value::Object(_) => Err(Error::InvalidFilter(format!(
                "'{}' must contain only scalar values",
                context
            ))),
            scalar => Ok(scalar.clone()),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
