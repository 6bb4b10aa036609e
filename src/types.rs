//! Core data types of the dimension engine
//!
//! # Key Types
//!
//! - **`Dimension`**: a reference-data table definition (code, name, classifiers)
//! - **`Classifier`**: a foreign-key-like attribute pointing into another dimension
//! - **`Row`**: one record of a dimension, identified by its code
//!
//! # Example
//!
//! ```rust
//! use minz::types::{Classifier, Dimension};
//!
//! let comuna = Dimension::new("comuna", "Comuna")
//!     .with_classifier(Classifier::new("region", "region", "00"));
//! assert!(comuna.validate().is_ok());
//! assert!(comuna.classifier("region").is_some());
//! ```

use crate::error::{Error, Result, StorageError};
use crate::storage::document::{Document, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute of a dimension's rows that references a row in another dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classifier {
    /// Attribute name carried by rows (unique within the dimension)
    #[serde(default)]
    pub field_name: String,
    /// Target dimension the attribute value must resolve into
    #[serde(default)]
    pub dimension_code: String,
    /// Value used when a row omits the field; also the code of the stub row
    /// auto-created in the target dimension
    #[serde(default)]
    pub default_value: String,
}

impl Classifier {
    /// Create a classifier
    pub fn new(
        field_name: impl Into<String>,
        dimension_code: impl Into<String>,
        default_value: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            dimension_code: dimension_code.into(),
            default_value: default_value.into(),
        }
    }

    /// Check that all three attributes are present
    pub fn validate(&self) -> Result<()> {
        if self.field_name.is_empty()
            || self.dimension_code.is_empty()
            || self.default_value.is_empty()
        {
            return Err(Error::Validation(
                "Classifier must have fieldName, dimensionCode and defaultValue".to_string(),
            ));
        }
        Ok(())
    }
}

/// Definition of a dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Immutable identity; also the name of the row collection
    #[serde(default)]
    pub code: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Ordered classifier list
    #[serde(default)]
    pub classifiers: Vec<Classifier>,
}

impl Dimension {
    /// Create a dimension without classifiers
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            classifiers: Vec::new(),
        }
    }

    /// Append a classifier (builder style)
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifiers.push(classifier);
        self
    }

    /// Find a classifier by field name
    pub fn classifier(&self, field_name: &str) -> Option<&Classifier> {
        self.classifiers.iter().find(|c| c.field_name == field_name)
    }

    /// Validate code, name and every classifier
    ///
    /// Classifier field names must be unique within the dimension.
    pub fn validate(&self) -> Result<()> {
        if self.code.is_empty() || self.name.is_empty() {
            return Err(Error::Validation(
                "Dimension must have code and name".to_string(),
            ));
        }
        for (i, classifier) in self.classifiers.iter().enumerate() {
            classifier.validate()?;
            if self.classifiers[..i]
                .iter()
                .any(|c| c.field_name == classifier.field_name)
            {
                return Err(Error::Validation(format!(
                    "Duplicate classifier field '{}' in dimension '{}'",
                    classifier.field_name, self.code
                )));
            }
        }
        Ok(())
    }

    /// Document persisted in the dimensions catalog
    pub fn to_document(&self) -> std::result::Result<Document, StorageError> {
        let mut doc = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Document::new(),
        };
        doc.insert(ID_FIELD.to_string(), Value::String(self.code.clone()));
        Ok(doc)
    }

    /// Decode a catalog document
    pub fn from_document(mut doc: Document) -> std::result::Result<Self, StorageError> {
        doc.remove(ID_FIELD);
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

/// Row attributes managed by the engine itself
const RESERVED_FIELDS: [&str; 4] = [ID_FIELD, "code", "name", "order"];

/// One record of a dimension
///
/// Classifier attributes live in `fields`, keyed by the classifier's
/// `fieldName`, each holding a code of the target dimension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    /// Identity within the dimension
    pub code: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Display ordering, assigned at creation
    #[serde(default)]
    pub order: i64,
    /// Classifier attributes
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl Row {
    /// Create a row with no classifier attributes
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            order: 0,
            fields: BTreeMap::new(),
        }
    }

    /// Set a classifier attribute (builder style)
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Classifier attribute value
    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Document stored in the dimension's collection, keyed by `code`
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), Value::String(self.code.clone()));
        doc.insert("code".to_string(), Value::String(self.code.clone()));
        doc.insert("name".to_string(), Value::String(self.name.clone()));
        doc.insert("order".to_string(), Value::from(self.order));
        for (field, value) in &self.fields {
            if RESERVED_FIELDS.contains(&field.as_str()) {
                continue;
            }
            doc.insert(field.clone(), Value::String(value.clone()));
        }
        doc
    }

    /// Decode a stored document
    ///
    /// Scalar attributes are kept as strings; nested values (joined rows) are
    /// dropped.
    pub fn from_document(doc: &Document) -> Self {
        let mut row = Row::default();
        for (key, value) in doc {
            match key.as_str() {
                ID_FIELD => {
                    if row.code.is_empty() {
                        row.code = scalar_to_string(value).unwrap_or_default();
                    }
                },
                "code" => row.code = scalar_to_string(value).unwrap_or_default(),
                "name" => row.name = scalar_to_string(value).unwrap_or_default(),
                "order" => row.order = value.as_i64().unwrap_or(0),
                _ => {
                    if let Some(s) = scalar_to_string(value) {
                        row.fields.insert(key.clone(), s);
                    }
                },
            }
        }
        row
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
