//! Error types for the dimension engine

use thiserror::Error;

/// Main error type for engine operations
///
/// Every variant maps to one [`ErrorKind`] so callers (the REST layer, batch
/// importers) can branch on the kind without inspecting messages.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed dimension or classifier definition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown dimension, row or classifier target
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness conflict on a non-idempotent write path
    #[error("Code '{code}' already exists in dimension '{dimension}'")]
    DuplicateCode {
        /// Dimension the row was written to
        dimension: String,
        /// The conflicting row code
        code: String,
    },

    /// Filter references a field that is not a classifier of the dimension
    #[error("Invalid field '{field}' in filter for dimension '{dimension}'")]
    InvalidFilterField {
        /// Dimension being filtered
        dimension: String,
        /// The offending field name
        field: String,
    },

    /// Filter expression has an unsupported shape or nests too deeply
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Collection access failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification of [`Error`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad definition
    Validation,
    /// Missing entity
    NotFound,
    /// Code conflict
    DuplicateCode,
    /// Bad filter field or filter shape
    InvalidFilterField,
    /// Storage failure
    Storage,
    /// Bad configuration
    Configuration,
}

impl ErrorKind {
    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DuplicateCode => "duplicate_code",
            ErrorKind::InvalidFilterField => "invalid_filter",
            ErrorKind::Storage => "storage",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl Error {
    /// Create a not-found error for an unknown dimension
    pub fn dimension_not_found(code: &str) -> Self {
        Error::NotFound(format!("dimension '{}'", code))
    }

    /// Create a not-found error for an unknown row
    pub fn row_not_found(dimension: &str, code: &str) -> Self {
        Error::NotFound(format!("row '{}' in dimension '{}'", code, dimension))
    }

    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DuplicateCode { .. } => ErrorKind::DuplicateCode,
            Error::InvalidFilterField { .. } | Error::InvalidFilter(_) => {
                ErrorKind::InvalidFilterField
            },
            Error::Storage(_) => ErrorKind::Storage,
            Error::Configuration(_) => ErrorKind::Configuration,
        }
    }
}

/// Collection access errors
///
/// Raised by [`DocumentStore`](crate::engine::traits::DocumentStore) implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Insert collided with an existing document identity
    #[error("Duplicate key '{id}' in collection '{collection}'")]
    DuplicateKey {
        /// Collection name
        collection: String,
        /// Conflicting `_id`
        id: String,
    },

    /// Collection could not be created because it already exists
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Collection does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Backend unreachable or timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// True when the error is an identity (uniqueness) conflict
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StorageError::DuplicateKey { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
