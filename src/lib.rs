//! minz - Dimension and classifier engine
//!
//! This library manages dimensions (reference-data tables whose rows point
//! at rows of other dimensions) over a pluggable document store:
//! - Registry of dimension definitions with a reloadable cache
//! - Row lifecycle with lazy creation of referenced rows
//! - Nested filter compilation into joined aggregation pipelines
//! - In-memory and Redis-backed collection storage
//!
//! # Example
//!
//! ```rust
//! use minz::{Classifier, Dimension, DimensionEngine, FilterExpr, Row};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> minz::Result<()> {
//! let engine = DimensionEngine::in_memory().await?;
//! engine.define_dimension(Dimension::new("region", "Region")).await?;
//! engine
//!     .define_dimension(
//!         Dimension::new("comuna", "Comuna")
//!             .with_classifier(Classifier::new("region", "region", "00")),
//!     )
//!     .await?;
//!
//! engine
//!     .add_row("comuna", Row::new("ovalle", "Ovalle").with_field("region", "05"))
//!     .await?;
//!
//! let filter = FilterExpr::parse(r#"{"region": "05"}"#)?;
//! assert_eq!(engine.count("comuna", None, filter.as_ref()).await?, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod storage;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Redis-backed collection storage
pub mod redis;

/// Dimension definitions and their cache
pub mod registry;

/// Filter expressions and their compilation into pipelines
pub mod filter;

/// Display decoration of rows through outer joins
pub mod assembler;

/// Row lifecycle and row queries
pub mod rows;

// Re-export main types
pub use engine::{DimensionEngine, DimensionEngineBuilder};
pub use error::{Error, ErrorKind, Result};
pub use filter::{FieldFilter, FilterExpr, FilterValue};
pub use types::{Classifier, Dimension, Row};
