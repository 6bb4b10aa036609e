//! Collection access layer
//!
//! Everything the engine needs from a document store: the document model,
//! typed aggregation pipelines, an in-process pipeline evaluator and the
//! in-memory backend. The backend contract itself is
//! [`DocumentStore`](crate::engine::traits::DocumentStore).
//!
//! # Key Components
//!
//! - **Document**: JSON object keyed by `_id`
//! - **Pipeline / Stage**: typed aggregation plan with MongoDB rendering
//! - **PipelineExecutor**: evaluates a plan over collection snapshots
//! - **Collection**: store handle bound to one collection name
//! - **InMemoryStore**: process-local backend

/// Named collection handle
pub mod collection;
/// Document model and value comparison
pub mod document;
/// In-process pipeline evaluation
pub mod executor;
/// In-memory document store
pub mod memory;
/// Aggregation pipeline model
pub mod pipeline;

pub use collection::Collection;
pub use document::{Document, ID_FIELD};
pub use executor::PipelineExecutor;
pub use memory::InMemoryStore;
pub use pipeline::{Lookup, Pipeline, Predicate, SortDirection, SortKey, Stage};
