//! Engine composition over a pluggable document store

pub mod builder;
pub mod traits;

pub use builder::{DimensionEngine, DimensionEngineBuilder};
