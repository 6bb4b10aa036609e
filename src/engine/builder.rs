//! Engine builder with pluggable storage
//!
//! This module provides the main [`DimensionEngine`] type that composes the
//! registry, row store and filter compiler over one [`DocumentStore`].

use super::traits::DocumentStore;
use crate::config::{EngineConfig, StorageBackend};
use crate::error::{Error, Result};
use crate::filter::FilterExpr;
use crate::redis::RedisDocumentStore;
use crate::registry::DimensionRegistry;
use crate::rows::{ClassifierStats, ImportReport, RowStore};
use crate::storage::{Document, InMemoryStore, Pipeline};
use crate::types::{Classifier, Dimension, Row};
use std::sync::Arc;
use tracing::info;

/// Builder for a [`DimensionEngine`]
pub struct DimensionEngineBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    config: EngineConfig,
}

impl DimensionEngineBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            store: None,
            config: EngineConfig::default(),
        }
    }

    /// Set engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom store instead of the configured backend
    pub fn with_store<S>(mut self, store: S) -> Self
    where
        S: DocumentStore,
    {
        self.store = Some(Arc::new(store));
        self
    }

    /// Use a shared store instead of the configured backend
    ///
    /// Keep a clone of the `Arc` to inspect the store directly.
    pub fn with_store_arc(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate configuration, connect the backend and load the registry
    pub async fn build(self) -> Result<DimensionEngine> {
        self.config.validate()?;

        let store: Arc<dyn DocumentStore> = match self.store {
            Some(store) => store,
            None if self.config.storage.backend == StorageBackend::Redis => {
                Arc::new(RedisDocumentStore::connect(&self.config.redis).await?)
            },
            None => Arc::new(InMemoryStore::new()),
        };

        let registry = Arc::new(DimensionRegistry::new(
            Arc::clone(&store),
            self.config.storage.dimensions_collection.clone(),
        ));
        registry.init().await?;
        let rows = RowStore::new(Arc::clone(&registry), self.config.filter.max_depth);

        info!(
            store = store.store_id(),
            dimensions = registry.list(None).len(),
            "Dimension engine ready"
        );

        Ok(DimensionEngine {
            store,
            registry,
            rows,
            config: self.config,
        })
    }
}

impl Default for DimensionEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dimension and classifier engine
///
/// Plain structured data in, plain structured data or a typed [`Error`] out.
pub struct DimensionEngine {
    store: Arc<dyn DocumentStore>,
    registry: Arc<DimensionRegistry>,
    rows: RowStore,
    config: EngineConfig,
}

impl DimensionEngine {
    /// Start building an engine
    pub fn builder() -> DimensionEngineBuilder {
        DimensionEngineBuilder::new()
    }

    /// Engine over a fresh in-memory store
    pub async fn in_memory() -> Result<Self> {
        Self::builder().build().await
    }

    /// Get reference to the backing store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Get reference to the dimension registry
    pub fn registry(&self) -> &Arc<DimensionRegistry> {
        &self.registry
    }

    /// Get reference to the row store
    pub fn row_store(&self) -> &RowStore {
        &self.rows
    }

    /// Get engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Dimensions

    /// Define a new dimension and provision its row collection
    pub async fn define_dimension(&self, dimension: Dimension) -> Result<Dimension> {
        self.registry.define(dimension).await
    }

    /// Replace name and classifiers of an existing dimension
    pub async fn update_dimension(&self, dimension: Dimension) -> Result<Dimension> {
        self.registry.update(dimension).await
    }

    /// Remove a dimension and drop its rows
    pub async fn remove_dimension(&self, code: &str) -> Result<()> {
        self.registry.remove(code).await
    }

    /// Cached definition of a dimension
    pub fn get_dimension(&self, code: &str) -> Option<Dimension> {
        self.registry.get(code).map(|d| (*d).clone())
    }

    /// Dimensions whose code or name contains `filter`, ignoring case
    pub fn list_dimensions(&self, filter: Option<&str>) -> Vec<Dimension> {
        self.registry
            .list(filter)
            .into_iter()
            .map(|d| (*d).clone())
            .collect()
    }

    /// Add a classifier to an existing dimension
    pub async fn add_classifier(&self, code: &str, classifier: Classifier) -> Result<Dimension> {
        self.registry.add_classifier(code, classifier).await
    }

    /// Replace the classifier with the same field name
    pub async fn save_classifier(&self, code: &str, classifier: Classifier) -> Result<Dimension> {
        self.registry.save_classifier(code, classifier).await
    }

    /// Remove a classifier by field name
    pub async fn remove_classifier(&self, code: &str, field_name: &str) -> Result<Dimension> {
        self.registry.remove_classifier(code, field_name).await
    }

    /// All definitions sorted by code
    pub fn export_dimensions(&self) -> Vec<Dimension> {
        self.registry.export()
    }

    /// Define or update every dimension in the list
    pub async fn import_dimensions(&self, dimensions: Vec<Dimension>) -> Result<usize> {
        self.registry.import(dimensions).await
    }

    // Rows

    /// Insert a new row; an existing code is a [`Error::DuplicateCode`]
    pub async fn add_row(&self, dimension_code: &str, row: Row) -> Result<Row> {
        self.rows.add(dimension_code, row).await
    }

    /// Update name and classifiers of an existing row
    pub async fn save_row(&self, dimension_code: &str, row: Row) -> Result<Row> {
        self.rows.save(dimension_code, row).await
    }

    /// Insert or update a row
    pub async fn upsert_row(&self, dimension_code: &str, row: Row) -> Result<Row> {
        self.rows.upsert(dimension_code, row).await
    }

    /// Delete a row, returning it
    pub async fn delete_row(&self, dimension_code: &str, code: &str) -> Result<Row> {
        self.rows.delete(dimension_code, code).await
    }

    /// Point lookup
    pub async fn get_row(&self, dimension_code: &str, code: &str) -> Result<Option<Row>> {
        self.rows.get(dimension_code, code).await
    }

    /// Create a stub row unless `code` exists; true when created
    pub async fn ensure_default_row(&self, dimension_code: &str, code: &str) -> Result<bool> {
        self.rows.ensure_default_row(dimension_code, code).await
    }

    /// Compiled filtering pipeline, for inspection
    pub fn filter_pipeline(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
    ) -> Result<Pipeline> {
        self.rows.filter_pipeline(dimension_code, text_filter, filter)
    }

    /// Number of matching rows
    pub async fn count(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
    ) -> Result<u64> {
        self.rows.count(dimension_code, text_filter, filter).await
    }

    /// Matching rows sorted by order, windowed when both bounds are given
    pub async fn rows(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        start: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Row>> {
        self.rows
            .rows(dimension_code, text_filter, filter, start, limit)
            .await
    }

    /// Matching rows decorated with `<field>_name` display values
    pub async fn rows_with_names(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        start: u64,
        limit: u64,
    ) -> Result<Vec<Row>> {
        self.rows
            .rows_with_names(dimension_code, text_filter, filter, start, limit)
            .await
    }

    /// Swap order with the previous row of the filtered view
    pub async fn move_row_up_in_view(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        code: &str,
    ) -> Result<bool> {
        self.rows
            .move_row_up_in_view(dimension_code, text_filter, filter, code)
            .await
    }

    /// Swap order with the next row of the filtered view
    pub async fn move_row_down_in_view(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        code: &str,
    ) -> Result<bool> {
        self.rows
            .move_row_down_in_view(dimension_code, text_filter, filter, code)
            .await
    }

    /// Upsert rows in order, collecting per-row failures
    pub async fn import_rows(&self, dimension_code: &str, rows: Vec<Row>) -> Result<ImportReport> {
        self.rows.import_rows(dimension_code, rows).await
    }

    /// Row count of each classifier's target dimension
    pub async fn analyze_classifiers(&self, dimension_code: &str) -> Result<Vec<ClassifierStats>> {
        self.rows.analyze_classifiers(dimension_code).await
    }

    /// Row with classifier references expanded recursively
    pub async fn row_with_dependencies(
        &self,
        dimension_code: &str,
        code: &str,
    ) -> Result<Option<Document>> {
        self.rows.row_with_dependencies(dimension_code, code).await
    }

    /// Re-read definitions from storage
    pub async fn reload(&self) -> Result<usize> {
        self.registry.reload().await
    }

    /// Fail with [`Error::NotFound`] unless the dimension exists
    pub fn require_dimension(&self, code: &str) -> Result<Dimension> {
        self.registry
            .get(code)
            .map(|d| (*d).clone())
            .ok_or_else(|| Error::dimension_not_found(code))
    }
}
