//! Row store
//!
//! Per-dimension CRUD over rows. Classifier attributes are filled from their
//! defaults when omitted, and every referenced code is made to exist in the
//! target dimension by creating a stub row on demand. Referential
//! completeness is therefore eventual: rows may be written in any order
//! across dimensions.
//!
//! Write paths are safe to interleave. `order` assignment is a read of the
//! current maximum followed by an insert, so concurrent writers may produce
//! equal orders; `order` only drives display so this is accepted.
//! [`RowStore::ensure_default_row`] and [`RowStore::upsert`] treat a
//! uniqueness conflict as "someone else already wrote it".

mod import;
mod query;

pub use import::{ImportFailure, ImportReport};
pub use query::ClassifierStats;

use crate::engine::traits::{DocumentStore, FindQuery};
use crate::error::{Error, Result, StorageError};
use crate::metrics;
use crate::registry::DimensionRegistry;
use crate::storage::{Collection, Document, SortKey};
use crate::types::{Dimension, Row};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Row operations for every registered dimension
pub struct RowStore {
    registry: Arc<DimensionRegistry>,
    store: Arc<dyn DocumentStore>,
    max_depth: usize,
}

impl RowStore {
    /// Create a row store resolving dimension shapes through `registry`
    ///
    /// `max_depth` bounds nested filters and dependency expansion.
    pub fn new(registry: Arc<DimensionRegistry>, max_depth: usize) -> Self {
        let store = Arc::clone(registry.store());
        Self {
            registry,
            store,
            max_depth,
        }
    }

    fn collection(&self, dimension_code: &str) -> Collection {
        Collection::new(Arc::clone(&self.store), dimension_code)
    }

    /// Next display order for a dimension: current maximum + 1, or 1 when empty
    pub async fn next_order(&self, dimension_code: &str) -> Result<i64> {
        let last = self
            .collection(dimension_code)
            .find(FindQuery::all().sort(SortKey::desc("order")).limit(1))
            .await?;
        Ok(last
            .first()
            .and_then(|doc| doc.get("order"))
            .and_then(Value::as_i64)
            .map(|order| order + 1)
            .unwrap_or(1))
    }

    /// Insert a new row
    ///
    /// Fails with `DuplicateCode` when the code is already taken.
    pub async fn add(&self, dimension_code: &str, row: Row) -> Result<Row> {
        let result = match self.insert_row(dimension_code, row).await {
            Err(Error::Storage(e)) if e.is_duplicate_key() => {
                let code = match e {
                    StorageError::DuplicateKey { id, .. } => id,
                    _ => String::new(),
                };
                Err(Error::DuplicateCode {
                    dimension: dimension_code.to_string(),
                    code,
                })
            },
            other => other,
        };
        observe_write("add", &result);
        result
    }

    /// Update name and classifier attributes of an existing row
    ///
    /// `order` is left untouched. A missing row fails before any referenced
    /// stub is created.
    pub async fn save(&self, dimension_code: &str, row: Row) -> Result<Row> {
        let result = match self.get(dimension_code, &row.code).await {
            Ok(Some(_)) => match self.update_row(dimension_code, row).await {
                Ok((row, true)) => Ok(row),
                Ok((row, false)) => Err(Error::row_not_found(dimension_code, &row.code)),
                Err(e) => Err(e),
            },
            Ok(None) => Err(Error::row_not_found(dimension_code, &row.code)),
            Err(e) => Err(e),
        };
        observe_write("save", &result);
        result
    }

    /// Insert the row, or update it when the code already exists
    ///
    /// Safe to call concurrently for the same code: exactly one row remains,
    /// holding the fields of the last completed write.
    pub async fn upsert(&self, dimension_code: &str, row: Row) -> Result<Row> {
        let result = match self.insert_row(dimension_code, row.clone()).await {
            Err(Error::Storage(e)) if e.is_duplicate_key() => {
                metrics::record_conflict_swallowed("upsert");
                debug!(dimension = %dimension_code, code = %row.code, "Row exists, updating instead");
                match self.update_row(dimension_code, row).await {
                    Ok((row, true)) => Ok(row),
                    // Deleted between the insert and the update
                    Ok((row, false)) => Err(Error::row_not_found(dimension_code, &row.code)),
                    Err(e) => Err(e),
                }
            },
            other => other,
        };
        observe_write("upsert", &result);
        result
    }

    /// Delete a row, returning it
    pub async fn delete(&self, dimension_code: &str, code: &str) -> Result<Row> {
        let row = self
            .get(dimension_code, code)
            .await?
            .ok_or_else(|| Error::row_not_found(dimension_code, code))?;
        let deleted = self.collection(dimension_code).delete_one(code).await?;
        metrics::record_row_write("delete", deleted);
        if !deleted {
            return Err(Error::row_not_found(dimension_code, code));
        }
        Ok(row)
    }

    /// Point lookup; absence is not an error
    pub async fn get(&self, dimension_code: &str, code: &str) -> Result<Option<Row>> {
        self.registry.require(dimension_code)?;
        let start = Instant::now();
        let doc = self.collection(dimension_code).find_one(code).await?;
        metrics::record_query("get", start.elapsed().as_secs_f64());
        Ok(doc.as_ref().map(Row::from_document))
    }

    /// Make sure a row with `code` exists, creating a stub if needed
    ///
    /// The stub is named `"<dimension name> <code>"` with every classifier at
    /// its default. Losing an insert race to another writer is not an error.
    /// Returns whether this call created the row.
    pub async fn ensure_default_row(&self, dimension_code: &str, code: &str) -> Result<bool> {
        let dimension = self.registry.require(dimension_code)?;
        let rows = self.collection(dimension_code);
        if rows.find_one(code).await?.is_some() {
            return Ok(false);
        }

        let mut stub = Row::new(code, format!("{} {}", dimension.name, code));
        for classifier in &dimension.classifiers {
            stub.fields.insert(
                classifier.field_name.clone(),
                classifier.default_value.clone(),
            );
        }
        stub.order = self.next_order(dimension_code).await?;

        match rows.insert_one(stub.to_document()).await {
            Ok(()) => {
                metrics::record_stub_row(dimension_code);
                info!(dimension = %dimension_code, code = %code, "Created default row");
                Ok(true)
            },
            Err(e) if e.is_duplicate_key() => {
                metrics::record_conflict_swallowed("ensure_default_row");
                debug!(dimension = %dimension_code, code = %code, "Default row created concurrently");
                Ok(false)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Fill omitted classifier attributes and make every reference resolvable
    ///
    /// A reference to the row being written is satisfied by the write itself.
    async fn resolve_classifiers(&self, dimension: &Dimension, row: &mut Row) -> Result<()> {
        for classifier in &dimension.classifiers {
            let value = row
                .fields
                .entry(classifier.field_name.clone())
                .or_insert_with(|| classifier.default_value.clone())
                .clone();
            if classifier.dimension_code == dimension.code && value == row.code {
                continue;
            }
            self.ensure_default_row(&classifier.dimension_code, &value)
                .await?;
        }
        Ok(())
    }

    async fn insert_row(&self, dimension_code: &str, mut row: Row) -> Result<Row> {
        let dimension = self.registry.require(dimension_code)?;
        if row.code.is_empty() {
            return Err(Error::Validation("Row must have a code".to_string()));
        }
        let rows = self.collection(dimension_code);
        if rows.find_one(&row.code).await?.is_some() {
            return Err(StorageError::DuplicateKey {
                collection: dimension_code.to_string(),
                id: row.code,
            }
            .into());
        }
        self.resolve_classifiers(&dimension, &mut row).await?;
        row.order = self.next_order(dimension_code).await?;
        rows.insert_one(row.to_document()).await?;
        debug!(dimension = %dimension_code, code = %row.code, order = row.order, "Inserted row");
        Ok(row)
    }

    /// Set name and classifier attributes; returns the row and whether it matched
    async fn update_row(&self, dimension_code: &str, mut row: Row) -> Result<(Row, bool)> {
        let dimension = self.registry.require(dimension_code)?;
        self.resolve_classifiers(&dimension, &mut row).await?;

        let mut set = Document::new();
        set.insert("name".to_string(), Value::String(row.name.clone()));
        for classifier in &dimension.classifiers {
            if let Some(value) = row.field(&classifier.field_name) {
                set.insert(
                    classifier.field_name.clone(),
                    Value::String(value.to_string()),
                );
            }
        }
        let matched = self
            .collection(dimension_code)
            .update_one(&row.code, set)
            .await?;
        Ok((row, matched))
    }

    /// Registry this store resolves dimensions through
    pub fn registry(&self) -> &Arc<DimensionRegistry> {
        &self.registry
    }
}

fn observe_write<T>(operation: &str, result: &Result<T>) {
    metrics::record_row_write(operation, result.is_ok());
    if let Err(e) = result {
        metrics::record_error(e.kind().as_str(), operation);
    }
}
