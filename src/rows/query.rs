//! Filtered reads over a dimension's rows

use super::RowStore;
use crate::assembler;
use crate::error::{Error, Result};
use crate::filter::compiler::{count_pipeline, page_pipeline};
use crate::filter::{FilterCompiler, FilterExpr};
use crate::metrics;
use crate::storage::{Document, Pipeline, Predicate, SortKey, Stage};
use crate::types::Row;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// Size of a classifier's target dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierStats {
    /// Classifier attribute name
    pub field_name: String,
    /// Target dimension
    pub dimension_code: String,
    /// Rows currently in the target dimension
    pub rows: u64,
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

impl RowStore {
    /// Compile the filtering pipeline for a dimension
    pub fn filter_pipeline(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
    ) -> Result<Pipeline> {
        let dimension = self.registry.require(dimension_code)?;
        let compiler = FilterCompiler::new(self.registry.as_ref(), self.max_depth);
        let pipeline = compiler.compile(&dimension, text_filter, filter)?;
        debug!(dimension = %dimension_code, stages = pipeline.len(), "Compiled row filter");
        Ok(pipeline)
    }

    /// Number of rows matching the filters (0 when nothing matches)
    pub async fn count(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
    ) -> Result<u64> {
        let base = self.filter_pipeline(dimension_code, text_filter, filter)?;
        let start = Instant::now();
        let first = self
            .collection(dimension_code)
            .aggregate_first(&count_pipeline(&base))
            .await?;
        metrics::record_query("count", start.elapsed().as_secs_f64());
        Ok(first
            .and_then(|doc| doc.get("count").and_then(Value::as_u64))
            .unwrap_or(0))
    }

    /// Matching rows sorted by `order`
    ///
    /// The `start`/`limit` window is applied only when both are given.
    pub async fn rows(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        start: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Row>> {
        let base = self.filter_pipeline(dimension_code, text_filter, filter)?;
        self.run_rows("rows", dimension_code, &page_pipeline(&base, start, limit))
            .await
    }

    /// Matching rows sorted by `order`, each decorated with `<field>_name`
    /// for every classifier whose reference resolves
    ///
    /// The window is applied only when `limit` is non-zero.
    pub async fn rows_with_names(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        start: u64,
        limit: u64,
    ) -> Result<Vec<Row>> {
        let dimension = self.registry.require(dimension_code)?;
        let base = self.filter_pipeline(dimension_code, text_filter, filter)?;
        let pipeline = assembler::rows_with_names_pipeline(&base, &dimension, start, limit);
        self.run_rows("rows_with_names", dimension_code, &pipeline)
            .await
    }

    async fn run_rows(
        &self,
        operation: &str,
        dimension_code: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Row>> {
        let start = Instant::now();
        let docs = self
            .collection(dimension_code)
            .aggregate_to_vec(pipeline)
            .await?;
        metrics::record_query(operation, start.elapsed().as_secs_f64());
        Ok(docs.iter().map(Row::from_document).collect())
    }

    /// Swap `order` with the previous row of the filtered view
    ///
    /// Returns false when the row is already first in the view.
    pub async fn move_row_up_in_view(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        code: &str,
    ) -> Result<bool> {
        self.move_in_view(dimension_code, text_filter, filter, code, Direction::Up)
            .await
    }

    /// Swap `order` with the next row of the filtered view
    ///
    /// Returns false when the row is already last in the view.
    pub async fn move_row_down_in_view(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        code: &str,
    ) -> Result<bool> {
        self.move_in_view(dimension_code, text_filter, filter, code, Direction::Down)
            .await
    }

    async fn move_in_view(
        &self,
        dimension_code: &str,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
        code: &str,
        direction: Direction,
    ) -> Result<bool> {
        let row = self
            .get(dimension_code, code)
            .await?
            .ok_or_else(|| Error::row_not_found(dimension_code, code))?;

        let order = Value::from(row.order);
        let (bound, sort) = match direction {
            Direction::Up => (
                Predicate::Lt {
                    field: "order".to_string(),
                    value: order,
                },
                SortKey::desc("order"),
            ),
            Direction::Down => (
                Predicate::Gt {
                    field: "order".to_string(),
                    value: order,
                },
                SortKey::asc("order"),
            ),
        };
        let pipeline = self
            .filter_pipeline(dimension_code, text_filter, filter)?
            .then(Stage::Match(bound))
            .then(Stage::Sort(vec![sort]))
            .then(Stage::Limit(1));

        let rows = self.collection(dimension_code);
        let Some(neighbour) = rows.aggregate_first(&pipeline).await? else {
            return Ok(false);
        };
        let neighbour = Row::from_document(&neighbour);

        rows.update_one(&neighbour.code, order_doc(row.order)).await?;
        rows.update_one(&row.code, order_doc(neighbour.order)).await?;
        debug!(
            dimension = %dimension_code,
            code = %code,
            neighbour = %neighbour.code,
            "Swapped row order"
        );
        Ok(true)
    }

    /// Row count of each classifier's target dimension, in classifier order
    pub async fn analyze_classifiers(&self, dimension_code: &str) -> Result<Vec<ClassifierStats>> {
        let dimension = self.registry.require(dimension_code)?;
        let mut stats = Vec::with_capacity(dimension.classifiers.len());
        for classifier in &dimension.classifiers {
            let rows = self.count(&classifier.dimension_code, None, None).await?;
            stats.push(ClassifierStats {
                field_name: classifier.field_name.clone(),
                dimension_code: classifier.dimension_code.clone(),
                rows,
            });
        }
        Ok(stats)
    }
}

impl RowStore {
    /// The row with every classifier attribute replaced by the referenced row,
    /// expanded recursively
    ///
    /// Expansion stops at the configured maximum depth so cyclic data
    /// terminates; references that do not resolve stay as plain codes.
    pub async fn row_with_dependencies(
        &self,
        dimension_code: &str,
        code: &str,
    ) -> Result<Option<Document>> {
        self.registry.require(dimension_code)?;
        self.expand(dimension_code.to_string(), code.to_string(), 1)
            .await
    }

    fn expand(
        &self,
        dimension_code: String,
        code: String,
        depth: usize,
    ) -> BoxFuture<'_, Result<Option<Document>>> {
        async move {
            let Some(dimension) = self.registry.get(&dimension_code) else {
                return Ok(None);
            };
            let Some(mut doc) = self.collection(&dimension_code).find_one(&code).await? else {
                return Ok(None);
            };
            if depth >= self.max_depth {
                return Ok(Some(doc));
            }
            for classifier in &dimension.classifiers {
                let Some(Value::String(target)) = doc.get(&classifier.field_name).cloned() else {
                    continue;
                };
                let expanded = self
                    .expand(classifier.dimension_code.clone(), target, depth + 1)
                    .await?;
                if let Some(expanded) = expanded {
                    doc.insert(classifier.field_name.clone(), Value::Object(expanded));
                }
            }
            Ok(Some(doc))
        }
        .boxed()
    }
}

fn order_doc(order: i64) -> Document {
    let mut doc = Document::new();
    doc.insert("order".to_string(), Value::from(order));
    doc
}
