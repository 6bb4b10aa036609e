//! Filter compilation
//!
//! Turns a text filter plus a [`FilterExpr`] into a [`Pipeline`] over a
//! dimension's row collection. The pipeline keeps exactly the rows that
//! satisfy every condition; joined data never survives into the output.
//!
//! For every nested key the compiler emits an inner join against the
//! referenced dimension:
//!
//! ```text
//! Lookup(from = target, local = field, foreign = _id,
//!        pipeline = <recursive compilation>, as = field_tmp)
//! Unwind(field_tmp)          // drops rows whose referenced row did not match
//! Project(-field_tmp)
//! ```
//!
//! Local (non-nested) conditions at each level are combined into a single
//! match placed before that level's joins.

use super::{FieldFilter, FilterExpr, FilterValue};
use crate::error::{Error, Result};
use crate::registry::DimensionCatalog;
use crate::storage::{Lookup, Pipeline, Predicate, SortKey, Stage, ID_FIELD};
use crate::types::Dimension;
use tracing::trace;

/// Suffix of the temporary field a nested join writes into
pub const JOIN_SUFFIX: &str = "_tmp";

/// Compiles filters against dimension definitions
pub struct FilterCompiler<'a> {
    catalog: &'a dyn DimensionCatalog,
    max_depth: usize,
}

impl<'a> FilterCompiler<'a> {
    /// Create a compiler resolving classifier targets through `catalog`
    pub fn new(catalog: &'a dyn DimensionCatalog, max_depth: usize) -> Self {
        Self { catalog, max_depth }
    }

    /// Build the filtering pipeline for `dimension`
    ///
    /// An empty text filter is ignored. Fails with `InvalidFilterField` when a
    /// nested key is not a classifier of the dimension it is applied to, with
    /// `NotFound` when a classifier targets an unknown dimension and with
    /// `InvalidFilter` when nesting exceeds the configured depth.
    pub fn compile(
        &self,
        dimension: &Dimension,
        text_filter: Option<&str>,
        filter: Option<&FilterExpr>,
    ) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();

        if let Some(text) = text_filter.filter(|t| !t.is_empty()) {
            pipeline.push(Stage::Match(Predicate::Or(vec![
                Predicate::contains_ignore_case("code", text),
                Predicate::contains_ignore_case("name", text),
            ])));
        }

        match filter {
            None => {},
            Some(FilterExpr::Codes(codes)) => {
                pipeline.push(Stage::Match(Predicate::is_in("code", codes.clone())));
            },
            Some(FilterExpr::Fields(fields)) => {
                let mut path = Vec::new();
                for stage in self.compile_fields(dimension, fields, 1, &mut path)? {
                    pipeline.push(stage);
                }
            },
        }

        trace!(dimension = %dimension.code, stages = pipeline.len(), "Compiled filter");
        Ok(pipeline)
    }

    fn compile_fields(
        &self,
        dimension: &Dimension,
        fields: &FieldFilter,
        depth: usize,
        path: &mut Vec<String>,
    ) -> Result<Vec<Stage>> {
        if depth > self.max_depth {
            return Err(Error::InvalidFilter(format!(
                "filter nesting exceeds maximum depth {} at '{}'",
                self.max_depth,
                path.join(".")
            )));
        }

        let mut local = Vec::new();
        let mut joins = Vec::new();

        for (field, condition) in fields.entries() {
            match condition {
                FilterValue::Equals(value) => local.push(Predicate::eq(field.clone(), value.clone())),
                FilterValue::OneOf(values) => {
                    local.push(Predicate::is_in(field.clone(), values.clone()))
                },
                FilterValue::Nested(nested) => {
                    let classifier = dimension.classifier(field).ok_or_else(|| {
                        Error::InvalidFilterField {
                            dimension: dimension.code.clone(),
                            field: field.clone(),
                        }
                    })?;
                    let target = self
                        .catalog
                        .dimension(&classifier.dimension_code)
                        .ok_or_else(|| Error::dimension_not_found(&classifier.dimension_code))?;

                    path.push(field.clone());
                    let inner = self.compile_fields(&target, nested, depth + 1, path)?;
                    path.pop();

                    joins.extend(inner_join(field, &target.code, inner));
                },
            }
        }

        let mut stages = Vec::with_capacity(joins.len() + 1);
        match local.len() {
            0 => {},
            1 => stages.extend(local.pop().map(Stage::Match)),
            _ => stages.push(Stage::Match(Predicate::And(local))),
        }
        stages.extend(joins);
        Ok(stages)
    }
}

/// Stages keeping only documents whose `field` references a row of `target`
/// that survives `pipeline`
pub fn inner_join(field: &str, target: &str, pipeline: Vec<Stage>) -> Vec<Stage> {
    let tmp = format!("{}{}", field, JOIN_SUFFIX);
    vec![
        Stage::Lookup(Lookup {
            from: target.to_string(),
            local_field: field.to_string(),
            foreign_field: ID_FIELD.to_string(),
            pipeline,
            as_field: tmp.clone(),
        }),
        Stage::Unwind {
            path: tmp.clone(),
            preserve_null_and_empty: false,
        },
        Stage::Project { exclude: vec![tmp] },
    ]
}

/// `base` followed by a stage counting its output into `count`
pub fn count_pipeline(base: &Pipeline) -> Pipeline {
    base.clone().then(Stage::Count("count".to_string()))
}

/// `base` sorted by `order`, windowed when both bounds are given
pub fn page_pipeline(base: &Pipeline, start: Option<u64>, limit: Option<u64>) -> Pipeline {
    let mut pipeline = base.clone().then(Stage::Sort(vec![SortKey::asc("order")]));
    if let (Some(start), Some(limit)) = (start, limit) {
        pipeline.push(Stage::Skip(start));
        pipeline.push(Stage::Limit(limit));
    }
    pipeline
}
