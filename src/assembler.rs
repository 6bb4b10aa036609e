//! Result assembly
//!
//! Decorates filtered rows with the display name of every referenced row.
//! Joins here are outer joins: a row whose reference does not resolve is
//! still returned, it just has no `<field>_name` attribute.

use crate::storage::{Lookup, Pipeline, SortKey, Stage, ID_FIELD};
use crate::types::Dimension;

/// Suffix of the temporary field holding the joined row
pub const ROW_SUFFIX: &str = "_row";

/// Suffix of the attribute carrying the referenced row's name
pub const NAME_SUFFIX: &str = "_name";

/// Attribute name carrying the display name for classifier `field`
pub fn name_field(field: &str) -> String {
    format!("{}{}", field, NAME_SUFFIX)
}

/// Outer-join stages adding `<field>_name` for every classifier of `dimension`
pub fn decoration_stages(dimension: &Dimension) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(dimension.classifiers.len() * 4);
    for classifier in &dimension.classifiers {
        let field = &classifier.field_name;
        let row = format!("{}{}", field, ROW_SUFFIX);
        stages.push(Stage::Lookup(Lookup {
            from: classifier.dimension_code.clone(),
            local_field: field.clone(),
            foreign_field: ID_FIELD.to_string(),
            pipeline: Vec::new(),
            as_field: row.clone(),
        }));
        stages.push(Stage::Unwind {
            path: row.clone(),
            preserve_null_and_empty: true,
        });
        stages.push(Stage::AddFields(vec![(
            name_field(field),
            format!("{}.name", row),
        )]));
        stages.push(Stage::Project { exclude: vec![row] });
    }
    stages
}

/// Filter pipeline extended with decorations, ordering and an optional window
///
/// The window is applied only when `limit` is non-zero.
pub fn rows_with_names_pipeline(
    base: &Pipeline,
    dimension: &Dimension,
    start: u64,
    limit: u64,
) -> Pipeline {
    let mut pipeline = base.clone();
    for stage in decoration_stages(dimension) {
        pipeline.push(stage);
    }
    pipeline.push(Stage::Sort(vec![SortKey::asc("order")]));
    if limit > 0 {
        pipeline.push(Stage::Skip(start));
        pipeline.push(Stage::Limit(limit));
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Classifier;
    use serde_json::json;

    fn comuna() -> Dimension {
        Dimension::new("comuna", "Comuna")
            .with_classifier(Classifier::new("provincia", "provincia", "000"))
            .with_classifier(Classifier::new("tipo", "tipoComuna", "urbana"))
    }

    #[test]
    fn test_no_classifiers_no_decoration() {
        assert!(decoration_stages(&Dimension::new("region", "Region")).is_empty());
    }

    #[test]
    fn test_decoration_rendering() {
        let stages = decoration_stages(&comuna());
        assert_eq!(stages.len(), 8);
        let rendered = Pipeline::from(stages).to_json();
        assert_eq!(
            rendered[0],
            json!({"$lookup": {
                "from": "provincia",
                "localField": "provincia",
                "foreignField": "_id",
                "as": "provincia_row"
            }})
        );
        assert_eq!(
            rendered[1],
            json!({"$unwind": {"path": "$provincia_row", "preserveNullAndEmptyArrays": true}})
        );
        assert_eq!(
            rendered[2],
            json!({"$addFields": {"provincia_name": "$provincia_row.name"}})
        );
        assert_eq!(rendered[3], json!({"$project": {"provincia_row": 0}}));
        assert_eq!(rendered[4]["$lookup"]["from"], json!("tipoComuna"));
    }

    #[test]
    fn test_window_only_with_limit() {
        let base = Pipeline::new();
        let unwindowed = rows_with_names_pipeline(&base, &comuna(), 20, 0);
        assert_eq!(
            unwindowed.stages().last(),
            Some(&Stage::Sort(vec![SortKey::asc("order")]))
        );

        let windowed = rows_with_names_pipeline(&base, &comuna(), 20, 10);
        let tail: Vec<_> = windowed.stages().iter().rev().take(2).cloned().collect();
        assert_eq!(tail, vec![Stage::Limit(10), Stage::Skip(20)]);
    }
}
