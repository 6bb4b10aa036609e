//! Aggregation pipeline model
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s executed against one
//! collection. Stages are typed so the filter compiler cannot produce
//! malformed plans; [`Pipeline::to_json`] renders them in MongoDB syntax for
//! document-database drivers and for logging.
//!
//! ```text
//! Match ─► Lookup(inner pipeline) ─► Unwind ─► Project ─► Sort ─► Skip ─► Limit
//! ```

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

impl SortDirection {
    fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field path
    pub field: String,
    /// Direction
    pub direction: SortDirection,
}

impl SortKey {
    /// Ascending key on `field`
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending key on `field`
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Document predicate used by match stages
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals value (or, for array fields, contains it)
    Eq {
        /// Field path
        field: String,
        /// Expected value
        value: Value,
    },
    /// Field equals one of the values
    In {
        /// Field path
        field: String,
        /// Accepted values
        values: Vec<Value>,
    },
    /// Field strictly less than value
    Lt {
        /// Field path
        field: String,
        /// Bound
        value: Value,
    },
    /// Field strictly greater than value
    Gt {
        /// Field path
        field: String,
        /// Bound
        value: Value,
    },
    /// Field matches a regular expression
    Regex {
        /// Field path
        field: String,
        /// Pattern
        pattern: String,
        /// Case-insensitive matching
        case_insensitive: bool,
    },
    /// All predicates hold
    And(Vec<Predicate>),
    /// At least one predicate holds
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Equality predicate
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Membership predicate
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::In {
            field: field.into(),
            values,
        }
    }

    /// Case-insensitive substring predicate; `text` is matched literally
    pub fn contains_ignore_case(field: impl Into<String>, text: &str) -> Self {
        Predicate::Regex {
            field: field.into(),
            pattern: regex::escape(text),
            case_insensitive: true,
        }
    }

    /// Render in MongoDB query syntax
    pub fn to_json(&self) -> Value {
        match self {
            Predicate::Eq { field, value } => json!({ field.as_str(): value }),
            Predicate::In { field, values } => json!({ field.as_str(): { "$in": values } }),
            Predicate::Lt { field, value } => json!({ field.as_str(): { "$lt": value } }),
            Predicate::Gt { field, value } => json!({ field.as_str(): { "$gt": value } }),
            Predicate::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let mut spec = Map::new();
                spec.insert("$regex".to_string(), Value::String(pattern.clone()));
                if *case_insensitive {
                    spec.insert("$options".to_string(), Value::String("i".to_string()));
                }
                json!({ field.as_str(): spec })
            },
            Predicate::And(preds) => {
                // Disjoint equality fields collapse into one object like a hand-written query
                let mut merged = Map::new();
                let mut collapsible = true;
                for pred in preds {
                    match pred.to_json() {
                        Value::Object(obj) => {
                            for (k, v) in obj {
                                if k.starts_with('$') || merged.contains_key(&k) {
                                    collapsible = false;
                                }
                                merged.insert(k, v);
                            }
                        },
                        _ => collapsible = false,
                    }
                }
                if collapsible {
                    Value::Object(merged)
                } else {
                    json!({ "$and": preds.iter().map(Predicate::to_json).collect::<Vec<_>>() })
                }
            },
            Predicate::Or(preds) => {
                json!({ "$or": preds.iter().map(Predicate::to_json).collect::<Vec<_>>() })
            },
        }
    }
}

/// Correlated sub-query join
///
/// For every input document, documents of `from` whose `foreign_field`
/// equals the input's `local_field` are run through `pipeline` and the
/// survivors are stored as an array in `as_field`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// Joined collection
    pub from: String,
    /// Field of the input document
    pub local_field: String,
    /// Field of the joined collection
    pub foreign_field: String,
    /// Stages applied to the correlated documents
    pub pipeline: Vec<Stage>,
    /// Output array field
    pub as_field: String,
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents satisfying the predicate
    Match(Predicate),
    /// Stable sort
    Sort(Vec<SortKey>),
    /// Drop the first n documents
    Skip(u64),
    /// Keep at most n documents
    Limit(u64),
    /// Replace the stream by a single `{field: n}` document (nothing when n = 0)
    Count(String),
    /// Correlated join
    Lookup(Lookup),
    /// One output document per element of an array field
    Unwind {
        /// Array field path
        path: String,
        /// Keep documents whose array is missing or empty
        preserve_null_and_empty: bool,
    },
    /// Remove fields
    Project {
        /// Fields to drop
        exclude: Vec<String>,
    },
    /// Copy values from source paths into new fields: `(target, source_path)`
    AddFields(Vec<(String, String)>),
}

impl Stage {
    /// Render in MongoDB aggregation syntax
    pub fn to_json(&self) -> Value {
        match self {
            Stage::Match(pred) => json!({ "$match": pred.to_json() }),
            Stage::Sort(keys) => {
                let mut spec = Map::new();
                for key in keys {
                    spec.insert(key.field.clone(), Value::from(key.direction.as_i32()));
                }
                json!({ "$sort": spec })
            },
            Stage::Skip(n) => json!({ "$skip": n }),
            Stage::Limit(n) => json!({ "$limit": n }),
            Stage::Count(field) => json!({ "$count": field }),
            Stage::Lookup(lookup) => {
                if lookup.pipeline.is_empty() {
                    json!({ "$lookup": {
                        "from": lookup.from,
                        "localField": lookup.local_field,
                        "foreignField": lookup.foreign_field,
                        "as": lookup.as_field,
                    }})
                } else {
                    let var = format!("id_{}", lookup.local_field.replace('.', "_"));
                    let mut inner = vec![json!({ "$match": { "$expr": {
                        "$eq": [format!("${}", lookup.foreign_field), format!("$${}", var)]
                    }}})];
                    inner.extend(lookup.pipeline.iter().map(Stage::to_json));
                    json!({ "$lookup": {
                        "from": lookup.from,
                        "as": lookup.as_field,
                        "let": { var: format!("${}", lookup.local_field) },
                        "pipeline": inner,
                    }})
                }
            },
            Stage::Unwind {
                path,
                preserve_null_and_empty,
            } => {
                if *preserve_null_and_empty {
                    json!({ "$unwind": { "path": format!("${}", path), "preserveNullAndEmptyArrays": true } })
                } else {
                    json!({ "$unwind": format!("${}", path) })
                }
            },
            Stage::Project { exclude } => {
                let mut spec = Map::new();
                for field in exclude {
                    spec.insert(field.clone(), Value::from(0));
                }
                json!({ "$project": spec })
            },
            Stage::AddFields(fields) => {
                let mut spec = Map::new();
                for (target, source) in fields {
                    spec.insert(target.clone(), Value::String(format!("${}", source)));
                }
                json!({ "$addFields": spec })
            },
        }
    }
}

/// Ordered stage sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Append a stage (builder style)
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append all stages of another pipeline
    pub fn append(&mut self, other: Pipeline) {
        self.stages.extend(other.stages);
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Consume into the stage list
    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }

    /// Number of top-level stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when there are no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every collection joined anywhere in the pipeline, including nested lookups
    pub fn referenced_collections(&self) -> BTreeSet<String> {
        fn walk(stages: &[Stage], out: &mut BTreeSet<String>) {
            for stage in stages {
                if let Stage::Lookup(lookup) = stage {
                    out.insert(lookup.from.clone());
                    walk(&lookup.pipeline, out);
                }
            }
        }
        let mut out = BTreeSet::new();
        walk(&self.stages, &mut out);
        out
    }

    /// Render in MongoDB aggregation syntax
    pub fn to_json(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_json).collect())
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Self { stages }
    }
}

impl IntoIterator for Pipeline {
    type Item = Stage;
    type IntoIter = std::vec::IntoIter<Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}
