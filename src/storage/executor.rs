//! In-process pipeline evaluation
//!
//! Backends without a native aggregation engine (the in-memory store, the
//! Redis store) snapshot the collections a pipeline touches and evaluate it
//! here. Joined collections that do not exist are treated as empty, the way
//! a document database does.

use super::document::{compare_values, get_path, values_equal, Document};
use super::pipeline::{Lookup, Predicate, SortDirection, SortKey, Stage};
use crate::error::StorageError;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashMap;

/// Evaluates stages over snapshotted collections
pub struct PipelineExecutor<'a> {
    /// Collection snapshots by name, used to resolve lookups
    collections: &'a HashMap<String, Vec<Document>>,
}

impl<'a> PipelineExecutor<'a> {
    /// Create an executor over the given snapshots
    pub fn new(collections: &'a HashMap<String, Vec<Document>>) -> Self {
        Self { collections }
    }

    /// Run `stages` over `input`
    pub fn execute(
        &self,
        input: Vec<Document>,
        stages: &[Stage],
    ) -> Result<Vec<Document>, StorageError> {
        let mut docs = input;
        for stage in stages {
            docs = self.apply(docs, stage)?;
        }
        Ok(docs)
    }

    fn apply(&self, docs: Vec<Document>, stage: &Stage) -> Result<Vec<Document>, StorageError> {
        match stage {
            Stage::Match(pred) => {
                let matcher = Matcher::compile(pred)?;
                Ok(docs.into_iter().filter(|d| matcher.matches(d)).collect())
            },
            Stage::Sort(keys) => {
                let mut docs = docs;
                sort_documents(&mut docs, keys);
                Ok(docs)
            },
            Stage::Skip(n) => Ok(docs.into_iter().skip(*n as usize).collect()),
            Stage::Limit(n) => Ok(docs.into_iter().take(*n as usize).collect()),
            Stage::Count(field) => {
                if docs.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out = Document::new();
                out.insert(field.clone(), Value::from(docs.len() as u64));
                Ok(vec![out])
            },
            Stage::Lookup(lookup) => self.lookup(docs, lookup),
            Stage::Unwind {
                path,
                preserve_null_and_empty,
            } => Ok(unwind(docs, path, *preserve_null_and_empty)),
            Stage::Project { exclude } => Ok(docs
                .into_iter()
                .map(|mut d| {
                    for field in exclude {
                        remove_path(&mut d, field);
                    }
                    d
                })
                .collect()),
            Stage::AddFields(fields) => Ok(docs
                .into_iter()
                .map(|mut d| {
                    for (target, source) in fields {
                        if let Some(value) = get_path(&d, source).cloned() {
                            d.insert(target.clone(), value);
                        }
                    }
                    d
                })
                .collect()),
        }
    }

    fn lookup(&self, docs: Vec<Document>, lookup: &Lookup) -> Result<Vec<Document>, StorageError> {
        let empty = Vec::new();
        let foreign = self.collections.get(&lookup.from).unwrap_or(&empty);

        // Index the joined collection once per stage
        let mut by_key: HashMap<String, Vec<&Document>> = HashMap::new();
        for doc in foreign {
            if let Some(key) = get_path(doc, &lookup.foreign_field).and_then(join_key) {
                by_key.entry(key).or_default().push(doc);
            }
        }

        let mut out = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let correlated: Vec<Document> = get_path(&doc, &lookup.local_field)
                .and_then(join_key)
                .and_then(|key| by_key.get(&key))
                .map(|matches| matches.iter().map(|d| (*d).clone()).collect())
                .unwrap_or_default();
            let joined = self.execute(correlated, &lookup.pipeline)?;
            doc.insert(
                lookup.as_field.clone(),
                Value::Array(joined.into_iter().map(Value::Object).collect()),
            );
            out.push(doc);
        }
        Ok(out)
    }
}

/// Stable multi-key sort
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    docs.sort_by(|a, b| {
        for key in keys {
            let ord = compare_values(get_path(a, &key.field), get_path(b, &key.field));
            let ord = match key.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn join_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("s:{}", s)),
        Value::Number(n) => n.as_f64().map(|f| format!("n:{}", f)),
        Value::Bool(b) => Some(format!("b:{}", b)),
        _ => None,
    }
}

fn unwind(docs: Vec<Document>, path: &str, preserve: bool) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item);
                    out.push(copy);
                }
            },
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    let mut copy = doc;
                    remove_path(&mut copy, path);
                    out.push(copy);
                }
            },
            Some(_) => out.push(doc),
        }
    }
    out
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        },
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        },
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        },
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        },
    }
}

/// A predicate with its regular expressions compiled
enum Matcher<'p> {
    Eq(&'p str, &'p Value),
    In(&'p str, &'p [Value]),
    Lt(&'p str, &'p Value),
    Gt(&'p str, &'p Value),
    Regex(&'p str, Regex),
    And(Vec<Matcher<'p>>),
    Or(Vec<Matcher<'p>>),
}

impl<'p> Matcher<'p> {
    fn compile(pred: &'p Predicate) -> Result<Self, StorageError> {
        Ok(match pred {
            Predicate::Eq { field, value } => Matcher::Eq(field, value),
            Predicate::In { field, values } => Matcher::In(field, values),
            Predicate::Lt { field, value } => Matcher::Lt(field, value),
            Predicate::Gt { field, value } => Matcher::Gt(field, value),
            Predicate::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|e| StorageError::Backend(format!("invalid regex: {}", e)))?;
                Matcher::Regex(field, re)
            },
            Predicate::And(preds) => Matcher::And(
                preds
                    .iter()
                    .map(Matcher::compile)
                    .collect::<Result<_, _>>()?,
            ),
            Predicate::Or(preds) => Matcher::Or(
                preds
                    .iter()
                    .map(Matcher::compile)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Matcher::Eq(field, expected) => field_equals(get_path(doc, field), expected),
            Matcher::In(field, values) => {
                let actual = get_path(doc, field);
                values.iter().any(|v| field_equals(actual, v))
            },
            Matcher::Lt(field, bound) => same_type_cmp(get_path(doc, field), bound)
                .map(|o| o == std::cmp::Ordering::Less)
                .unwrap_or(false),
            Matcher::Gt(field, bound) => same_type_cmp(get_path(doc, field), bound)
                .map(|o| o == std::cmp::Ordering::Greater)
                .unwrap_or(false),
            Matcher::Regex(field, re) => match get_path(doc, field) {
                Some(Value::String(s)) => re.is_match(s),
                _ => false,
            },
            Matcher::And(ms) => ms.iter().all(|m| m.matches(doc)),
            Matcher::Or(ms) => ms.iter().any(|m| m.matches(doc)),
        }
    }
}

fn field_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        },
        Some(v) => values_equal(v, expected),
    }
}

fn same_type_cmp(actual: Option<&Value>, bound: &Value) -> Option<std::cmp::Ordering> {
    match (actual?, bound) {
        (a @ Value::Number(_), b @ Value::Number(_)) | (a @ Value::String(_), b @ Value::String(_)) => {
            Some(compare_values(Some(a), Some(b)))
        },
        _ => None,
    }
}
