//! Core trait definitions for pluggable document stores

use crate::error::StorageError;
use crate::storage::document::Document;
use crate::storage::pipeline::{Pipeline, Predicate, SortKey, Stage};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Lazy sequence of documents produced by an aggregation
///
/// Dropping the stream closes it.
pub type DocumentStream = Pin<Box<dyn Stream<Item = Result<Document, StorageError>> + Send>>;

// =============================================================================
// DocumentStore Trait
// =============================================================================

/// Named, persistent, indexable collections of documents keyed by `_id`
///
/// The engine only talks to storage through this trait, so any document
/// database, or a relational store emulating document semantics, can back it.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Unique identifier for this backend
    fn store_id(&self) -> &str;

    /// Provision a collection; fails with `CollectionExists` if present
    async fn create_collection(&self, name: &str) -> Result<(), StorageError>;

    /// Drop a collection and all its documents; returns whether it existed
    async fn drop_collection(&self, name: &str) -> Result<bool, StorageError>;

    /// Names of all collections
    async fn list_collections(&self) -> Result<Vec<String>, StorageError>;

    /// Create an index (idempotent)
    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<(), StorageError>;

    /// Insert a document; fails with `DuplicateKey` if its `_id` exists
    ///
    /// Inserting into a missing collection creates it implicitly.
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StorageError>;

    /// Point lookup by `_id`
    async fn find_one(&self, collection: &str, id: &str)
        -> Result<Option<Document>, StorageError>;

    /// Filtered, sorted, windowed read
    async fn find(&self, collection: &str, query: FindQuery)
        -> Result<Vec<Document>, StorageError>;

    /// Set fields on the document with the given `_id`; returns whether it matched
    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        set: Document,
    ) -> Result<bool, StorageError>;

    /// Delete by `_id`; returns whether a document was removed
    async fn delete_one(&self, collection: &str, id: &str) -> Result<bool, StorageError>;

    /// Run an aggregation pipeline against a collection
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<DocumentStream, StorageError>;

    /// Get store statistics
    fn stats(&self) -> StoreStats;
}

/// Index definition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed keys in order
    pub keys: Vec<SortKey>,
    /// Enforce uniqueness
    pub unique: bool,
}

impl IndexSpec {
    /// Non-unique ascending index on one field
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![SortKey::asc(field)],
            unique: false,
        }
    }

    /// Conventional index name (`order_1`, `a_1_b_-1`)
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|k| {
                let dir = match k.direction {
                    crate::storage::pipeline::SortDirection::Ascending => 1,
                    crate::storage::pipeline::SortDirection::Descending => -1,
                };
                format!("{}_{}", k.field, dir)
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Parameters of a `find`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindQuery {
    /// Optional filter
    pub filter: Option<Predicate>,
    /// Sort keys (empty = natural order)
    pub sort: Vec<SortKey>,
    /// Documents to skip
    pub skip: Option<u64>,
    /// Maximum documents to return
    pub limit: Option<u64>,
}

impl FindQuery {
    /// Match everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Set the filter
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Add a sort key
    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Set the skip count
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Set the limit
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Equivalent pipeline stages
    pub fn to_stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if let Some(pred) = &self.filter {
            stages.push(Stage::Match(pred.clone()));
        }
        if !self.sort.is_empty() {
            stages.push(Stage::Sort(self.sort.clone()));
        }
        if let Some(n) = self.skip {
            stages.push(Stage::Skip(n));
        }
        if let Some(n) = self.limit {
            stages.push(Stage::Limit(n));
        }
        stages
    }
}

/// Store statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of collections
    pub collections: u64,
    /// Number of write operations (insert, update, delete)
    pub write_ops: u64,
    /// Number of read operations (find, aggregate)
    pub read_ops: u64,
    /// Inserts rejected by the identity constraint
    pub duplicate_key_errors: u64,
}
