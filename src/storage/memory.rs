//! In-memory document store
//!
//! Process-local implementation of [`DocumentStore`]. Enforces `_id`
//! uniqueness and evaluates pipelines with [`PipelineExecutor`]. Data is lost
//! on restart; use it for tests and single-process deployments.
//!
//! # Example
//!
//! ```rust
//! use minz::engine::traits::DocumentStore;
//! use minz::storage::InMemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryStore::new();
//! store.create_collection("region").await.unwrap();
//! assert_eq!(store.list_collections().await.unwrap(), vec!["region".to_string()]);
//! # }
//! ```

use super::document::{document_id, Document, ID_FIELD};
use super::executor::PipelineExecutor;
use super::pipeline::Pipeline;
use crate::engine::traits::{DocumentStore, DocumentStream, FindQuery, IndexSpec, StoreStats};
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct MemCollection {
    /// Documents keyed by `_id`
    docs: BTreeMap<String, Document>,
    /// Declared indexes (metadata only)
    indexes: Vec<IndexSpec>,
}

struct StatsAtomic {
    write_ops: AtomicU64,
    read_ops: AtomicU64,
    duplicate_key_errors: AtomicU64,
}

/// In-memory [`DocumentStore`]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
    stats: StatsAtomic,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            stats: StatsAtomic {
                write_ops: AtomicU64::new(0),
                read_ops: AtomicU64::new(0),
                duplicate_key_errors: AtomicU64::new(0),
            },
        }
    }

    /// Indexes declared on a collection
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    /// Number of documents in a collection (0 if missing)
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    /// Copy the documents of every named collection
    fn snapshot(&self, names: &[&str]) -> HashMap<String, Vec<Document>> {
        let collections = self.collections.read();
        names
            .iter()
            .map(|&name| {
                let docs = collections
                    .get(name)
                    .map(|c| c.docs.values().cloned().collect())
                    .unwrap_or_default();
                (name.to_string(), docs)
            })
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn store_id(&self) -> &str {
        "in-memory-v1"
    }

    async fn create_collection(&self, name: &str) -> Result<(), StorageError> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(StorageError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), MemCollection::default());
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.collections.write().remove(name).is_some())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<(), StorageError> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        if !col.indexes.contains(&index) {
            col.indexes.push(index);
        }
        Ok(())
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StorageError> {
        let id = document_id(&doc)
            .ok_or_else(|| {
                StorageError::Serialization(format!("document without string {}", ID_FIELD))
            })?
            .to_string();

        self.stats.write_ops.fetch_add(1, Ordering::Relaxed);
        let mut collections = self.collections.write();
        let col = collections.entry(collection.to_string()).or_default();
        if col.docs.contains_key(&id) {
            self.stats
                .duplicate_key_errors
                .fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        col.docs.insert(id, doc);
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        self.stats.read_ops.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.docs.get(id).cloned()))
    }

    async fn find(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> Result<Vec<Document>, StorageError> {
        self.stats.read_ops.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshot(&[collection]);
        let input = snapshot.get(collection).cloned().unwrap_or_default();
        PipelineExecutor::new(&snapshot).execute(input, &query.to_stages())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        set: Document,
    ) -> Result<bool, StorageError> {
        self.stats.write_ops.fetch_add(1, Ordering::Relaxed);
        let mut collections = self.collections.write();
        let Some(doc) = collections.get_mut(collection).and_then(|c| c.docs.get_mut(id)) else {
            return Ok(false);
        };
        for (field, value) in set {
            if field == ID_FIELD {
                continue;
            }
            doc.insert(field, value);
        }
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        self.stats.write_ops.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .map(|c| c.docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<DocumentStream, StorageError> {
        self.stats.read_ops.fetch_add(1, Ordering::Relaxed);
        let joined = pipeline.referenced_collections();
        let names: Vec<&str> = std::iter::once(collection)
            .chain(joined.iter().map(String::as_str))
            .collect();
        let snapshot = self.snapshot(&names);
        let input = snapshot.get(collection).cloned().unwrap_or_default();
        let out = PipelineExecutor::new(&snapshot).execute(input, pipeline.stages())?;
        Ok(Box::pin(futures::stream::iter(out.into_iter().map(Ok))))
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            collections: self.collections.read().len() as u64,
            write_ops: self.stats.write_ops.load(Ordering::Relaxed),
            read_ops: self.stats.read_ops.load(Ordering::Relaxed),
            duplicate_key_errors: self.stats.duplicate_key_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pipeline::{Predicate, SortKey, Stage};
    use futures::TryStreamExt;
    use serde_json::{json, Value};

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_collection_twice_fails() {
        let store = InMemoryStore::new();
        store.create_collection("region").await.unwrap();
        let err = store.create_collection("region").await.unwrap_err();
        assert!(matches!(err, StorageError::CollectionExists(_)));
    }

    #[tokio::test]
    async fn test_insert_enforces_identity() {
        let store = InMemoryStore::new();
        store
            .insert_one("region", doc(json!({"_id": "05", "name": "Coquimbo"})))
            .await
            .unwrap();
        let err = store
            .insert_one("region", doc(json!({"_id": "05", "name": "Other"})))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.stats().duplicate_key_errors, 1);

        let found = store.find_one("region", "05").await.unwrap().unwrap();
        assert_eq!(found["name"], json!("Coquimbo"));
    }

    #[tokio::test]
    async fn test_insert_without_id_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .insert_one("region", doc(json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = InMemoryStore::new();
        store
            .insert_one("region", doc(json!({"_id": "05", "name": "A", "order": 1})))
            .await
            .unwrap();
        assert!(store
            .update_one("region", "05", doc(json!({"name": "B"})))
            .await
            .unwrap());
        assert!(!store
            .update_one("region", "99", doc(json!({"name": "B"})))
            .await
            .unwrap());

        let found = store.find_one("region", "05").await.unwrap().unwrap();
        assert_eq!(found["name"], json!("B"));
        assert_eq!(found["order"], json!(1));

        assert!(store.delete_one("region", "05").await.unwrap());
        assert!(!store.delete_one("region", "05").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_sorted_window() {
        let store = InMemoryStore::new();
        for (id, order) in [("a", 3), ("b", 1), ("c", 2)] {
            store
                .insert_one("x", doc(json!({"_id": id, "order": order})))
                .await
                .unwrap();
        }
        let top = store
            .find("x", FindQuery::all().sort(SortKey::desc("order")).limit(1))
            .await
            .unwrap();
        assert_eq!(top[0]["_id"], json!("a"));
    }

    #[tokio::test]
    async fn test_aggregate_streams_results() {
        let store = InMemoryStore::new();
        for id in ["a", "b", "c"] {
            store
                .insert_one("x", doc(json!({"_id": id, "k": id != "b"})))
                .await
                .unwrap();
        }
        let pipeline = Pipeline::new()
            .then(Stage::Match(Predicate::eq("k", true)))
            .then(Stage::Count("n".into()));
        let out: Vec<Document> = store
            .aggregate("x", &pipeline)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(out, vec![doc(json!({"n": 2}))]);
    }

    #[tokio::test]
    async fn test_drop_collection() {
        let store = InMemoryStore::new();
        store.create_collection("x").await.unwrap();
        store
            .create_index("x", IndexSpec::ascending("order"))
            .await
            .unwrap();
        assert_eq!(store.indexes("x").len(), 1);
        assert!(store.drop_collection("x").await.unwrap());
        assert!(!store.drop_collection("x").await.unwrap());
        assert!(store.list_collections().await.unwrap().is_empty());
    }
}
