//! Named collection handle
//!
//! Binds a [`DocumentStore`] to one collection name so callers don't thread
//! the name through every call.

use super::document::Document;
use super::pipeline::Pipeline;
use crate::engine::traits::{DocumentStore, DocumentStream, FindQuery, IndexSpec};
use crate::error::StorageError;
use futures::TryStreamExt;
use std::sync::Arc;

/// Handle to one collection of a document store
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl Collection {
    /// Bind `store` to the collection `name`
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provision the collection
    pub async fn create(&self) -> Result<(), StorageError> {
        self.store.create_collection(&self.name).await
    }

    /// Drop the collection
    pub async fn drop_collection(&self) -> Result<bool, StorageError> {
        self.store.drop_collection(&self.name).await
    }

    /// Create an index
    pub async fn create_index(&self, index: IndexSpec) -> Result<(), StorageError> {
        self.store.create_index(&self.name, index).await
    }

    /// Insert a document
    pub async fn insert_one(&self, doc: Document) -> Result<(), StorageError> {
        self.store.insert_one(&self.name, doc).await
    }

    /// Point lookup by `_id`
    pub async fn find_one(&self, id: &str) -> Result<Option<Document>, StorageError> {
        self.store.find_one(&self.name, id).await
    }

    /// Filtered read
    pub async fn find(&self, query: FindQuery) -> Result<Vec<Document>, StorageError> {
        self.store.find(&self.name, query).await
    }

    /// Set fields on one document
    pub async fn update_one(&self, id: &str, set: Document) -> Result<bool, StorageError> {
        self.store.update_one(&self.name, id, set).await
    }

    /// Delete one document
    pub async fn delete_one(&self, id: &str) -> Result<bool, StorageError> {
        self.store.delete_one(&self.name, id).await
    }

    /// Run a pipeline, returning the lazy result stream
    pub async fn aggregate(&self, pipeline: &Pipeline) -> Result<DocumentStream, StorageError> {
        self.store.aggregate(&self.name, pipeline).await
    }

    /// Run a pipeline and drain the result stream
    pub async fn aggregate_to_vec(
        &self,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StorageError> {
        self.aggregate(pipeline).await?.try_collect().await
    }

    /// Run a pipeline and return only its first document
    ///
    /// The rest of the stream is dropped unread.
    pub async fn aggregate_first(
        &self,
        pipeline: &Pipeline,
    ) -> Result<Option<Document>, StorageError> {
        let mut stream = self.aggregate(pipeline).await?;
        stream.try_next().await
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("store", &self.store.store_id())
            .field("name", &self.name)
            .finish()
    }
}
