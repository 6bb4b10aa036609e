//! Dimension registry
//!
//! Owns the set of dimension definitions. Persisted storage (the catalog
//! collection) is the source of truth; the registry keeps an in-memory cache
//! that is reloaded after every mutation and is never written directly.
//!
//! Defining a dimension provisions a row collection named after its code
//! with an ascending index on `order`. Removing it drops that collection
//! without checking whether other dimensions still reference it.
//!
//! # Example
//!
//! ```rust
//! use minz::registry::DimensionRegistry;
//! use minz::storage::InMemoryStore;
//! use minz::types::Dimension;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> minz::Result<()> {
//! let registry = DimensionRegistry::new(Arc::new(InMemoryStore::new()), "z_dimensions");
//! registry.init().await?;
//! registry.define(Dimension::new("region", "Region")).await?;
//! assert!(registry.get("region").is_some());
//! # Ok(())
//! # }
//! ```

use crate::engine::traits::{DocumentStore, FindQuery, IndexSpec};
use crate::error::{Error, Result};
use crate::metrics;
use crate::storage::{Collection, Document};
use crate::types::{Classifier, Dimension};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read access to dimension definitions
///
/// The filter compiler and row store resolve classifier shapes through this
/// trait rather than through storage.
pub trait DimensionCatalog: Send + Sync {
    /// Definition of a dimension, if known
    fn dimension(&self, code: &str) -> Option<Arc<Dimension>>;
}

impl DimensionCatalog for HashMap<String, Arc<Dimension>> {
    fn dimension(&self, code: &str) -> Option<Arc<Dimension>> {
        self.get(code).cloned()
    }
}

/// Registry of dimension definitions backed by a catalog collection
pub struct DimensionRegistry {
    /// Backing store (row collections are provisioned here)
    store: Arc<dyn DocumentStore>,
    /// Catalog collection holding one document per dimension
    catalog: Collection,
    /// Cached definitions by code
    cache: RwLock<HashMap<String, Arc<Dimension>>>,
}

impl DimensionRegistry {
    /// Create a registry over `store` using `catalog` as the definitions collection
    ///
    /// The cache is empty until [`init`](Self::init) is called.
    pub fn new(store: Arc<dyn DocumentStore>, catalog: impl Into<String>) -> Self {
        let catalog = Collection::new(Arc::clone(&store), catalog);
        Self {
            store,
            catalog,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Ensure the catalog exists and load all definitions
    pub async fn init(&self) -> Result<()> {
        let existing = self.store.list_collections().await?;
        if !existing.iter().any(|name| name == self.catalog.name()) {
            self.catalog.create().await?;
            debug!("Created dimensions catalog '{}'", self.catalog.name());
        }
        let n = self.reload().await?;
        info!("Dimension registry initialized with {} dimensions", n);
        Ok(())
    }

    /// Replace the cache with the catalog's current contents
    ///
    /// Returns the number of dimensions loaded.
    pub async fn reload(&self) -> Result<usize> {
        let docs = self.catalog.find(FindQuery::all()).await?;
        let mut loaded = HashMap::with_capacity(docs.len());
        for doc in docs {
            let dimension = Dimension::from_document(doc)?;
            loaded.insert(dimension.code.clone(), Arc::new(dimension));
        }
        let n = loaded.len();
        *self.cache.write() = loaded;
        metrics::record_registry_reload(n);
        debug!("Dimension registry reloaded ({} dimensions)", n);
        Ok(n)
    }

    /// Cached definition of a dimension
    pub fn get(&self, code: &str) -> Option<Arc<Dimension>> {
        self.cache.read().get(code).cloned()
    }

    /// Cached definition, or `NotFound`
    pub fn require(&self, code: &str) -> Result<Arc<Dimension>> {
        self.get(code).ok_or_else(|| Error::dimension_not_found(code))
    }

    /// Dimensions whose code or name contains `filter`, case-insensitively
    ///
    /// Without a filter every dimension is returned. Order is unspecified.
    pub fn list(&self, filter: Option<&str>) -> Vec<Arc<Dimension>> {
        let needle = filter.filter(|f| !f.is_empty()).map(str::to_lowercase);
        self.cache
            .read()
            .values()
            .filter(|d| match &needle {
                None => true,
                Some(f) => d.code.to_lowercase().contains(f) || d.name.to_lowercase().contains(f),
            })
            .cloned()
            .collect()
    }

    /// Define a new dimension
    ///
    /// Validates before touching storage, provisions the row collection and
    /// its `order` index, then persists the definition.
    pub async fn define(&self, dimension: Dimension) -> Result<Dimension> {
        dimension.validate()?;

        let rows = Collection::new(Arc::clone(&self.store), dimension.code.clone());
        rows.create().await?;
        rows.create_index(IndexSpec::ascending("order")).await?;

        let doc = dimension.to_document().map_err(Error::from)?;
        if let Err(e) = self.catalog.insert_one(doc).await {
            // Leave no orphan row collection behind
            if let Err(drop_err) = rows.drop_collection().await {
                warn!(
                    "Failed to drop row collection '{}' after catalog error: {}",
                    dimension.code, drop_err
                );
            }
            if e.is_duplicate_key() {
                return Err(Error::DuplicateCode {
                    dimension: self.catalog.name().to_string(),
                    code: dimension.code,
                });
            }
            return Err(e.into());
        }

        self.reload().await?;
        info!(dimension = %dimension.code, "Defined dimension");
        Ok(self.get(&dimension.code).map(|d| (*d).clone()).unwrap_or(dimension))
    }

    /// Replace name and classifiers of an existing dimension
    pub async fn update(&self, dimension: Dimension) -> Result<Dimension> {
        self.require(&dimension.code)?;
        dimension.validate()?;

        let mut set = Document::new();
        set.insert("name".to_string(), Value::String(dimension.name.clone()));
        set.insert(
            "classifiers".to_string(),
            serde_json::to_value(&dimension.classifiers)
                .map_err(|e| Error::Storage(e.into()))?,
        );
        let matched = self.catalog.update_one(&dimension.code, set).await?;
        if !matched {
            self.reload().await?;
            return Err(Error::dimension_not_found(&dimension.code));
        }

        self.reload().await?;
        info!(dimension = %dimension.code, "Updated dimension");
        Ok(self.get(&dimension.code).map(|d| (*d).clone()).unwrap_or(dimension))
    }

    /// Update the dimension when its code is known, define it otherwise
    pub async fn define_or_update(&self, dimension: Dimension) -> Result<Dimension> {
        if self.get(&dimension.code).is_some() {
            self.update(dimension).await
        } else {
            self.define(dimension).await
        }
    }

    /// Delete a definition and drop its row collection
    ///
    /// Irreversible. Rows of other dimensions that reference the removed
    /// dimension keep their (now dangling) codes.
    pub async fn remove(&self, code: &str) -> Result<()> {
        if self.catalog.find_one(code).await?.is_none() {
            return Err(Error::dimension_not_found(code));
        }
        self.catalog.delete_one(code).await?;
        self.store.drop_collection(code).await?;
        self.reload().await?;
        info!(dimension = %code, "Removed dimension and its rows");
        Ok(())
    }

    /// Append a classifier to an existing dimension
    pub async fn add_classifier(&self, code: &str, classifier: Classifier) -> Result<Dimension> {
        classifier.validate()?;
        let mut dimension = (*self.require(code)?).clone();
        if dimension.classifier(&classifier.field_name).is_some() {
            return Err(Error::Validation(format!(
                "Classifier '{}' already exists in dimension '{}'",
                classifier.field_name, code
            )));
        }
        dimension.classifiers.push(classifier);
        self.update(dimension).await
    }

    /// Replace the classifier with the same field name
    pub async fn save_classifier(&self, code: &str, classifier: Classifier) -> Result<Dimension> {
        classifier.validate()?;
        let mut dimension = (*self.require(code)?).clone();
        let slot = dimension
            .classifiers
            .iter_mut()
            .find(|c| c.field_name == classifier.field_name)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "classifier '{}' in dimension '{}'",
                    classifier.field_name, code
                ))
            })?;
        *slot = classifier;
        self.update(dimension).await
    }

    /// Remove a classifier by field name
    ///
    /// Stored rows keep the attribute; it is simply no longer maintained.
    pub async fn remove_classifier(&self, code: &str, field_name: &str) -> Result<Dimension> {
        let mut dimension = (*self.require(code)?).clone();
        let before = dimension.classifiers.len();
        dimension.classifiers.retain(|c| c.field_name != field_name);
        if dimension.classifiers.len() == before {
            return Err(Error::NotFound(format!(
                "classifier '{}' in dimension '{}'",
                field_name, code
            )));
        }
        self.update(dimension).await
    }

    /// All definitions, sorted by code
    pub fn export(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = self.cache.read().values().map(|d| (**d).clone()).collect();
        dims.sort_by(|a, b| a.code.cmp(&b.code));
        dims
    }

    /// Define or update every dimension in order
    ///
    /// Stops at the first failure; earlier dimensions stay applied.
    pub async fn import(&self, dimensions: Vec<Dimension>) -> Result<usize> {
        let mut applied = 0;
        for dimension in dimensions {
            self.define_or_update(dimension).await?;
            applied += 1;
        }
        info!("Imported {} dimension definitions", applied);
        Ok(applied)
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

impl DimensionCatalog for DimensionRegistry {
    fn dimension(&self, code: &str) -> Option<Arc<Dimension>> {
        self.get(code)
    }
}
