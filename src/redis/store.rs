//! Redis-backed document store
//!
//! Identity uniqueness and conditional updates are enforced server-side by
//! Lua scripts. Reads fetch whole collections and evaluate pipelines with
//! the same [`PipelineExecutor`] the in-memory store uses, which suits
//! reference-data sized collections.

use super::connection::{RedisConfig, RedisPool};
use super::scripts::LuaScripts;
use crate::config::RedisSettings;
use crate::engine::traits::{DocumentStore, DocumentStream, FindQuery, IndexSpec, StoreStats};
use crate::error::StorageError;
use crate::storage::document::{document_id, Document, ID_FIELD};
use crate::storage::{Pipeline, PipelineExecutor};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct StoreCounters {
    write_ops: AtomicU64,
    read_ops: AtomicU64,
    duplicate_key_errors: AtomicU64,
    collections: AtomicU64,
}

/// [`DocumentStore`] persisted in Redis
pub struct RedisDocumentStore {
    pool: Arc<RedisPool>,
    scripts: LuaScripts,
    prefix: String,
    counters: StoreCounters,
}

impl RedisDocumentStore {
    /// Wrap an existing pool; every key starts with `prefix`
    pub fn new(pool: Arc<RedisPool>, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            scripts: LuaScripts::new(),
            prefix: prefix.into(),
            counters: StoreCounters::default(),
        }
    }

    /// Connect using engine settings
    pub async fn connect(settings: &RedisSettings) -> Result<Self, StorageError> {
        let pool = RedisPool::new(RedisConfig::from(settings)).await?;
        info!(
            "Connected Redis document store at {}",
            super::util::sanitize_url(&settings.url)
        );
        Ok(Self::new(Arc::new(pool), settings.key_prefix.clone()))
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &Arc<RedisPool> {
        &self.pool
    }

    fn catalog_key(&self) -> String {
        format!("{}:collections", self.prefix)
    }

    fn ids_key(&self, collection: &str) -> String {
        format!("{}:col:{}:ids", self.prefix, collection)
    }

    fn indexes_key(&self, collection: &str) -> String {
        format!("{}:col:{}:indexes", self.prefix, collection)
    }

    fn doc_prefix(&self, collection: &str) -> String {
        format!("{}:col:{}:doc:", self.prefix, collection)
    }

    fn doc_key(&self, collection: &str, id: &str) -> String {
        format!("{}{}", self.doc_prefix(collection), id)
    }

    /// Index names declared on a collection
    pub async fn indexes(&self, collection: &str) -> Result<Vec<String>, StorageError> {
        let key = self.indexes_key(collection);
        let mut names: Vec<String> = self
            .pool
            .execute(|mut conn| {
                let key = key.clone();
                async move { conn.smembers(key).await }
            })
            .await?;
        names.sort();
        Ok(names)
    }

    /// All documents of a collection, ordered by `_id`
    async fn load_collection(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        let ids_key = self.ids_key(collection);
        let mut ids: Vec<String> = self
            .pool
            .execute(|mut conn| {
                let ids_key = ids_key.clone();
                async move { conn.smembers(ids_key).await }
            })
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        ids.sort();

        let keys: Vec<String> = ids.iter().map(|id| self.doc_key(collection, id)).collect();
        let hashes: Vec<HashMap<String, String>> = self
            .pool
            .execute(|mut conn| {
                let keys = keys.clone();
                async move {
                    let mut pipe = redis::pipe();
                    for key in &keys {
                        pipe.hgetall(key);
                    }
                    pipe.query_async(&mut conn).await
                }
            })
            .await?;

        hashes
            .into_iter()
            // Deleted between SMEMBERS and HGETALL
            .filter(|h| !h.is_empty())
            .map(decode_document)
            .collect()
    }

    async fn snapshot(
        &self,
        names: &[&str],
    ) -> Result<HashMap<String, Vec<Document>>, StorageError> {
        let mut snapshot = HashMap::new();
        for &name in names {
            if !snapshot.contains_key(name) {
                let docs = self.load_collection(name).await?;
                snapshot.insert(name.to_string(), docs);
            }
        }
        Ok(snapshot)
    }
}

/// Flatten a document into HSET arguments: `field, json(value), ...`
fn encode_fields<'a>(
    fields: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Result<Vec<String>, StorageError> {
    let mut args = Vec::new();
    for (field, value) in fields {
        args.push(field.clone());
        args.push(serde_json::to_string(value)?);
    }
    Ok(args)
}

fn decode_document(hash: HashMap<String, String>) -> Result<Document, StorageError> {
    hash.into_iter()
        .map(|(field, raw)| {
            let value: Value = serde_json::from_str(&raw)?;
            Ok::<_, StorageError>((field, value))
        })
        .collect()
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    fn store_id(&self) -> &str {
        "redis-document-store-v1"
    }

    async fn create_collection(&self, name: &str) -> Result<(), StorageError> {
        let key = self.catalog_key();
        let added: i64 = self
            .pool
            .execute(|mut conn| {
                let key = key.clone();
                let name = name.to_string();
                async move { conn.sadd(key, name).await }
            })
            .await?;
        if added == 0 {
            return Err(StorageError::CollectionExists(name.to_string()));
        }
        self.counters.collections.fetch_add(1, Ordering::Relaxed);
        debug!("Created collection '{}'", name);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, StorageError> {
        let script = self.scripts.drop_collection();
        let keys = [self.catalog_key(), self.ids_key(name), self.indexes_key(name)];
        let doc_prefix = self.doc_prefix(name);
        let existed: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                let keys = keys.clone();
                let name = name.to_string();
                let doc_prefix = doc_prefix.clone();
                async move {
                    script
                        .key(&keys[0])
                        .key(&keys[1])
                        .key(&keys[2])
                        .arg(name)
                        .arg(doc_prefix)
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;
        if existed == 1 {
            self.counters.collections.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(existed == 1)
    }

    async fn list_collections(&self) -> Result<Vec<String>, StorageError> {
        let key = self.catalog_key();
        let mut names: Vec<String> = self
            .pool
            .execute(|mut conn| {
                let key = key.clone();
                async move { conn.smembers(key).await }
            })
            .await?;
        names.sort();
        self.counters
            .collections
            .store(names.len() as u64, Ordering::Relaxed);
        Ok(names)
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<(), StorageError> {
        let catalog = self.catalog_key();
        let exists: bool = self
            .pool
            .execute(|mut conn| {
                let catalog = catalog.clone();
                let collection = collection.to_string();
                async move { conn.sismember(catalog, collection).await }
            })
            .await?;
        if !exists {
            return Err(StorageError::CollectionNotFound(collection.to_string()));
        }

        let key = self.indexes_key(collection);
        let name = index.name();
        let _: i64 = self
            .pool
            .execute(|mut conn| {
                let key = key.clone();
                let name = name.clone();
                async move { conn.sadd(key, name).await }
            })
            .await?;
        Ok(())
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StorageError> {
        let id = document_id(&doc)
            .ok_or_else(|| {
                StorageError::Serialization(format!("document without string {}", ID_FIELD))
            })?
            .to_string();
        let fields = encode_fields(&doc)?;
        let script = self.scripts.insert_document();
        let keys = [
            self.doc_key(collection, &id),
            self.ids_key(collection),
            self.catalog_key(),
        ];

        self.counters.write_ops.fetch_add(1, Ordering::Relaxed);
        let inserted: i64 = self
            .pool
            .execute_write(|mut conn| {
                let script = Arc::clone(&script);
                let keys = keys.clone();
                let id = id.clone();
                let collection = collection.to_string();
                let fields = fields.clone();
                async move {
                    let mut invocation = script.prepare_invoke();
                    invocation
                        .key(&keys[0])
                        .key(&keys[1])
                        .key(&keys[2])
                        .arg(id)
                        .arg(collection);
                    for field in &fields {
                        invocation.arg(field);
                    }
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;

        if inserted == 0 {
            self.counters
                .duplicate_key_errors
                .fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        self.counters.read_ops.fetch_add(1, Ordering::Relaxed);
        let key = self.doc_key(collection, id);
        let hash: HashMap<String, String> = self
            .pool
            .execute(|mut conn| {
                let key = key.clone();
                async move { conn.hgetall(key).await }
            })
            .await?;
        if hash.is_empty() {
            return Ok(None);
        }
        decode_document(hash).map(Some)
    }

    async fn find(
        &self,
        collection: &str,
        query: FindQuery,
    ) -> Result<Vec<Document>, StorageError> {
        self.counters.read_ops.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshot(&[collection]).await?;
        let input = snapshot.get(collection).cloned().unwrap_or_default();
        PipelineExecutor::new(&snapshot).execute(input, &query.to_stages())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &str,
        set: Document,
    ) -> Result<bool, StorageError> {
        let fields = encode_fields(set.iter().filter(|(field, _)| field.as_str() != ID_FIELD))?;
        let script = self.scripts.update_fields();
        let key = self.doc_key(collection, id);

        self.counters.write_ops.fetch_add(1, Ordering::Relaxed);
        let matched: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                let key = key.clone();
                let fields = fields.clone();
                async move {
                    let mut invocation = script.prepare_invoke();
                    invocation.key(&key);
                    for field in &fields {
                        invocation.arg(field);
                    }
                    invocation.invoke_async(&mut conn).await
                }
            })
            .await?;
        Ok(matched == 1)
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let script = self.scripts.delete_document();
        let keys = [self.doc_key(collection, id), self.ids_key(collection)];

        self.counters.write_ops.fetch_add(1, Ordering::Relaxed);
        let removed: i64 = self
            .pool
            .execute(|mut conn| {
                let script = Arc::clone(&script);
                let keys = keys.clone();
                let id = id.to_string();
                async move {
                    script
                        .key(&keys[0])
                        .key(&keys[1])
                        .arg(id)
                        .invoke_async(&mut conn)
                        .await
                }
            })
            .await?;
        Ok(removed > 0)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<DocumentStream, StorageError> {
        self.counters.read_ops.fetch_add(1, Ordering::Relaxed);
        let joined = pipeline.referenced_collections();
        let names: Vec<&str> = std::iter::once(collection)
            .chain(joined.iter().map(String::as_str))
            .collect();
        let snapshot = self.snapshot(&names).await?;
        let input = snapshot.get(collection).cloned().unwrap_or_default();
        let out = PipelineExecutor::new(&snapshot).execute(input, pipeline.stages())?;
        Ok(Box::pin(futures::stream::iter(out.into_iter().map(Ok))))
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            collections: self.counters.collections.load(Ordering::Relaxed),
            write_ops: self.counters.write_ops.load(Ordering::Relaxed),
            read_ops: self.counters.read_ops.load(Ordering::Relaxed),
            duplicate_key_errors: self.counters.duplicate_key_errors.load(Ordering::Relaxed),
        }
    }
}
