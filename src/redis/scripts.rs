//! Lua scripts for atomic collection operations
//!
//! Every multi-key mutation of the Redis store runs as a script so other
//! writers never observe a document without its id-set entry or a dropped
//! collection with surviving documents.
//!
//! Documents are HASHes of `field → JSON value`; scripts only move strings
//! around and never decode JSON.

use parking_lot::RwLock;
use redis::Script;
use std::collections::HashMap;
use std::sync::Arc;

/// Cached Lua scripts used by [`RedisDocumentStore`](super::RedisDocumentStore)
pub struct LuaScripts {
    cache: RwLock<HashMap<&'static str, Arc<Script>>>,
}

impl LuaScripts {
    /// Empty script cache
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_create(&self, name: &'static str, lua: &str) -> Arc<Script> {
        if let Some(script) = self.cache.read().get(name) {
            return Arc::clone(script);
        }
        let script = Arc::new(Script::new(lua));
        self.cache.write().insert(name, Arc::clone(&script));
        script
    }

    /// Insert a document unless its id is taken
    ///
    /// # Keys
    /// - KEYS[1]: document hash
    /// - KEYS[2]: collection id set
    /// - KEYS[3]: collection catalog set
    ///
    /// # Arguments
    /// - ARGV[1]: document id
    /// - ARGV[2]: collection name
    /// - ARGV[3..]: field/value pairs
    ///
    /// # Returns
    /// 1 when inserted, 0 when the id already exists
    pub fn insert_document(&self) -> Arc<Script> {
        self.get_or_create(
            "insert_document",
            r#"
            if redis.call('EXISTS', KEYS[1]) == 1 then
                return 0
            end
            redis.call('HSET', KEYS[1], unpack(ARGV, 3))
            redis.call('SADD', KEYS[2], ARGV[1])
            redis.call('SADD', KEYS[3], ARGV[2])
            return 1
            "#,
        )
    }

    /// Overwrite fields of an existing document
    ///
    /// # Keys
    /// - KEYS[1]: document hash
    ///
    /// # Arguments
    /// - ARGV: field/value pairs
    ///
    /// # Returns
    /// 1 when the document exists, 0 otherwise
    pub fn update_fields(&self) -> Arc<Script> {
        self.get_or_create(
            "update_fields",
            r#"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                return 0
            end
            if #ARGV > 0 then
                redis.call('HSET', KEYS[1], unpack(ARGV))
            end
            return 1
            "#,
        )
    }

    /// Delete one document
    ///
    /// # Keys
    /// - KEYS[1]: document hash
    /// - KEYS[2]: collection id set
    ///
    /// # Arguments
    /// - ARGV[1]: document id
    ///
    /// # Returns
    /// Number of documents removed (0 or 1)
    pub fn delete_document(&self) -> Arc<Script> {
        self.get_or_create(
            "delete_document",
            r#"
            local removed = redis.call('DEL', KEYS[1])
            redis.call('SREM', KEYS[2], ARGV[1])
            return removed
            "#,
        )
    }

    /// Drop a collection with all its documents and index specs
    ///
    /// # Keys
    /// - KEYS[1]: collection catalog set
    /// - KEYS[2]: collection id set
    /// - KEYS[3]: collection index set
    ///
    /// # Arguments
    /// - ARGV[1]: collection name
    /// - ARGV[2]: document key prefix (id is appended)
    ///
    /// # Returns
    /// 1 when the collection existed, 0 otherwise
    pub fn drop_collection(&self) -> Arc<Script> {
        self.get_or_create(
            "drop_collection",
            r#"
            local existed = redis.call('SREM', KEYS[1], ARGV[1])
            local ids = redis.call('SMEMBERS', KEYS[2])
            for _, id in ipairs(ids) do
                redis.call('DEL', ARGV[2] .. id)
            end
            redis.call('DEL', KEYS[2], KEYS[3])
            return existed
            "#,
        )
    }
}

impl Default for LuaScripts {
    fn default() -> Self {
        Self::new()
    }
}
