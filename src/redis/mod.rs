//! Redis-backed collection storage
//!
//! # Architecture
//!
//! ```text
//! Redis Schema:
//! {prefix}:collections               → SET of collection names
//! {prefix}:col:{name}:ids            → SET of document ids
//! {prefix}:col:{name}:doc:{id}       → HASH {field → JSON value}
//! {prefix}:col:{name}:indexes        → SET of index names
//! ```
//!
//! # Features
//!
//! - Shared multiplexed connection with bounded concurrency
//! - Retry with exponential backoff
//! - Atomic writes via Lua scripts
//! - Credential-free error messages
//!
//! # Example
//!
//! ```rust,no_run
//! use minz::config::RedisSettings;
//! use minz::engine::traits::DocumentStore;
//! use minz::redis::RedisDocumentStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisDocumentStore::connect(&RedisSettings::default()).await?;
//! assert_eq!(store.store_id(), "redis-document-store-v1");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod scripts;
pub mod store;
pub mod util;

pub use connection::{PoolMetricsSnapshot, RedisConfig, RedisPool, RetryPolicy};
pub use scripts::LuaScripts;
pub use store::RedisDocumentStore;
