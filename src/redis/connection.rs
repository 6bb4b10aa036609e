//! Redis connection handling
//!
//! One multiplexed connection shared by every caller, with a semaphore
//! capping in-flight commands, per-command timeouts and retry with
//! exponential backoff. Failures surface as `StorageError::Connection` with
//! credentials stripped from the message.
//!
//! ```rust,no_run
//! use minz::redis::{RedisConfig, RedisPool};
//!
//! # async fn example() -> Result<(), minz::error::StorageError> {
//! let pool = RedisPool::new(RedisConfig::with_url("redis://localhost:6379")).await?;
//! let pong: String = pool
//!     .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
//!     .await?;
//! assert_eq!(pong, "PONG");
//! # Ok(())
//! # }
//! ```

use crate::config::RedisSettings;
use crate::error::StorageError;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use super::util::safe_redis_error;

/// Connection settings for [`RedisPool`]
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Server URL (`redis://` or, with TLS, `rediss://`)
    pub url: String,
    /// Maximum concurrent commands
    pub pool_size: u32,
    /// Timeout for establishing the connection
    pub connection_timeout: Duration,
    /// Timeout for a single command
    pub command_timeout: Duration,
    /// Retry behaviour for transient failures
    pub retry_policy: RetryPolicy,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::from(&RedisSettings::default())
    }
}

impl From<&RedisSettings> for RedisConfig {
    fn from(settings: &RedisSettings) -> Self {
        Self {
            url: settings.url.clone(),
            pool_size: settings.pool_size,
            connection_timeout: settings.connection_timeout(),
            command_timeout: settings.command_timeout(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl RedisConfig {
    /// Default settings pointed at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Check the settings before connecting
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("Pool size cannot exceed 1000".to_string());
        }

        #[cfg(not(feature = "redis-tls"))]
        if self.url.starts_with("rediss://") {
            return Err(
                "URL uses 'rediss://' but the 'redis-tls' feature is not compiled".to_string(),
            );
        }

        Ok(())
    }
}

/// Retry policy with exponential backoff
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Add up to 25% random jitter
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = base.min(self.max_delay.as_millis() as f64);
        let delay_ms = if self.jitter {
            delay_ms * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            delay_ms
        };
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether another attempt is allowed after `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Whether a timed-out attempt may be retried
    ///
    /// Never for non-idempotent commands: the server may have applied them.
    pub fn should_retry_timeout(&self, attempt: u32, idempotent: bool) -> bool {
        idempotent && self.should_retry(attempt)
    }
}

/// Pool counters
#[derive(Debug, Default)]
pub struct PoolMetrics {
    connections_created: AtomicU64,
    commands_executed: AtomicU64,
    command_failures: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of [`PoolMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    /// Connections established
    pub connections_created: u64,
    /// Commands that succeeded
    pub commands_executed: u64,
    /// Command attempts that failed or timed out
    pub command_failures: u64,
    /// Retries performed
    pub retries: u64,
}

impl PoolMetrics {
    fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Shared Redis connection with bounded concurrency
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
    metrics: PoolMetrics,
    semaphore: Arc<Semaphore>,
}

impl RedisPool {
    /// Connect to Redis
    pub async fn new(config: RedisConfig) -> Result<Self, StorageError> {
        config.validate().map_err(StorageError::Connection)?;

        let client = Client::open(config.url.as_str())
            .map_err(|e| StorageError::Connection(safe_redis_error(&config.url, &e)))?;
        let semaphore = Arc::new(Semaphore::new(config.pool_size as usize));

        let pool = Self {
            client,
            connection: RwLock::new(None),
            config,
            metrics: PoolMetrics::default(),
            semaphore,
        };
        pool.connect().await?;

        debug!("Redis connection pool initialized");
        Ok(pool)
    }

    async fn connect(&self) -> Result<MultiplexedConnection, StorageError> {
        let start = Instant::now();
        let conn = tokio::time::timeout(
            self.config.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StorageError::Connection("Connection timeout".to_string()))?
        .map_err(|e| StorageError::Connection(safe_redis_error(&self.config.url, &e)))?;

        *self.connection.write().await = Some(conn.clone());
        self.metrics
            .connections_created
            .fetch_add(1, Ordering::Relaxed);
        debug!("Redis connection established in {:?}", start.elapsed());
        Ok(conn)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        let current = self.connection.read().await.clone();
        match current {
            Some(conn) => Ok(conn),
            None => self.connect().await,
        }
    }

    /// Run a command with timeout and retry
    ///
    /// `f` may be called several times; it receives a fresh handle to the
    /// shared connection each time.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        self.run(f, true).await
    }

    /// Run a non-idempotent command
    ///
    /// A timed-out attempt may still have been applied by the server, so it
    /// is reported as a failure instead of being retried.
    pub async fn execute_write<F, Fut, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        self.run(f, false).await
    }

    async fn run<F, Fut, T>(&self, f: F, idempotent: bool) -> Result<T, StorageError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| StorageError::Connection("Semaphore closed".to_string()))?;

        let mut attempt = 0;
        loop {
            let conn = self.connection().await?;
            let result = tokio::time::timeout(self.config.command_timeout, f(conn)).await;

            let retriable = match result {
                Ok(Ok(value)) => {
                    self.metrics
                        .commands_executed
                        .fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                },
                Ok(Err(e)) => {
                    self.metrics.command_failures.fetch_add(1, Ordering::Relaxed);
                    let allowed = if e.is_timeout() {
                        self.config.retry_policy.should_retry_timeout(attempt, idempotent)
                    } else {
                        self.config.retry_policy.should_retry(attempt)
                    };
                    if !is_retriable_error(&e) || !allowed {
                        return Err(StorageError::Connection(safe_redis_error(
                            &self.config.url,
                            &e,
                        )));
                    }
                    if e.is_connection_dropped() || e.is_io_error() {
                        *self.connection.write().await = None;
                    }
                    safe_redis_error(&self.config.url, &e)
                },
                Err(_) => {
                    self.metrics.command_failures.fetch_add(1, Ordering::Relaxed);
                    if !self.config.retry_policy.should_retry_timeout(attempt, idempotent) {
                        return Err(StorageError::Connection("Command timeout".to_string()));
                    }
                    "Command timeout".to_string()
                },
            };

            self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            let delay = self.config.retry_policy.delay_for_attempt(attempt);
            warn!(
                "Redis command failed (attempt {}), retrying in {:?}: {}",
                attempt + 1,
                delay,
                retriable
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Round-trip a PING
    pub async fn ping(&self) -> Result<Duration, StorageError> {
        let start = Instant::now();
        self.execute(|mut conn| async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await?;
        Ok(start.elapsed())
    }

    /// Pool counters
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Pool configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

fn is_retriable_error(e: &RedisError) -> bool {
    e.is_connection_dropped()
        || e.is_timeout()
        || e.is_io_error()
        || matches!(e.kind(), redis::ErrorKind::BusyLoadingError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let mut settings = RedisSettings::default();
        settings.pool_size = 4;
        settings.command_timeout_ms = 250;
        let config = RedisConfig::from(&settings);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.command_timeout, Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(RedisConfig::with_url("").validate().is_err());

        let mut config = RedisConfig::default();
        config.pool_size = 0;
        assert!(config.validate().is_err());
        config.pool_size = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_delays_grow_and_cap() {
        let policy = RetryPolicy {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(2));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(0));
    }

    #[test]
    fn test_timeouts_not_retried_for_writes() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_timeout(0, true));
        assert!(!policy.should_retry_timeout(3, true));
        assert!(!policy.should_retry_timeout(0, false));
        assert!(policy.should_retry(0));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for_attempt(0);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(63));
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_ping() {
        let pool = RedisPool::new(RedisConfig::default()).await.unwrap();
        assert!(pool.ping().await.is_ok());
        assert_eq!(pool.metrics().connections_created, 1);
    }
}
