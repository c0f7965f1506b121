//! Key-value store access.
//!
//! The pipeline only ever reads three shapes of data: plain string keys,
//! key enumeration by glob pattern, and list ranges. `KvStore` captures
//! exactly that surface so the Redis-backed pool and the in-process store are
//! interchangeable.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::fmt;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Any network or protocol failure while talking to the store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{operation} failed: {cause}")]
pub struct StoreError {
    /// The command that failed, e.g. `GET name:sensorA`.
    pub operation: String,
    pub cause: String,
}

impl StoreError {
    pub fn new(operation: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `GET key`. `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// `KEYS pattern`, in whatever order the store reports them.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// `LRANGE key start stop`. Negative indices count from the tail, so
    /// `(-n, -1)` yields the most recent `n` entries in insertion order.
    async fn lrange(&self, key: &str, start: isize, stop: isize)
    -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Resolve Redis-style inclusive `start..=stop` indices against a list of
/// `len` items. Returns `None` when the range is empty.
pub(crate) fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    if len == 0 {
        return None;
    }

    let start = if start < 0 {
        (len + start).max(0)
    } else {
        start.min(len)
    };
    let stop = if stop < 0 {
        (len + stop).max(-1)
    } else {
        stop.min(len - 1)
    };

    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
