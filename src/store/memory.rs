use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{KvStore, StoreError, resolve_range};

/// In-process store with Redis read semantics.
///
/// Used for local runs without Redis and throughout the test suite. Strings
/// live in a `BTreeMap`, so `keys` reports matches in lexical order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    strings: RwLock<BTreeMap<String, String>>,
    lists: RwLock<HashMap<String, Vec<String>>>,
    /// Number of upcoming calls that fail with a synthetic connection error.
    pending_failures: AtomicU32,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.strings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn rpush(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lists
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Make the next `n` calls fail, whatever command they issue.
    pub fn inject_failures(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Total commands issued against this store, failed ones included.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self, operation: impl FnOnce() -> String) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::new(operation(), "injected connection failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.begin(|| format!("GET {key}"))?;
        Ok(self
            .strings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.begin(|| format!("KEYS {pattern}"))?;
        let strings = self.strings.read().unwrap_or_else(PoisonError::into_inner);
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);

        let mut keys: Vec<String> = strings
            .keys()
            .chain(lists.keys())
            .filter(|k| glob_match::glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.begin(|| format!("LRANGE {key} {start} {stop}"))?;
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list[from..=to].to_vec(),
            None => Vec::new(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.begin(|| "PING".to_string())
    }
}
