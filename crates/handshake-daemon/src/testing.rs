//! Store doubles shared by unit tests

use crate::error::StorageError;
use crate::storage::{InMemoryStore, KvStore, StorageResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// In-memory store that counts reads per key and can fail selected keys
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryStore,
    reads: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self, key: &str) -> usize {
        self.reads.lock().get(key).copied().unwrap_or(0)
    }

    pub fn fail_key(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }

    pub fn heal_key(&self, key: &str) {
        self.failing.lock().remove(key);
    }
}

#[async_trait]
impl KvStore for CountingStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        self.inner.put(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        *self.reads.lock().entry(key.to_string()).or_insert(0) += 1;
        if self.failing.lock().contains(key) {
            return Err(StorageError::Connection("connection reset".to_string()));
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<bool> {
        self.inner.compare_and_swap(key, expected, new, ttl).await
    }
}
