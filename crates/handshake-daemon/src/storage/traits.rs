//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Key/value store with optional per-key expiry.
///
/// Values are opaque serialized records. An expired key reads as absent.
/// Implementations may be shared by several processes; readers must tolerate
/// read-after-write lag of one polling interval.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store a value, replacing any previous one
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()>;

    /// Read a value
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value; returns whether it existed
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Replace the value only if it still equals `expected`
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<bool>;
}
