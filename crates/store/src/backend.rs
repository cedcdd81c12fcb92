use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// A live key and the size of its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStat {
    pub key: String,
    pub bytes: usize,
}

/// Key/value storage with per-entry TTL.
///
/// Expiry is the only eviction mechanism: an entry is never returned once
/// `created_at + ttl` has passed. Writes overwrite silently.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every entry whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    /// Live entries whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyStat>, StoreError>;

    /// Physically drop expired entries.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
