//! In-process [`KvBackend`].
//!
//! Thread-safe via an interior `RwLock`; designed to be wrapped in `Arc`
//! and shared across the application. Expired entries are hidden from
//! reads immediately and physically removed by [`KvBackend::purge_expired`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sculpt_core::clock::{Clock, SystemClock};
use sculpt_core::types::Timestamp;
use tokio::sync::RwLock;

use crate::backend::{KeyStat, KvBackend};
use crate::error::StoreError;

struct Entry {
    value: String,
    created_at: Timestamp,
    ttl: Duration,
}

impl Entry {
    fn is_live(&self, now: Timestamp) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        match self.created_at.checked_add_signed(ttl) {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Backend reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            value,
            created_at: self.clock.now(),
            ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let mut removed = 0u64;
        entries.retain(|key, entry| {
            if key.starts_with(prefix) {
                if entry.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyStat>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut stats: Vec<KeyStat> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, entry)| KeyStat {
                key: key.clone(),
                bytes: entry.value.len(),
            })
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(stats)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sculpt_core::clock::ManualClock;

    fn backend() -> (Arc<ManualClock>, MemoryBackend) {
        let clock = Arc::new(ManualClock::default());
        let backend = MemoryBackend::with_clock(clock.clone());
        (clock, backend)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (_, kv) = backend();
        kv.set("a", "1".into(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn entries_expire_exactly_at_ttl() {
        let (clock, kv) = backend();
        kv.set("a", "1".into(), Duration::from_secs(10)).await.unwrap();

        clock.advance(Duration::from_millis(9_999));
        assert!(kv.get("a").await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(kv.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_resets_ttl() {
        let (clock, kv) = backend();
        kv.set("a", "1".into(), Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));
        kv.set("a", "2".into(), Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn delete_prefix_counts_only_live_entries() {
        let (clock, kv) = backend();
        kv.set("f1:sculpture:a", "x".into(), Duration::from_secs(5)).await.unwrap();
        kv.set("f1:sculpture:b", "x".into(), Duration::from_secs(50)).await.unwrap();
        kv.set("f1:session:c", "x".into(), Duration::from_secs(50)).await.unwrap();
        clock.advance(Duration::from_secs(10));

        assert_eq!(kv.delete_prefix("f1:sculpture:").await.unwrap(), 1);
        assert_eq!(kv.raw_len().await, 1);
    }

    #[tokio::test]
    async fn purge_drops_expired_entries() {
        let (clock, kv) = backend();
        kv.set("a", "1".into(), Duration::from_secs(1)).await.unwrap();
        kv.set("b", "1".into(), Duration::from_secs(100)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(kv.purge_expired().await.unwrap(), 1);
        assert_eq!(kv.raw_len().await, 1);
    }
}
