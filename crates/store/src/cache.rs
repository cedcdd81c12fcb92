//! Namespaced result cache.
//!
//! Keys follow `{prefix}:{namespace}:...` as produced by
//! [`ArtifactKey::fingerprint`] and [`SessionKey::cache_key`]. Values are
//! JSON. A corrupt entry is logged and reported as a miss; a backend
//! failure is surfaced as [`StoreError::Unavailable`] so the caller can
//! decide whether to recompute.
//!
//! [`SessionKey::cache_key`]: sculpt_core::key::SessionKey::cache_key

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sculpt_core::key::{ArtifactKey, CacheNamespace};
use sculpt_core::task::TaskResult;

use crate::backend::KvBackend;
use crate::error::StoreError;

/// Retention per kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub artifact: Duration,
    pub session: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            artifact: Duration::from_secs(7 * 24 * 60 * 60),
            session: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_keys: usize,
    pub sculpture_keys: usize,
    pub comparison_keys: usize,
    pub session_keys: usize,
    /// Sum of stored value sizes.
    pub approximate_memory_bytes: usize,
}

#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn KvBackend>,
    prefix: String,
    ttls: CacheTtls,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn KvBackend>, prefix: impl Into<String>, ttls: CacheTtls) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            ttls,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    // -----------------------------------------------------------------------
    // Raw access
    // -----------------------------------------------------------------------

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backend.get(key).await
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.backend.set(key, value, ttl).await
    }

    pub async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.backend.get(key).await?.is_some())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, raw, ttl).await
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    pub fn fingerprint(&self, key: &ArtifactKey) -> String {
        key.fingerprint(&self.prefix)
    }

    pub async fn get_artifact(&self, key: &ArtifactKey) -> Result<Option<TaskResult>, StoreError> {
        let result: Option<TaskResult> = self.get_json(&self.fingerprint(key)).await?;
        // A payload of the wrong shape for the key is as good as missing.
        Ok(result.filter(|r| matches!(r, TaskResult::Comparison(_)) == key.is_comparison()))
    }

    pub async fn put_artifact(&self, key: &ArtifactKey, result: &TaskResult) -> Result<(), StoreError> {
        self.set_json(&self.fingerprint(key), result, self.ttls.artifact)
            .await
    }

    pub async fn contains_artifact(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
        self.contains(&self.fingerprint(key)).await
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    pub async fn stats(&self) -> Result<CacheStats, StoreError> {
        let mut stats = CacheStats::default();
        for namespace in CacheNamespace::ALL {
            let entries = self
                .backend
                .scan_prefix(&namespace.key_prefix(&self.prefix))
                .await?;
            let count = entries.len();
            stats.total_keys += count;
            stats.approximate_memory_bytes +=
                entries.iter().map(|e| e.key.len() + e.bytes).sum::<usize>();
            match namespace {
                CacheNamespace::Sculpture => stats.sculpture_keys = count,
                CacheNamespace::Comparison => stats.comparison_keys = count,
                CacheNamespace::Session => stats.session_keys = count,
            }
        }
        Ok(stats)
    }

    /// Remove every entry in `namespace`, or in all namespaces when `None`.
    pub async fn clear(&self, namespace: Option<CacheNamespace>) -> Result<u64, StoreError> {
        let namespaces: Vec<CacheNamespace> = match namespace {
            Some(ns) => vec![ns],
            None => CacheNamespace::ALL.to_vec(),
        };
        let mut removed = 0;
        for ns in namespaces {
            removed += self
                .backend
                .delete_prefix(&ns.key_prefix(&self.prefix))
                .await?;
        }
        tracing::info!(?namespace, removed, "Cache cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use sculpt_core::artifact::{Artifact, ArtifactStats, LapSummary};
    use sculpt_core::session::SessionCode;

    fn cache() -> ResultCache {
        ResultCache::new(Arc::new(MemoryBackend::new()), "f1", CacheTtls::default())
    }

    fn artifact(code: &str) -> Artifact {
        Artifact {
            participant: code.to_string(),
            lap: LapSummary::default(),
            points: vec![],
            stats: ArtifactStats {
                max_g_force: 0.0,
                avg_g_force: 0.0,
                max_speed_kmh: 0.0,
                point_count: 0,
            },
        }
    }

    #[tokio::test]
    async fn artifact_round_trip_uses_fingerprint() {
        let cache = cache();
        let key = ArtifactKey::single(2024, 1, SessionCode::Q, "ver").unwrap();
        let result = TaskResult::Single(artifact("VER"));

        cache.put_artifact(&key, &result).await.unwrap();

        assert!(cache.contains("f1:sculpture:2024:1:Q:VER").await.unwrap());
        assert_eq!(cache.get_artifact(&key).await.unwrap(), Some(result));
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_miss() {
        let cache = cache();
        let key = ArtifactKey::single(2024, 1, SessionCode::Q, "VER").unwrap();
        cache
            .set(&cache.fingerprint(&key), "{not json".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_artifact(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stats_count_per_namespace() {
        let cache = cache();
        let single = ArtifactKey::single(2024, 1, SessionCode::Q, "VER").unwrap();
        let pair = ArtifactKey::comparison(2024, 1, SessionCode::Q, &["VER", "HAM"]).unwrap();
        cache
            .put_artifact(&single, &TaskResult::Single(artifact("VER")))
            .await
            .unwrap();
        cache
            .set("f1:comparison:2024:1:Q:HAM+VER", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("f1:session:2024:1:Q:loaded", "true".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("task-meta:abc", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_keys, 3);
        assert_eq!(stats.sculpture_keys, 1);
        assert_eq!(stats.comparison_keys, 1);
        assert_eq!(stats.session_keys, 1);
        assert!(stats.approximate_memory_bytes > 0);
        assert!(cache.contains_artifact(&pair).await.unwrap());
    }

    #[tokio::test]
    async fn clear_single_namespace_leaves_the_rest() {
        let cache = cache();
        let ttl = Duration::from_secs(60);
        cache.set("f1:sculpture:a", "1".into(), ttl).await.unwrap();
        cache.set("f1:sculpture:b", "1".into(), ttl).await.unwrap();
        cache.set("f1:session:c", "1".into(), ttl).await.unwrap();

        assert_eq!(cache.clear(Some(CacheNamespace::Sculpture)).await.unwrap(), 2);
        assert!(cache.contains("f1:session:c").await.unwrap());

        assert_eq!(cache.clear(None).await.unwrap(), 1);
        assert_eq!(cache.stats().await.unwrap().total_keys, 0);
    }
}
