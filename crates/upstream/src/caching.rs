//! Session-metadata caching in front of any [`UpstreamGateway`].
//!
//! Schedules and session metadata are cached in the `session` namespace:
//!
//! - `{ns}:session:{season}:schedule`
//! - `{ns}:session:{season}:{round}:{session}:metadata`
//! - `{ns}:session:{season}:{round}:{session}:participants`
//! - `{ns}:session:{season}:{round}:{session}:loaded`
//!
//! A session is served from cache only when the `loaded` marker is
//! present. Cache failures never fail a request; they fall through to the
//! provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sculpt_core::artifact::RawTrace;
use sculpt_core::key::{schedule_cache_key, SessionFacet, SessionKey};
use sculpt_core::session::{EventSummary, SessionInfo};
use sculpt_store::ResultCache;
use serde::{Deserialize, Serialize};

use crate::gateway::{UpstreamError, UpstreamGateway};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMetadata {
    event_name: String,
    session_name: String,
    session_date: Option<NaiveDate>,
}

pub struct CachingGateway {
    inner: Arc<dyn UpstreamGateway>,
    cache: ResultCache,
}

impl CachingGateway {
    pub fn new(inner: Arc<dyn UpstreamGateway>, cache: ResultCache) -> Self {
        Self { inner, cache }
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get_json(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Session cache read failed");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) {
        let ttl = self.cache.ttls().session;
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            tracing::warn!(key, error = %e, "Session cache write failed");
        }
    }

    async fn cached_session(&self, key: &SessionKey) -> Option<SessionInfo> {
        let prefix = self.cache.prefix();
        self.read::<bool>(&key.cache_key(prefix, SessionFacet::Loaded))
            .await
            .filter(|loaded| *loaded)?;
        let metadata: SessionMetadata = self
            .read(&key.cache_key(prefix, SessionFacet::Metadata))
            .await?;
        let participants: Vec<String> = self
            .read(&key.cache_key(prefix, SessionFacet::Participants))
            .await?;

        Some(SessionInfo {
            season: key.season,
            event_round: key.event_round,
            session: key.session,
            event_name: metadata.event_name,
            session_date: metadata.session_date,
            participants,
        })
    }

    async fn remember_session(&self, key: &SessionKey, info: &SessionInfo) {
        let prefix = self.cache.prefix();
        let metadata = SessionMetadata {
            event_name: info.event_name.clone(),
            session_name: info.session_label().to_string(),
            session_date: info.session_date,
        };
        self.write(&key.cache_key(prefix, SessionFacet::Metadata), &metadata)
            .await;
        self.write(
            &key.cache_key(prefix, SessionFacet::Participants),
            &info.participants,
        )
        .await;
        // Written last so a partial write is never treated as loaded.
        self.write(&key.cache_key(prefix, SessionFacet::Loaded), &true)
            .await;
    }
}

#[async_trait]
impl UpstreamGateway for CachingGateway {
    async fn event_schedule(&self, season: i32) -> Result<Vec<EventSummary>, UpstreamError> {
        let key = schedule_cache_key(self.cache.prefix(), season);
        if let Some(schedule) = self.read::<Vec<EventSummary>>(&key).await {
            tracing::debug!(season, "Schedule served from cache");
            return Ok(schedule);
        }
        let schedule = self.inner.event_schedule(season).await?;
        self.write(&key, &schedule).await;
        Ok(schedule)
    }

    async fn fetch_session(&self, key: SessionKey) -> Result<SessionInfo, UpstreamError> {
        if let Some(info) = self.cached_session(&key).await {
            tracing::debug!(
                season = key.season,
                round = key.event_round,
                session = %key.session,
                "Session metadata served from cache"
            );
            return Ok(info);
        }
        let info = self.inner.fetch_session(key).await?;
        self.remember_session(&key, &info).await;
        Ok(info)
    }

    async fn extract_participant_trace(
        &self,
        session: &SessionInfo,
        participant: &str,
    ) -> Result<RawTrace, UpstreamError> {
        self.inner
            .extract_participant_trace(session, participant)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::StaticGateway;
    use sculpt_core::session::SessionCode;
    use sculpt_store::{CacheTtls, MemoryBackend};

    fn setup() -> (Arc<StaticGateway>, CachingGateway, ResultCache) {
        let fixture = Arc::new(StaticGateway::season_2024());
        let cache = ResultCache::new(Arc::new(MemoryBackend::new()), "f1", CacheTtls::default());
        let gateway = CachingGateway::new(fixture.clone(), cache.clone());
        (fixture, gateway, cache)
    }

    #[tokio::test]
    async fn second_session_load_is_served_from_cache() {
        let (fixture, gateway, cache) = setup();
        let key = SessionKey::new(2024, 1, SessionCode::Q).unwrap();

        let first = gateway.fetch_session(key).await.unwrap();
        let second = gateway.fetch_session(key).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fixture.session_calls(), 1);
        assert!(cache
            .contains("f1:session:2024:1:Q:participants")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn schedule_is_cached_per_season() {
        let (fixture, gateway, cache) = setup();

        gateway.event_schedule(2024).await.unwrap();
        gateway.event_schedule(2024).await.unwrap();

        assert_eq!(fixture.schedule_calls(), 1);
        assert!(cache.contains("f1:session:2024:schedule").await.unwrap());
    }

    #[tokio::test]
    async fn upstream_errors_are_not_cached() {
        let (fixture, gateway, _) = setup();
        let key = SessionKey::new(2024, 99, SessionCode::R).unwrap();

        assert!(gateway.fetch_session(key).await.is_err());
        assert!(gateway.fetch_session(key).await.is_err());
        assert_eq!(fixture.session_calls(), 2);
    }

    #[tokio::test]
    async fn missing_loaded_marker_forces_reload() {
        let (fixture, gateway, cache) = setup();
        let key = SessionKey::new(2024, 1, SessionCode::Q).unwrap();
        gateway.fetch_session(key).await.unwrap();

        cache
            .backend()
            .delete("f1:session:2024:1:Q:loaded")
            .await
            .unwrap();
        gateway.fetch_session(key).await.unwrap();

        assert_eq!(fixture.session_calls(), 2);
    }
}
