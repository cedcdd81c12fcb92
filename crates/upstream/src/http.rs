//! REST client for the telemetry provider.
//!
//! | Method | Path                                                            | Returns          |
//! |--------|-----------------------------------------------------------------|------------------|
//! | GET    | `/seasons/{season}/schedule`                                    | `[EventSummary]` |
//! | GET    | `/seasons/{season}/rounds/{round}/sessions/{session}`           | `SessionInfo`    |
//! | GET    | `/seasons/{season}/rounds/{round}/sessions/{session}/laps/{code}/fastest` | `RawTrace` |
//!
//! A 404 maps to [`UpstreamError::NotFound`]; every other failure,
//! including timeouts and undecodable bodies, to
//! [`UpstreamError::Unavailable`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use sculpt_core::artifact::RawTrace;
use sculpt_core::key::SessionKey;
use sculpt_core::session::{EventSummary, SessionInfo};

use crate::gateway::{UpstreamError, UpstreamGateway};

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    /// Client for the provider at `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Unavailable(format!("HTTP client setup failed: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn session_url(&self, key: &SessionKey) -> String {
        format!(
            "{}/seasons/{}/rounds/{}/sessions/{}",
            self.base_url, key.season, key.event_round, key.session
        )
    }

    fn schedule_url(&self, season: i32) -> String {
        format!("{}/seasons/{season}/schedule", self.base_url)
    }

    fn fastest_lap_url(&self, key: &SessionKey, participant: &str) -> String {
        format!("{}/laps/{participant}/fastest", self.session_url(key))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        not_found: impl FnOnce() -> String,
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(format!("GET {url} failed: {e}")))?;

        let response = Self::ensure_success(response, not_found).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Unavailable(format!("Undecodable response from {url}: {e}")))
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
        not_found: impl FnOnce() -> String,
    ) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(not_found()));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(UpstreamError::Unavailable(format!(
                "Provider returned {}: {body}",
                status.as_u16()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl UpstreamGateway for HttpGateway {
    async fn event_schedule(&self, season: i32) -> Result<Vec<EventSummary>, UpstreamError> {
        self.get_json(self.schedule_url(season), || {
            format!("No schedule for season {season}")
        })
        .await
    }

    async fn fetch_session(&self, key: SessionKey) -> Result<SessionInfo, UpstreamError> {
        tracing::debug!(
            season = key.season,
            round = key.event_round,
            session = %key.session,
            "Loading session from provider"
        );
        self.get_json(self.session_url(&key), || {
            format!(
                "Session {} not found for {} round {}",
                key.session, key.season, key.event_round
            )
        })
        .await
    }

    async fn extract_participant_trace(
        &self,
        session: &SessionInfo,
        participant: &str,
    ) -> Result<RawTrace, UpstreamError> {
        let key = SessionKey {
            season: session.season,
            event_round: session.event_round,
            session: session.session,
        };
        self.get_json(self.fastest_lap_url(&key, participant), || {
            format!(
                "Participant {participant} not found in {} {}",
                session.event_name,
                session.session_label()
            )
        })
        .await
    }
}
