use async_trait::async_trait;
use sculpt_core::artifact::RawTrace;
use sculpt_core::key::SessionKey;
use sculpt_core::session::{EventSummary, SessionInfo};

/// Errors from the telemetry provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Network failure, timeout, or provider-side error. Retryable.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The event, session, or participant does not exist.
    #[error("{0}")]
    NotFound(String),
}

/// Read-only view of the telemetry provider.
///
/// Loading a session is the expensive step; callers load once and pass
/// the returned [`SessionInfo`] to every participant extraction.
#[async_trait]
pub trait UpstreamGateway: Send + Sync {
    /// The season's events in round order.
    async fn event_schedule(&self, season: i32) -> Result<Vec<EventSummary>, UpstreamError>;

    async fn fetch_session(&self, key: SessionKey) -> Result<SessionInfo, UpstreamError>;

    /// The participant's representative (fastest) lap in `session`.
    async fn extract_participant_trace(
        &self,
        session: &SessionInfo,
        participant: &str,
    ) -> Result<RawTrace, UpstreamError>;
}
