//! Scripted in-memory [`UpstreamGateway`].
//!
//! Serves a fixed schedule, fixed sessions, and synthetic or scripted
//! traces. Failures and latency can be injected, and every call is
//! counted, so tests can assert how often upstream was actually hit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sculpt_core::artifact::{LapSummary, RawTrace, TraceSample};
use sculpt_core::key::SessionKey;
use sculpt_core::session::{EventSummary, SessionCode, SessionInfo};

use crate::gateway::{UpstreamError, UpstreamGateway};

/// Default length of a synthetic lap.
pub const DEFAULT_TRACE_POINTS: usize = 50;

/// The 2024 grid.
pub const GRID_2024: [&str; 20] = [
    "VER", "PER", "HAM", "RUS", "LEC", "SAI", "NOR", "PIA", "ALO", "STR", "GAS", "OCO", "ALB",
    "SAR", "TSU", "RIC", "BOT", "ZHO", "HUL", "MAG",
];

const SEASON_2024_EVENTS: [(u32, &str, u32, u32); 5] = [
    (1, "Bahrain Grand Prix", 3, 2),
    (2, "Saudi Arabian Grand Prix", 3, 9),
    (3, "Australian Grand Prix", 3, 24),
    (4, "Japanese Grand Prix", 4, 7),
    (5, "Chinese Grand Prix", 4, 21),
];

#[derive(Default)]
struct Faults {
    unavailable: bool,
    sessions: HashMap<SessionKey, UpstreamError>,
    participants: HashMap<String, UpstreamError>,
}

#[derive(Default)]
struct Counters {
    schedule: AtomicUsize,
    session: AtomicUsize,
    trace: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct StaticGateway {
    schedules: HashMap<i32, Vec<EventSummary>>,
    sessions: HashMap<SessionKey, SessionInfo>,
    traces: HashMap<(SessionKey, String), RawTrace>,
    trace_points: Option<usize>,
    latency: Duration,
    faults: Mutex<Faults>,
    counters: Counters,
}

impl StaticGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Five 2024 events, each with FP1, Q, and R sessions for the full grid.
    pub fn season_2024() -> Self {
        let mut gateway = Self::new();
        for (round, name, month, day) in SEASON_2024_EVENTS {
            let Some(date) = NaiveDate::from_ymd_opt(2024, month, day) else {
                continue;
            };
            gateway = gateway.with_event(
                2024,
                EventSummary {
                    round,
                    name: name.to_string(),
                    date,
                },
            );
            for session in [SessionCode::FP1, SessionCode::Q, SessionCode::R] {
                gateway = gateway.with_session(SessionInfo {
                    season: 2024,
                    event_round: round,
                    session,
                    event_name: name.to_string(),
                    session_date: Some(date),
                    participants: GRID_2024.iter().map(|c| c.to_string()).collect(),
                });
            }
        }
        gateway
    }

    // -----------------------------------------------------------------------
    // Builder
    // -----------------------------------------------------------------------

    pub fn with_event(mut self, season: i32, event: EventSummary) -> Self {
        let events = self.schedules.entry(season).or_default();
        events.retain(|e| e.round != event.round);
        events.push(event);
        events.sort_by_key(|e| e.round);
        self
    }

    pub fn with_session(mut self, info: SessionInfo) -> Self {
        let key = SessionKey {
            season: info.season,
            event_round: info.event_round,
            session: info.session,
        };
        self.sessions.insert(key, info);
        self
    }

    /// Serve `trace` for `participant` instead of a synthetic lap. The
    /// trace's own participant field is returned as is.
    pub fn with_trace(mut self, key: SessionKey, participant: &str, trace: RawTrace) -> Self {
        self.traces
            .insert((key, participant.to_ascii_uppercase()), trace);
        self
    }

    pub fn with_trace_points(mut self, points: usize) -> Self {
        self.trace_points = Some(points);
        self
    }

    /// Delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call fail with [`UpstreamError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults().unavailable = unavailable;
    }

    pub fn fail_session(&self, key: SessionKey, error: UpstreamError) {
        self.faults().sessions.insert(key, error);
    }

    pub fn fail_participant(&self, participant: &str, error: UpstreamError) {
        self.faults()
            .participants
            .insert(participant.to_ascii_uppercase(), error);
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    pub fn schedule_calls(&self) -> usize {
        self.counters.schedule.load(Ordering::SeqCst)
    }

    pub fn session_calls(&self) -> usize {
        self.counters.session.load(Ordering::SeqCst)
    }

    pub fn trace_calls(&self) -> usize {
        self.counters.trace.load(Ordering::SeqCst)
    }

    /// Total calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.schedule_calls() + self.session_calls() + self.trace_calls()
    }

    /// Highest number of calls observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn check_available(&self) -> Result<(), UpstreamError> {
        if self.faults().unavailable {
            return Err(UpstreamError::Unavailable(
                "Telemetry provider is not responding".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UpstreamGateway for StaticGateway {
    async fn event_schedule(&self, season: i32) -> Result<Vec<EventSummary>, UpstreamError> {
        self.counters.schedule.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        self.simulate_latency().await;
        self.check_available()?;

        Ok(self.schedules.get(&season).cloned().unwrap_or_default())
    }

    async fn fetch_session(&self, key: SessionKey) -> Result<SessionInfo, UpstreamError> {
        self.counters.session.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        self.simulate_latency().await;
        self.check_available()?;

        let fault = self.faults().sessions.get(&key).cloned();
        if let Some(error) = fault {
            return Err(error);
        }
        self.sessions.get(&key).cloned().ok_or_else(|| {
            UpstreamError::NotFound(format!(
                "Session {} not found for {} round {}",
                key.session, key.season, key.event_round
            ))
        })
    }

    async fn extract_participant_trace(
        &self,
        session: &SessionInfo,
        participant: &str,
    ) -> Result<RawTrace, UpstreamError> {
        self.counters.trace.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        self.simulate_latency().await;
        self.check_available()?;

        let code = participant.to_ascii_uppercase();
        let fault = self.faults().participants.get(&code).cloned();
        if let Some(error) = fault {
            return Err(error);
        }

        let key = SessionKey {
            season: session.season,
            event_round: session.event_round,
            session: session.session,
        };
        if let Some(trace) = self.traces.get(&(key, code.clone())) {
            return Ok(trace.clone());
        }
        if !session.has_participant(&code) {
            return Err(UpstreamError::NotFound(format!(
                "Participant {code} not found in {} {}",
                session.event_name,
                session.session_label()
            )));
        }
        Ok(synthetic_trace(
            &code,
            self.trace_points.unwrap_or(DEFAULT_TRACE_POINTS),
        ))
    }
}

/// A deterministic lap around an oval whose size depends on `participant`.
pub fn synthetic_trace(participant: &str, points: usize) -> RawTrace {
    let seed: u32 = participant.bytes().map(u32::from).sum();
    let radius = 400.0 + f64::from(seed % 50);
    let step = std::f64::consts::TAU / points.max(1) as f64;

    let samples = (0..points)
        .map(|i| {
            let theta = i as f64 * step;
            TraceSample {
                time_s: i as f64 * 0.5,
                x: radius * 1.6 * theta.cos(),
                y: radius * theta.sin(),
                speed_kmh: 220.0 + 60.0 * (2.0 * theta).cos(),
            }
        })
        .collect();

    RawTrace {
        participant: participant.to_string(),
        lap: LapSummary {
            lap_number: Some(1 + seed % 20),
            lap_time_s: Some(points as f64 * 0.5),
            full_name: None,
            team: None,
        },
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn season_fixture_serves_grid_participants() {
        let gateway = StaticGateway::season_2024();
        let session = gateway
            .fetch_session(SessionKey::new(2024, 1, SessionCode::Q).unwrap())
            .await
            .unwrap();

        let trace = gateway
            .extract_participant_trace(&session, "ver")
            .await
            .unwrap();

        assert_eq!(session.event_name, "Bahrain Grand Prix");
        assert_eq!(trace.participant, "VER");
        assert_eq!(trace.samples.len(), DEFAULT_TRACE_POINTS);
        assert_eq!(gateway.session_calls(), 1);
        assert_eq!(gateway.trace_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_participant_is_not_found() {
        let gateway = StaticGateway::season_2024();
        let session = gateway
            .fetch_session(SessionKey::new(2024, 1, SessionCode::Q).unwrap())
            .await
            .unwrap();

        assert_matches!(
            gateway.extract_participant_trace(&session, "ZZZ").await,
            Err(UpstreamError::NotFound(msg)) if msg.contains("ZZZ")
        );
    }

    #[tokio::test]
    async fn injected_outage_applies_to_every_call() {
        let gateway = StaticGateway::season_2024();
        gateway.set_unavailable(true);
        assert_matches!(
            gateway.event_schedule(2024).await,
            Err(UpstreamError::Unavailable(_))
        );
        gateway.set_unavailable(false);
        assert_eq!(gateway.event_schedule(2024).await.unwrap().len(), 5);
    }

    #[test]
    fn synthetic_traces_are_deterministic() {
        assert_eq!(synthetic_trace("HAM", 30), synthetic_trace("HAM", 30));
        assert_ne!(synthetic_trace("HAM", 30), synthetic_trace("LEC", 30));
    }
}
