//! Cache warming selection policy.
//!
//! Which rounds, sessions, and participants get warmed is configuration;
//! this module only holds the policy shape and the pure selection step
//! over a season schedule.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::key::normalize_code;
use crate::session::{EventSummary, SessionCode};
use crate::types::Timestamp;

/// Participants that account for most requests.
pub const POPULAR_PARTICIPANTS: [&str; 15] = [
    "VER", "PER", "HAM", "RUS", "LEC", "SAI", "NOR", "PIA", "ALO", "STR", "GAS", "OCO", "ALB",
    "SAR", "TSU",
];

/// Practice sessions are skipped by default.
pub const DEFAULT_SESSIONS: [SessionCode; 2] = [SessionCode::Q, SessionCode::R];

pub const DEFAULT_RECENT_ROUNDS: usize = 3;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// What a warming run selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmingStrategy {
    pub season: i32,
    /// Latest N completed rounds.
    pub recent_rounds: usize,
    pub sessions: Vec<SessionCode>,
    pub participants: Vec<String>,
    /// Ceiling on concurrently running warming jobs.
    pub max_concurrent: usize,
}

impl WarmingStrategy {
    /// Default policy for `season`.
    pub fn for_season(season: i32) -> Self {
        Self {
            season,
            recent_rounds: DEFAULT_RECENT_ROUNDS,
            sessions: DEFAULT_SESSIONS.to_vec(),
            participants: POPULAR_PARTICIPANTS.iter().map(|c| c.to_string()).collect(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Normalize participant codes and reject empty selections.
    pub fn validated(mut self) -> Result<Self, CoreError> {
        if self.recent_rounds == 0 {
            return Err(CoreError::Validation(
                "Warming needs at least one round".to_string(),
            ));
        }
        if self.sessions.is_empty() {
            return Err(CoreError::Validation(
                "Warming needs at least one session".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(CoreError::Validation(
                "Warming concurrency must be at least 1".to_string(),
            ));
        }
        self.participants = self
            .participants
            .iter()
            .map(|c| normalize_code(c))
            .collect::<Result<Vec<_>, _>>()?;
        self.participants.sort();
        self.participants.dedup();
        self.sessions.sort();
        self.sessions.dedup();
        Ok(self)
    }
}

/// Events dated before `today`, latest `count` rounds first.
pub fn select_recent_rounds(
    schedule: &[EventSummary],
    today: NaiveDate,
    count: usize,
) -> Vec<EventSummary> {
    let mut completed: Vec<EventSummary> = schedule
        .iter()
        .filter(|event| event.date < today)
        .cloned()
        .collect();
    completed.sort_by(|a, b| b.round.cmp(&a.round));
    completed.truncate(count);
    completed
}

/// A single event to warm on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmingTarget {
    pub season: i32,
    pub event_round: u32,
    pub sessions: Vec<SessionCode>,
    /// `None` warms every participant of the session.
    pub participants: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmingStatus {
    Running,
    Completed,
    NoEvents,
    Failed,
}

/// Outcome counters of one warming run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmingReport {
    pub run_id: String,
    pub status: WarmingStatus,
    pub season: i32,
    pub rounds_processed: usize,
    /// Jobs that ran and produced an artifact.
    pub warmed: usize,
    /// Entries already cached; no job submitted.
    pub already_warm: usize,
    /// Entries another job was already building.
    pub in_flight: usize,
    /// Selected participants absent from the session.
    pub not_in_session: usize,
    pub failed: usize,
    pub error: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl WarmingReport {
    pub fn started(run_id: impl Into<String>, season: i32, now: Timestamp) -> Self {
        Self {
            run_id: run_id.into(),
            status: WarmingStatus::Running,
            season,
            rounds_processed: 0,
            warmed: 0,
            already_warm: 0,
            in_flight: 0,
            not_in_session: 0,
            failed: 0,
            error: None,
            started_at: now,
            finished_at: None,
        }
    }

    pub fn finish(&mut self, status: WarmingStatus, now: Timestamp) {
        self.status = status;
        self.finished_at = Some(now);
    }
}
