//! Task records and the generation state machine.
//!
//! ```text
//! PENDING -> PROGRESS(loading_session) -> PROGRESS(extracting_telemetry)
//!         -> PROGRESS(processing_sculpture) -> SUCCESS
//! any non-terminal state -> FAILURE | CANCELLED
//! ```
//!
//! [`TaskRecord::apply`] is the single place the invariants are enforced:
//! terminal records never change, stages never regress, and progress never
//! decreases.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::CoreError;
use crate::session::{SessionCode, SessionInfo};
use crate::types::{TaskId, Timestamp};

/// Version of the [`ProgressMetadata`] shape carried in records.
pub const METADATA_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// States, stages, checkpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Progress,
    Success,
    Failure,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Cancelled
        )
    }
}

/// Generation stages in their fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadingSession,
    ExtractingTelemetry,
    ProcessingSculpture,
}

/// Fixed progress checkpoints emitted by every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Checkpoint {
    Init,
    FetchStarted,
    SessionLoaded,
    LookupStarted,
    TraceExtracted,
    DerivationStarted,
    ArtifactFinalized,
    Complete,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 8] = [
        Checkpoint::Init,
        Checkpoint::FetchStarted,
        Checkpoint::SessionLoaded,
        Checkpoint::LookupStarted,
        Checkpoint::TraceExtracted,
        Checkpoint::DerivationStarted,
        Checkpoint::ArtifactFinalized,
        Checkpoint::Complete,
    ];

    pub fn percent(self) -> u8 {
        match self {
            Checkpoint::Init => 5,
            Checkpoint::FetchStarted => 10,
            Checkpoint::SessionLoaded => 35,
            Checkpoint::LookupStarted => 40,
            Checkpoint::TraceExtracted => 65,
            Checkpoint::DerivationStarted => 70,
            Checkpoint::ArtifactFinalized => 95,
            Checkpoint::Complete => 100,
        }
    }

    pub fn stage(self) -> Stage {
        match self {
            Checkpoint::Init | Checkpoint::FetchStarted | Checkpoint::SessionLoaded => {
                Stage::LoadingSession
            }
            Checkpoint::LookupStarted | Checkpoint::TraceExtracted => Stage::ExtractingTelemetry,
            Checkpoint::DerivationStarted
            | Checkpoint::ArtifactFinalized
            | Checkpoint::Complete => Stage::ProcessingSculpture,
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata and results
// ---------------------------------------------------------------------------

/// Structured context attached to progress updates.
///
/// Session fields are filled once the session is loaded; participant
/// fields only while a participant is being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMetadata {
    pub version: u16,
    pub season: i32,
    pub event_round: u32,
    pub session: SessionCode,
    pub session_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_points: Option<usize>,
}

impl ProgressMetadata {
    pub fn new(season: i32, event_round: u32, session: SessionCode) -> Self {
        Self {
            version: METADATA_VERSION,
            season,
            event_round,
            session,
            session_name: session.display_name().to_string(),
            event_name: None,
            session_date: None,
            participant: None,
            participant_index: None,
            participant_total: None,
            data_points: None,
        }
    }

    pub fn with_session(mut self, info: &SessionInfo) -> Self {
        self.event_name = Some(info.event_name.clone());
        self.session_date = info.session_date;
        self
    }

    pub fn with_participant(mut self, code: &str) -> Self {
        self.participant = Some(code.to_string());
        self
    }

    pub fn with_position(mut self, index: usize, total: usize) -> Self {
        self.participant_index = Some(index as u32 + 1);
        self.participant_total = Some(total as u32);
        self
    }

    pub fn with_data_points(mut self, count: usize) -> Self {
        self.data_points = Some(count);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Single,
    Comparison,
}

/// Payload of a successful compare job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub sculptures: Vec<Artifact>,
    pub total_requested: usize,
    pub total_generated: usize,
    /// Participants with no usable trace in the session.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResult {
    Single(Artifact),
    Comparison(ComparisonResult),
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    pub stage: Option<Stage>,
    pub progress: u8,
    pub message: String,
    pub metadata: Option<ProgressMetadata>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TaskRecord {
    /// A freshly enqueued task.
    pub fn pending(task_id: impl Into<TaskId>, kind: TaskKind, now: Timestamp) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            state: TaskState::Pending,
            stage: None,
            progress: 0,
            message: "Queued".to_string(),
            metadata: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether `self` is a later state of the task than `previous`.
    ///
    /// Records only move forward, so a copy that is identical, behind in
    /// progress or time, or follows a terminal record is stale.
    pub fn supersedes(&self, previous: &TaskRecord) -> bool {
        !previous.is_terminal()
            && self != previous
            && self.progress >= previous.progress
            && self.updated_at >= previous.updated_at
    }

    /// Merge `update` into this record.
    ///
    /// Rejects with [`CoreError::Conflict`] when the record is terminal or
    /// the update would move the stage or progress backwards.
    pub fn apply(&mut self, update: TaskUpdate, now: Timestamp) -> Result<(), CoreError> {
        if self.state.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Task {} is already in terminal state {:?}",
                self.task_id, self.state
            )));
        }
        if update.state == Some(TaskState::Pending) && self.state != TaskState::Pending {
            return Err(CoreError::Conflict(format!(
                "Task {} cannot return to PENDING",
                self.task_id
            )));
        }
        if let (Some(next), Some(current)) = (update.stage, self.stage) {
            if next < current {
                return Err(CoreError::Conflict(format!(
                    "Task {} cannot move from stage {current:?} back to {next:?}",
                    self.task_id
                )));
            }
        }
        if let Some(progress) = update.progress {
            if progress > 100 {
                return Err(CoreError::Validation(format!(
                    "Progress must be 0-100, got {progress}"
                )));
            }
            if progress < self.progress {
                return Err(CoreError::Conflict(format!(
                    "Task {} progress cannot decrease from {} to {progress}",
                    self.task_id, self.progress
                )));
            }
        }

        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(stage) = update.stage {
            self.stage = Some(stage);
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if update.metadata.is_some() {
            self.metadata = update.metadata;
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        self.updated_at = now;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TaskUpdate
// ---------------------------------------------------------------------------

/// Partial state merged into a [`TaskRecord`]. `None` fields are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub state: Option<TaskState>,
    pub stage: Option<Stage>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub metadata: Option<ProgressMetadata>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
}

impl TaskUpdate {
    /// A PROGRESS update at one of the fixed checkpoints.
    pub fn checkpoint(checkpoint: Checkpoint, message: impl Into<String>) -> Self {
        Self::progress(checkpoint.stage(), checkpoint.percent(), message)
    }

    /// A PROGRESS update at an arbitrary percentage inside `stage`.
    pub fn progress(stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            state: Some(TaskState::Progress),
            stage: Some(stage),
            progress: Some(percent),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn success(result: TaskResult, message: impl Into<String>) -> Self {
        Self {
            state: Some(TaskState::Success),
            progress: Some(Checkpoint::Complete.percent()),
            message: Some(message.into()),
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            state: Some(TaskState::Failure),
            message: Some(error.clone()),
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            state: Some(TaskState::Cancelled),
            message: Some(reason.clone()),
            error: Some(reason),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: ProgressMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
