//! Three-stage sculpture pipeline.
//!
//! | Stage                  | Checkpoints            |
//! |------------------------|------------------------|
//! | `loading_session`      | 5 init, 10 fetch, 35 loaded |
//! | `extracting_telemetry` | 40 lookup, 65 extracted |
//! | `processing_sculpture` | 70 derive, 95 finalized |
//! | final write            | 100 SUCCESS             |
//!
//! Compare jobs load the session once, extract every trace in stage two
//! and derive every artifact in stage three, spreading their per
//! participant updates between the stage checkpoints.
//!
//! Artifacts carry the requested participant code, whatever spelling
//! the provider echoes back.
//!
//! A failed or cancelled job never writes to the result cache. A cache
//! write failure after a successful derivation is logged and the job
//! still succeeds.

use std::future::Future;
use std::sync::Arc;

use sculpt_core::artifact::{self, Artifact, ArtifactError, RawTrace};
use sculpt_core::clock::Clock;
use sculpt_core::key::ArtifactKey;
use sculpt_core::session::SessionInfo;
use sculpt_core::task::{
    Checkpoint, ComparisonResult, ProgressMetadata, Stage, TaskRecord, TaskResult, TaskUpdate,
};
use sculpt_core::types::TaskId;
use sculpt_events::ProgressBroadcaster;
use sculpt_store::{ResultCache, TaskStore};
use sculpt_upstream::{UpstreamError, UpstreamGateway};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::reporter::TaskReporter;

/// One unit of work for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub task_id: TaskId,
    pub key: ArtifactKey,
}

pub struct TaskExecutor {
    gateway: Arc<dyn UpstreamGateway>,
    cache: ResultCache,
    store: TaskStore,
    broadcaster: ProgressBroadcaster,
    clock: Arc<dyn Clock>,
}

impl TaskExecutor {
    pub fn new(
        gateway: Arc<dyn UpstreamGateway>,
        cache: ResultCache,
        store: TaskStore,
        broadcaster: ProgressBroadcaster,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            cache,
            store,
            broadcaster,
            clock,
        }
    }

    fn reporter(&self, record: TaskRecord) -> TaskReporter {
        TaskReporter::new(
            record,
            self.store.clone(),
            self.broadcaster.clone(),
            self.clock.clone(),
        )
    }

    /// Run `job` to a terminal state and return the final record.
    pub async fn run(&self, job: Job, record: TaskRecord, cancel: CancellationToken) -> TaskRecord {
        let fingerprint = self.cache.fingerprint(&job.key);
        tracing::info!(task_id = %job.task_id, %fingerprint, "Job started");

        let mut reporter = self.reporter(record);
        let outcome = if job.key.is_comparison() {
            self.run_comparison(&job.key, &mut reporter, &cancel).await
        } else {
            self.run_single(&job.key, &mut reporter, &cancel).await
        };

        let terminal = match outcome {
            Ok((result, message)) => {
                tracing::info!(task_id = %job.task_id, %fingerprint, "Job succeeded");
                TaskUpdate::success(result, message)
            }
            Err(JobError::Cancelled) => {
                tracing::info!(task_id = %job.task_id, %fingerprint, "Job cancelled");
                TaskUpdate::cancelled("Cancelled by request")
            }
            Err(e) => {
                tracing::warn!(task_id = %job.task_id, %fingerprint, error = %e, "Job failed");
                TaskUpdate::failure(e.to_string())
            }
        };

        if let Err(e) = reporter.emit(terminal).await {
            tracing::error!(task_id = %job.task_id, error = %e, "Failed to record terminal state");
        }
        reporter.into_record()
    }

    /// Close a job that was cancelled before it started.
    pub async fn abandon(&self, record: TaskRecord, reason: &str) -> TaskRecord {
        let mut reporter = self.reporter(record);
        if let Err(e) = reporter.emit(TaskUpdate::cancelled(reason)).await {
            tracing::error!(task_id = %reporter.task_id(), error = %e, "Failed to record cancellation");
        }
        reporter.into_record()
    }

    // -----------------------------------------------------------------------
    // Stage 1 (shared)
    // -----------------------------------------------------------------------

    async fn load_session(
        &self,
        key: &ArtifactKey,
        reporter: &mut TaskReporter,
        cancel: &CancellationToken,
    ) -> Result<(SessionInfo, ProgressMetadata), JobError> {
        let session_name = key.session().display_name();
        let mut meta = ProgressMetadata::new(key.season(), key.event_round(), key.session());

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::Init,
                format!(
                    "Initializing {session_name} session for Round {}...",
                    key.event_round()
                ),
            )
            .with_metadata(meta.clone()),
        )
        .await?;

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::FetchStarted,
                format!("Downloading {session_name} session data..."),
            )
            .with_metadata(meta.clone()),
        )
        .await?;

        let session = guarded(cancel, self.gateway.fetch_session(key.session_key())).await?;
        meta = meta.with_session(&session);
        tracing::debug!(
            task_id = %reporter.task_id(),
            season = key.season(),
            round = key.event_round(),
            session = %key.session(),
            participants = session.participants.len(),
            "Session loaded",
        );

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::SessionLoaded,
                format!("Session loaded: {} - {session_name}", session.event_name),
            )
            .with_metadata(meta.clone()),
        )
        .await?;

        Ok((session, meta))
    }

    // -----------------------------------------------------------------------
    // Single participant
    // -----------------------------------------------------------------------

    async fn run_single(
        &self,
        key: &ArtifactKey,
        reporter: &mut TaskReporter,
        cancel: &CancellationToken,
    ) -> Result<(TaskResult, String), JobError> {
        let code = key.participants()[0].as_str();
        let (session, meta) = self.load_session(key, reporter, cancel).await?;
        let meta = meta.with_participant(code);

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::LookupStarted,
                format!("Finding {code} in {}...", session.event_name),
            )
            .with_metadata(meta.clone()),
        )
        .await?;

        let mut trace = guarded(
            cancel,
            self.gateway.extract_participant_trace(&session, code),
        )
        .await?;
        trace.participant = code.to_string();
        let meta = meta.with_data_points(trace.samples.len());

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::TraceExtracted,
                format!(
                    "Telemetry extracted: {} data points from {code}",
                    trace.samples.len()
                ),
            )
            .with_metadata(meta.clone()),
        )
        .await?;

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::DerivationStarted,
                format!("Calculating G-forces for {code}..."),
            )
            .with_metadata(meta.clone()),
        )
        .await?;

        let artifact = artifact::build(&trace)?;

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::ArtifactFinalized,
                format!("Finalizing sculpture for {code}..."),
            )
            .with_metadata(meta),
        )
        .await?;

        let result = TaskResult::Single(artifact);
        ensure_live(cancel)?;
        self.write_cache(key, &result, reporter.task_id()).await;

        Ok((result, format!("Sculpture ready for {code}")))
    }

    // -----------------------------------------------------------------------
    // Comparison
    // -----------------------------------------------------------------------

    async fn run_comparison(
        &self,
        key: &ArtifactKey,
        reporter: &mut TaskReporter,
        cancel: &CancellationToken,
    ) -> Result<(TaskResult, String), JobError> {
        let codes = key.participants();
        let total = codes.len();
        let (session, meta) = self.load_session(key, reporter, cancel).await?;

        // Stage 2: one lookup per participant, spread over 40..65.
        let mut traces: Vec<RawTrace> = Vec::with_capacity(total);
        let mut missing: Vec<String> = Vec::new();
        for (index, code) in codes.iter().enumerate() {
            step(
                reporter,
                cancel,
                TaskUpdate::progress(
                    Stage::ExtractingTelemetry,
                    spread(Checkpoint::LookupStarted, Checkpoint::TraceExtracted, index, total),
                    format!(
                        "Finding {code} in {}... ({}/{total})",
                        session.event_name,
                        index + 1
                    ),
                )
                .with_metadata(meta.clone().with_participant(code).with_position(index, total)),
            )
            .await?;

            match guarded(cancel, self.gateway.extract_participant_trace(&session, code)).await {
                Ok(mut trace) => {
                    trace.participant = code.clone();
                    traces.push(trace);
                }
                Err(JobError::Upstream(e @ UpstreamError::NotFound(_))) => {
                    tracing::warn!(task_id = %reporter.task_id(), participant = %code, error = %e, "Skipping participant");
                    missing.push(code.clone());
                }
                Err(e) => return Err(e),
            }
        }

        let data_points: usize = traces.iter().map(|t| t.samples.len()).sum();
        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::TraceExtracted,
                format!(
                    "Telemetry extracted for {}/{total} participants",
                    traces.len()
                ),
            )
            .with_metadata(meta.clone().with_data_points(data_points)),
        )
        .await?;

        // Stage 3: one derivation per trace, spread over 70..95.
        let mut sculptures: Vec<Artifact> = Vec::with_capacity(traces.len());
        let built = traces.len();
        for (index, trace) in traces.iter().enumerate() {
            let code = trace.participant.as_str();
            step(
                reporter,
                cancel,
                TaskUpdate::progress(
                    Stage::ProcessingSculpture,
                    spread(Checkpoint::DerivationStarted, Checkpoint::ArtifactFinalized, index, built),
                    format!("Calculating G-forces for {code}... ({}/{built})", index + 1),
                )
                .with_metadata(meta.clone().with_participant(code).with_position(index, built)),
            )
            .await?;

            match artifact::build(trace) {
                Ok(artifact) => sculptures.push(artifact),
                Err(ArtifactError::Malformed(reason)) => {
                    tracing::warn!(task_id = %reporter.task_id(), participant = %code, %reason, "Skipping malformed trace");
                    missing.push(code.to_string());
                }
            }
        }

        if sculptures.is_empty() {
            return Err(JobError::NothingGenerated(codes.join(", ")));
        }

        step(
            reporter,
            cancel,
            TaskUpdate::checkpoint(
                Checkpoint::ArtifactFinalized,
                format!("Finalizing {} sculptures...", sculptures.len()),
            )
            .with_metadata(meta),
        )
        .await?;

        ensure_live(cancel)?;
        let singles = key.single_keys();
        for artifact in &sculptures {
            let single = singles
                .iter()
                .find(|k| k.participants()[0] == artifact.participant);
            if let Some(single) = single {
                self.write_cache(single, &TaskResult::Single(artifact.clone()), reporter.task_id())
                    .await;
            }
        }

        missing.sort();
        let generated = sculptures.len();
        let result = TaskResult::Comparison(ComparisonResult {
            sculptures,
            total_requested: total,
            total_generated: generated,
            missing,
        });
        self.write_cache(key, &result, reporter.task_id()).await;

        Ok((
            result,
            format!("Comparison ready: {generated}/{total} sculptures generated"),
        ))
    }

    async fn write_cache(&self, key: &ArtifactKey, result: &TaskResult, task_id: &str) {
        let fingerprint = self.cache.fingerprint(key);
        match self.cache.put_artifact(key, result).await {
            Ok(()) => tracing::info!(task_id, %fingerprint, "Cached sculpture"),
            Err(e) => {
                tracing::error!(task_id, %fingerprint, error = %e, "Failed to cache sculpture")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_live(cancel: &CancellationToken) -> Result<(), JobError> {
    if cancel.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    Ok(())
}

/// Cancellation check, then one progress emission.
async fn step(
    reporter: &mut TaskReporter,
    cancel: &CancellationToken,
    update: TaskUpdate,
) -> Result<(), JobError> {
    ensure_live(cancel)?;
    reporter.emit(update).await?;
    Ok(())
}

/// Await an upstream call unless the job is cancelled first.
async fn guarded<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, UpstreamError>>,
) -> Result<T, JobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobError::Cancelled),
        result = call => Ok(result?),
    }
}

/// Percentage for item `index` of `total`, evenly spaced in `[from, to)`.
fn spread(from: Checkpoint, to: Checkpoint, index: usize, total: usize) -> u8 {
    let (from, to) = (from.percent() as usize, to.percent() as usize);
    (from + (to - from) * index / total.max(1)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_stays_inside_the_stage() {
        let points: Vec<u8> = (0..5)
            .map(|i| spread(Checkpoint::LookupStarted, Checkpoint::TraceExtracted, i, 5))
            .collect();
        assert_eq!(points, vec![40, 45, 50, 55, 60]);
        assert_eq!(
            spread(Checkpoint::DerivationStarted, Checkpoint::ArtifactFinalized, 0, 1),
            70
        );
    }
}
