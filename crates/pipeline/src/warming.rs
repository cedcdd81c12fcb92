//! Cache warming.
//!
//! A run selects `(round, session, participant)` combinations, drops the
//! ones already cached *before* touching upstream or submitting anything,
//! and feeds the rest through the normal enqueue path with at most
//! `max_concurrent` jobs outstanding. Each submitted key is guarded by a
//! single-flight lease; keys another task is already building are
//! counted as in flight and skipped.
//!
//! Only one run executes at a time. Triggering while a run is active is
//! refused with the active run id.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Datelike;
use sculpt_core::clock::Clock;
use sculpt_core::error::CoreError;
use sculpt_core::key::{normalize_code, ArtifactKey, SessionKey};
use sculpt_core::session::SessionCode;
use sculpt_core::task::TaskState;
use sculpt_core::warming::{
    select_recent_rounds, WarmingReport, WarmingStatus, WarmingStrategy, WarmingTarget,
    DEFAULT_SESSIONS,
};
use sculpt_upstream::{UpstreamError, UpstreamGateway};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::WarmingError;
use crate::service::{new_task_id, SculptureService};

/// Default period of the warming loop.
pub const DEFAULT_WARMING_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default wait per warming job before it is counted as failed.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct WarmingConfig {
    pub interval: Duration,
    pub job_timeout: Duration,
    /// Selection policy; its season is the default for untargeted runs.
    pub strategy: WarmingStrategy,
}

impl WarmingConfig {
    pub fn new(strategy: WarmingStrategy) -> Self {
        Self {
            interval: DEFAULT_WARMING_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            strategy,
        }
    }
}

/// What a run should warm.
#[derive(Debug, Clone, PartialEq)]
pub enum WarmingRequest {
    /// The configured strategy, for `season` or the current season.
    Strategy { season: Option<i32> },
    /// One event.
    Target(WarmingTarget),
}

/// Current and most recent warming runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmingSnapshot {
    pub running: Option<WarmingReport>,
    pub last_report: Option<WarmingReport>,
}

enum Outcome {
    Warmed,
    AlreadyWarm,
    InFlight,
    Failed,
}

/// One `(round, session)` slice of a run.
struct Slice {
    event_round: u32,
    session: SessionCode,
    /// `None` selects every participant of the session.
    participants: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct WarmingScheduler {
    service: SculptureService,
    gateway: Arc<dyn UpstreamGateway>,
    config: WarmingConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<WarmingSnapshot>>,
}

impl WarmingScheduler {
    pub fn new(
        service: SculptureService,
        gateway: Arc<dyn UpstreamGateway>,
        config: WarmingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            gateway,
            config,
            clock,
            state: Arc::new(Mutex::new(WarmingSnapshot::default())),
        }
    }

    pub fn config(&self) -> &WarmingConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, WarmingSnapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> WarmingSnapshot {
        self.state().clone()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run the strategy every `interval` until `cancel` fires. The first
    /// run happens one interval after start.
    pub async fn run(&self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(start, self.config.interval);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Warming scheduler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Warming scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once(WarmingRequest::Strategy { season: None }).await {
                        Ok(report) => tracing::debug!(run_id = %report.run_id, "Scheduled warming finished"),
                        Err(e) => tracing::info!(error = %e, "Scheduled warming skipped"),
                    }
                }
            }
        }
    }

    /// Run to completion and return the report.
    pub async fn run_once(&self, request: WarmingRequest) -> Result<WarmingReport, WarmingError> {
        let (report, plan) = self.begin(request)?;
        Ok(self.execute(report, plan).await)
    }

    /// Start a run in the background and return its id.
    pub fn trigger(&self, request: WarmingRequest) -> Result<String, WarmingError> {
        let (report, plan) = self.begin(request)?;
        let run_id = report.run_id.clone();
        let this = self.clone();
        tokio::spawn(async move {
            this.execute(report, plan).await;
        });
        Ok(run_id)
    }

    // -----------------------------------------------------------------------
    // Run lifecycle
    // -----------------------------------------------------------------------

    fn begin(&self, request: WarmingRequest) -> Result<(WarmingReport, Plan), WarmingError> {
        let plan = self.resolve(request)?;
        let mut state = self.state();
        if let Some(running) = &state.running {
            return Err(WarmingError::AlreadyRunning {
                run_id: running.run_id.clone(),
            });
        }
        let report = WarmingReport::started(new_task_id(), plan.season(), self.clock.now());
        state.running = Some(report.clone());
        Ok((report, plan))
    }

    fn resolve(&self, request: WarmingRequest) -> Result<Plan, CoreError> {
        match request {
            WarmingRequest::Strategy { season } => {
                let season = season.unwrap_or_else(|| self.clock.now().year());
                let strategy = WarmingStrategy {
                    season,
                    ..self.config.strategy.clone()
                }
                .validated()?;
                Ok(Plan::Strategy(strategy))
            }
            WarmingRequest::Target(target) => {
                // Validates season and round.
                SessionKey::new(target.season, target.event_round, SessionCode::R)?;
                let mut sessions = target.sessions;
                if sessions.is_empty() {
                    sessions = DEFAULT_SESSIONS.to_vec();
                }
                sessions.sort();
                sessions.dedup();
                let participants = target
                    .participants
                    .map(|codes| {
                        codes
                            .iter()
                            .map(|c| normalize_code(c))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()?;
                Ok(Plan::Target(WarmingTarget {
                    sessions,
                    participants,
                    ..target
                }))
            }
        }
    }

    async fn execute(&self, mut report: WarmingReport, plan: Plan) -> WarmingReport {
        tracing::info!(run_id = %report.run_id, season = report.season, "Warming run started");

        let status = match self.slices(&plan, &mut report).await {
            Ok(slices) if slices.is_empty() => WarmingStatus::NoEvents,
            Ok(slices) => {
                let keys = self.select(&plan, slices, &mut report).await;
                let max_concurrent = match &plan {
                    Plan::Strategy(strategy) => strategy.max_concurrent,
                    Plan::Target(_) => self.config.strategy.max_concurrent,
                };
                self.warm_all(keys, max_concurrent, &mut report).await;
                WarmingStatus::Completed
            }
            Err(e) => {
                tracing::error!(run_id = %report.run_id, error = %e, "Warming run failed");
                report.error = Some(e.to_string());
                WarmingStatus::Failed
            }
        };
        report.finish(status, self.clock.now());

        tracing::info!(
            run_id = %report.run_id,
            status = ?report.status,
            rounds = report.rounds_processed,
            warmed = report.warmed,
            already_warm = report.already_warm,
            in_flight = report.in_flight,
            not_in_session = report.not_in_session,
            failed = report.failed,
            "Warming run finished",
        );

        let mut state = self.state();
        state.running = None;
        state.last_report = Some(report.clone());
        report
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    async fn slices(
        &self,
        plan: &Plan,
        report: &mut WarmingReport,
    ) -> Result<Vec<Slice>, UpstreamError> {
        match plan {
            Plan::Strategy(strategy) => {
                let schedule = self.gateway.event_schedule(strategy.season).await?;
                let today = self.clock.now().date_naive();
                let rounds = select_recent_rounds(&schedule, today, strategy.recent_rounds);
                report.rounds_processed = rounds.len();

                Ok(rounds
                    .iter()
                    .flat_map(|event| {
                        strategy.sessions.iter().map(|session| Slice {
                            event_round: event.round,
                            session: *session,
                            participants: Some(strategy.participants.clone()),
                        })
                    })
                    .collect())
            }
            Plan::Target(target) => {
                report.rounds_processed = 1;
                Ok(target
                    .sessions
                    .iter()
                    .map(|session| Slice {
                        event_round: target.event_round,
                        session: *session,
                        participants: target.participants.clone(),
                    })
                    .collect())
            }
        }
    }

    /// Keys that still need a job, after cache and session filtering.
    async fn select(
        &self,
        plan: &Plan,
        slices: Vec<Slice>,
        report: &mut WarmingReport,
    ) -> Vec<ArtifactKey> {
        let season = plan.season();
        let mut selected = Vec::new();

        for slice in slices {
            let key = SessionKey {
                season,
                event_round: slice.event_round,
                session: slice.session,
            };

            // Named participants are checked against the cache before the
            // session is loaded, so a fully warm slice costs no upstream call.
            let mut session_info = None;
            let candidates = match slice.participants {
                Some(codes) => codes,
                None => match self.gateway.fetch_session(key).await {
                    Ok(info) => {
                        let codes = info.participants.clone();
                        session_info = Some(info);
                        codes
                    }
                    Err(e) => {
                        tracing::warn!(season, round = key.event_round, session = %key.session, error = %e, "Skipping session");
                        report.failed += 1;
                        continue;
                    }
                },
            };

            let mut cold = Vec::new();
            for code in candidates {
                let Ok(artifact_key) =
                    ArtifactKey::single(season, slice.event_round, slice.session, &code)
                else {
                    report.failed += 1;
                    continue;
                };
                if self.is_warm(&artifact_key).await {
                    report.already_warm += 1;
                } else {
                    cold.push(artifact_key);
                }
            }
            if cold.is_empty() {
                continue;
            }

            let info = match session_info {
                Some(info) => info,
                None => match self.gateway.fetch_session(key).await {
                    Ok(info) => info,
                    Err(UpstreamError::NotFound(reason)) => {
                        tracing::debug!(season, round = key.event_round, session = %key.session, %reason, "Session does not exist");
                        report.not_in_session += cold.len();
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(season, round = key.event_round, session = %key.session, error = %e, "Skipping session");
                        report.failed += cold.len();
                        continue;
                    }
                },
            };

            for artifact_key in cold {
                if info.has_participant(&artifact_key.participants()[0]) {
                    selected.push(artifact_key);
                } else {
                    report.not_in_session += 1;
                }
            }
        }
        selected
    }

    async fn is_warm(&self, key: &ArtifactKey) -> bool {
        match self.service.cache().contains_artifact(key).await {
            Ok(warm) => warm,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cache check failed, treating as cold");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    async fn warm_all(&self, keys: Vec<ArtifactKey>, max_concurrent: usize, report: &mut WarmingReport) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut jobs = JoinSet::new();

        for key in keys {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let this = self.clone();
            jobs.spawn(async move {
                let _permit = permit;
                this.warm_one(key).await
            });
        }

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(Outcome::Warmed) => report.warmed += 1,
                Ok(Outcome::AlreadyWarm) => report.already_warm += 1,
                Ok(Outcome::InFlight) => report.in_flight += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Warming job panicked");
                    report.failed += 1;
                }
            }
        }
    }

    async fn warm_one(&self, key: ArtifactKey) -> Outcome {
        if self.is_warm(&key).await {
            return Outcome::AlreadyWarm;
        }

        let task_id = new_task_id();
        let fingerprint = self.service.cache().fingerprint(&key);
        let lease = match self.service.leases().try_acquire(&fingerprint, &task_id) {
            Ok(lease) => lease,
            Err(running) => {
                tracing::debug!(%fingerprint, task_id = %running, "Already in flight");
                return Outcome::InFlight;
            }
        };

        let enqueued = match self.service.enqueue(task_id, key, Some(lease)).await {
            Ok(enqueued) => enqueued,
            Err(e) => {
                tracing::error!(%fingerprint, error = %e, "Failed to enqueue warming job");
                return Outcome::Failed;
            }
        };

        match tokio::time::timeout(self.config.job_timeout, enqueued.handle).await {
            Ok(Ok(record)) if record.state == TaskState::Success => Outcome::Warmed,
            Ok(Ok(record)) => {
                tracing::warn!(
                    task_id = %record.task_id,
                    %fingerprint,
                    error = record.error.as_deref().unwrap_or_default(),
                    "Warming job did not succeed",
                );
                Outcome::Failed
            }
            Ok(Err(e)) => {
                tracing::error!(task_id = %enqueued.task_id, error = %e, "Warming job panicked");
                Outcome::Failed
            }
            Err(_) => {
                tracing::warn!(
                    task_id = %enqueued.task_id,
                    %fingerprint,
                    timeout_secs = self.config.job_timeout.as_secs(),
                    "Warming job still running after timeout",
                );
                Outcome::Failed
            }
        }
    }
}

/// A resolved, validated request.
enum Plan {
    Strategy(WarmingStrategy),
    Target(WarmingTarget),
}

impl Plan {
    fn season(&self) -> i32 {
        match self {
            Plan::Strategy(strategy) => strategy.season,
            Plan::Target(target) => target.season,
        }
    }
}
