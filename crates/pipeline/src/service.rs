//! Cache-first job submission and task access.
//!
//! Submitting checks the result cache first and returns the cached
//! payload on a hit. On a miss a PENDING record is created and the job is
//! spawned; it waits for a worker slot (bounded by
//! [`PipelineConfig::max_concurrent_jobs`]) and then runs the executor.
//! Submission itself never blocks on the worker pool.

use std::sync::Arc;

use sculpt_core::clock::Clock;
use sculpt_core::key::{ArtifactKey, CacheNamespace};
use sculpt_core::session::SessionCode;
use sculpt_core::task::{TaskKind, TaskRecord, TaskResult};
use sculpt_core::types::TaskId;
use sculpt_events::ProgressBroadcaster;
use sculpt_store::{CacheStats, ResultCache, StoreError, TaskStore};
use sculpt_upstream::UpstreamGateway;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cancel::CancellationRegistry;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::executor::{Job, TaskExecutor};
use crate::lease::{KeyLeases, Lease};
use crate::watch::TaskWatch;

pub fn new_task_id() -> TaskId {
    uuid::Uuid::new_v4().to_string()
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Served from cache; no task was created.
    Cached(TaskResult),
    /// A new task was enqueued.
    Enqueued(TaskId),
    /// An identical task is already running; follow it instead.
    Joined(TaskId),
}

/// A spawned job. Awaiting the handle yields the final record.
pub struct Enqueued {
    pub task_id: TaskId,
    pub handle: JoinHandle<TaskRecord>,
}

#[derive(Clone)]
pub struct SculptureService {
    executor: Arc<TaskExecutor>,
    cache: ResultCache,
    store: TaskStore,
    broadcaster: ProgressBroadcaster,
    cancels: CancellationRegistry,
    leases: KeyLeases,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
    config: PipelineConfig,
}

impl SculptureService {
    pub fn new(
        gateway: Arc<dyn UpstreamGateway>,
        cache: ResultCache,
        store: TaskStore,
        broadcaster: ProgressBroadcaster,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        let executor = TaskExecutor::new(
            gateway,
            cache.clone(),
            store.clone(),
            broadcaster.clone(),
            clock,
        );
        Self {
            executor: Arc::new(executor),
            cache,
            store,
            broadcaster,
            cancels: CancellationRegistry::new(),
            leases: KeyLeases::new(),
            workers: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn leases(&self) -> &KeyLeases {
        &self.leases
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    /// Tasks queued or running.
    pub fn active_jobs(&self) -> usize {
        self.cancels.active()
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    pub async fn submit_single(
        &self,
        season: i32,
        event_round: u32,
        session: SessionCode,
        participant: &str,
    ) -> Result<Submission, PipelineError> {
        let key = ArtifactKey::single(season, event_round, session, participant)?;
        self.submit(key).await
    }

    pub async fn submit_comparison<S: AsRef<str>>(
        &self,
        season: i32,
        event_round: u32,
        session: SessionCode,
        participants: &[S],
    ) -> Result<Submission, PipelineError> {
        let key = ArtifactKey::comparison(season, event_round, session, participants)?;
        self.submit(key).await
    }

    /// Serve `key` from cache or enqueue a job for it.
    pub async fn submit(&self, key: ArtifactKey) -> Result<Submission, PipelineError> {
        if let Some(result) = self.cached(&key).await {
            return Ok(Submission::Cached(result));
        }

        let task_id = new_task_id();
        let lease = if self.config.strict_single_flight {
            match self.leases.try_acquire(&self.cache.fingerprint(&key), &task_id) {
                Ok(lease) => Some(lease),
                Err(running) => {
                    tracing::debug!(task_id = %running, %key, "Joining in-flight task");
                    return Ok(Submission::Joined(running));
                }
            }
        } else {
            None
        };

        let enqueued = self.enqueue(task_id, key, lease).await?;
        Ok(Submission::Enqueued(enqueued.task_id))
    }

    /// Cached payload for `key`. A cache read error counts as a miss.
    pub async fn cached(&self, key: &ArtifactKey) -> Option<TaskResult> {
        match self.cache.get_artifact(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cache read failed, recomputing");
                None
            }
        }
    }

    /// Create the PENDING record and spawn the job, bypassing the cache
    /// check. `lease` is held until the job finishes.
    pub async fn enqueue(
        &self,
        task_id: TaskId,
        key: ArtifactKey,
        lease: Option<Lease>,
    ) -> Result<Enqueued, StoreError> {
        let kind = if key.is_comparison() {
            TaskKind::Comparison
        } else {
            TaskKind::Single
        };

        let record = self.store.create(&task_id, kind).await?;
        let cancel = self.cancels.register(&task_id, Some(&self.shutdown));

        tracing::info!(task_id = %task_id, %key, "Job enqueued");

        let job = Job {
            task_id: task_id.clone(),
            key,
        };
        let executor = self.executor.clone();
        let workers = self.workers.clone();
        let cancels = self.cancels.clone();

        let handle = tokio::spawn(async move {
            let _lease = lease;
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = workers.acquire_owned() => permit.ok(),
            };

            let task_id = job.task_id.clone();
            let record = match permit {
                Some(_permit) => executor.run(job, record, cancel).await,
                None => executor.abandon(record, "Cancelled before start").await,
            };
            cancels.remove(&task_id);
            record
        });

        Ok(Enqueued { task_id, handle })
    }

    // -----------------------------------------------------------------------
    // Task access
    // -----------------------------------------------------------------------

    pub async fn poll(&self, task_id: &str) -> Result<TaskRecord, StoreError> {
        self.store.get(task_id).await
    }

    /// Snapshot plus a live feed of subsequent updates.
    ///
    /// The subscription is opened before the snapshot is read so no
    /// update falls between the two; [`TaskWatch`] drops the queued ones
    /// the snapshot already covers.
    pub async fn watch(&self, task_id: &str) -> Result<TaskWatch, StoreError> {
        let subscription = self.broadcaster.subscribe(task_id);
        let snapshot = self.store.get(task_id).await?;
        Ok(TaskWatch::new(snapshot, subscription))
    }

    /// Signal a queued or running task. Returns `false` when the task
    /// exists but has already finished.
    pub async fn cancel(&self, task_id: &str) -> Result<bool, StoreError> {
        if self.cancels.cancel(task_id) {
            tracing::info!(task_id, "Cancellation requested");
            return Ok(true);
        }
        self.store.get(task_id).await?;
        Ok(false)
    }

    /// Cancel the task if it is still live and remove its record.
    ///
    /// Later writes from the cancelled job find no record and are not
    /// persisted, so polling answers not found from here on. Returns
    /// whether a record was removed.
    pub async fn discard(&self, task_id: &str) -> Result<bool, StoreError> {
        if self.cancels.cancel(task_id) {
            tracing::info!(task_id, "Cancellation requested before discard");
        }
        let removed = self.store.delete(task_id).await?;
        if removed {
            tracing::info!(task_id, "Task record discarded");
        }
        Ok(removed)
    }

    /// Cancel every queued and running job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // -----------------------------------------------------------------------
    // Cache administration
    // -----------------------------------------------------------------------

    pub async fn cache_stats(&self) -> Result<CacheStats, StoreError> {
        self.cache.stats().await
    }

    pub async fn clear_cache(&self, namespace: Option<CacheNamespace>) -> Result<u64, StoreError> {
        self.cache.clear(namespace).await
    }
}
