//! Short-lived task records keyed by task id.
//!
//! Every write refreshes the retention window, so a record lives for
//! `ttl` after its last update whatever its state. A worker that dies
//! mid-run leaves a PENDING/PROGRESS record that simply ages out.

use std::sync::Arc;
use std::time::Duration;

use sculpt_core::clock::{Clock, SystemClock};
use sculpt_core::task::{TaskKind, TaskRecord, TaskUpdate};

use crate::backend::KvBackend;
use crate::error::StoreError;

pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(60 * 60);

const KEY_PREFIX: &str = "task-meta:";

#[derive(Clone)]
pub struct TaskStore {
    backend: Arc<dyn KvBackend>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TaskStore {
    pub fn new(backend: Arc<dyn KvBackend>, ttl: Duration) -> Self {
        Self::with_clock(backend, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn KvBackend>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(task_id: &str) -> String {
        format!("{KEY_PREFIX}{task_id}")
    }

    /// Store a fresh PENDING record.
    pub async fn create(&self, task_id: &str, kind: TaskKind) -> Result<TaskRecord, StoreError> {
        let record = TaskRecord::pending(task_id, kind, self.clock.now());
        self.save(&record).await?;
        Ok(record)
    }

    /// Merge `update` into the stored record and return the result.
    ///
    /// Read-modify-write; only the owning executor writes a given id.
    pub async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<TaskRecord, StoreError> {
        let mut record = self.get(task_id).await?;
        record.apply(update, self.clock.now())?;
        self.save(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, task_id: &str) -> Result<TaskRecord, StoreError> {
        let raw = self
            .backend
            .get(&Self::key(task_id))
            .await?
            .ok_or_else(|| StoreError::NotFound {
                task_id: task_id.to_string(),
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, task_id: &str) -> Result<bool, StoreError> {
        self.backend.delete(&Self::key(task_id)).await
    }

    /// Overwrite the stored record wholesale.
    pub async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let raw = serde_json::to_string(record)?;
        self.backend
            .set(&Self::key(&record.task_id), raw, self.ttl)
            .await
    }
}
