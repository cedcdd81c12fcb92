//! Progress reporting for one task.
//!
//! The reporter keeps the authoritative copy of the record for the
//! duration of a run. Each update is validated against that copy, merged
//! into the [`TaskStore`], and published to subscribers before the caller
//! moves on, so observers see every checkpoint in order.

use std::sync::Arc;

use sculpt_core::clock::Clock;
use sculpt_core::error::CoreError;
use sculpt_core::task::{TaskRecord, TaskUpdate};
use sculpt_events::ProgressBroadcaster;
use sculpt_store::{StoreError, TaskStore};

pub struct TaskReporter {
    record: TaskRecord,
    store: TaskStore,
    broadcaster: ProgressBroadcaster,
    clock: Arc<dyn Clock>,
}

impl TaskReporter {
    pub fn new(
        record: TaskRecord,
        store: TaskStore,
        broadcaster: ProgressBroadcaster,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            record,
            store,
            broadcaster,
            clock,
        }
    }

    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    pub fn task_id(&self) -> &str {
        &self.record.task_id
    }

    pub fn into_record(self) -> TaskRecord {
        self.record
    }

    /// Apply `update`, persist it, and notify subscribers.
    ///
    /// A store failure does not stop the run: subscribers still receive
    /// the update and the next write tries the store again. A record that
    /// was discarded stays gone.
    pub async fn emit(&mut self, update: TaskUpdate) -> Result<(), CoreError> {
        self.record.apply(update.clone(), self.clock.now())?;

        match self.store.update(&self.record.task_id, update).await {
            Ok(stored) => self.record = stored,
            Err(StoreError::NotFound { .. }) => {
                // Discarded or expired; the record is not brought back.
                tracing::debug!(
                    task_id = %self.record.task_id,
                    progress = self.record.progress,
                    "Task record gone, update not persisted",
                );
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %self.record.task_id,
                    progress = self.record.progress,
                    error = %e,
                    "Failed to persist task progress",
                );
            }
        }

        self.broadcaster.publish(&self.record.task_id, &self.record);
        Ok(())
    }
}
