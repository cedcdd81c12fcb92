//! Ordered view of one task for push observers.
//!
//! The subscription opens before the snapshot is read, so updates
//! published in between sit in its queue and may be older than the
//! snapshot. [`TaskWatch`] hands out the snapshot first and then only
//! records that [supersede](TaskRecord::supersedes) the last one it
//! delivered, so an observer never sees progress move backwards.

use sculpt_core::task::TaskRecord;
use sculpt_events::Subscription;

pub struct TaskWatch {
    last: TaskRecord,
    subscription: Subscription,
}

impl TaskWatch {
    pub(crate) fn new(snapshot: TaskRecord, subscription: Subscription) -> Self {
        Self {
            last: snapshot,
            subscription,
        }
    }

    /// The most recent record delivered, initially the snapshot.
    pub fn current(&self) -> &TaskRecord {
        &self.last
    }

    /// The next newer record. `None` once the task is terminal or the
    /// broadcaster is gone.
    pub async fn next(&mut self) -> Option<TaskRecord> {
        while !self.last.is_terminal() {
            let record = self.subscription.recv().await?;
            if record.supersedes(&self.last) {
                self.last = record.clone();
                return Some(record);
            }
            tracing::trace!(
                task_id = %record.task_id,
                progress = record.progress,
                "Dropping stale task update",
            );
        }
        None
    }
}
