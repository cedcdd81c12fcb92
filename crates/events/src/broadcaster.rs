//! Per-task fan-out of [`TaskRecord`] snapshots.
//!
//! [`ProgressBroadcaster`] keeps, for every task id, the set of currently
//! subscribed observers. Each observer owns an unbounded channel, so
//! [`publish`](ProgressBroadcaster::publish) never waits on a slow reader.
//! Dropping a [`Subscription`] removes it; observers that vanished without
//! dropping (closed receivers) are pruned on the next publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use sculpt_core::task::TaskRecord;
use sculpt_core::types::TaskId;
use tokio::sync::mpsc;

type Observers = HashMap<u64, mpsc::UnboundedSender<TaskRecord>>;

#[derive(Default)]
struct Inner {
    topics: Mutex<HashMap<TaskId, Observers>>,
    next_id: AtomicU64,
}

impl Inner {
    fn topics(&self) -> MutexGuard<'_, HashMap<TaskId, Observers>> {
        // No critical section can leave the map half-updated.
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, handle: &SubscriptionHandle) -> bool {
        let mut topics = self.topics();
        let Some(observers) = topics.get_mut(&handle.task_id) else {
            return false;
        };
        let removed = observers.remove(&handle.id).is_some();
        if observers.is_empty() {
            topics.remove(&handle.task_id);
        }
        removed
    }
}

/// Identifies one subscription for explicit removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub task_id: TaskId,
    id: u64,
}

/// Receiving end of a subscription. Unsubscribes on drop.
pub struct Subscription {
    handle: SubscriptionHandle,
    rx: mpsc::UnboundedReceiver<TaskRecord>,
    owner: Weak<Inner>,
}

impl Subscription {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Next published record, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<TaskRecord> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<TaskRecord> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner.remove(&self.handle);
        }
    }
}

/// Cheap to clone; all clones share the same subscriber registry.
#[derive(Clone, Default)]
pub struct ProgressBroadcaster {
    inner: Arc<Inner>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, task_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .topics()
            .entry(task_id.to_string())
            .or_default()
            .insert(id, tx);

        tracing::debug!(task_id, subscription_id = id, "Progress subscription added");

        Subscription {
            handle: SubscriptionHandle {
                task_id: task_id.to_string(),
                id,
            },
            rx,
            owner: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription. Its receiver sees the end of the stream.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.remove(handle)
    }

    /// Deliver `record` to every observer of `task_id` and return the
    /// number it reached.
    pub fn publish(&self, task_id: &str, record: &TaskRecord) -> usize {
        let mut topics = self.inner.topics();
        let Some(observers) = topics.get_mut(task_id) else {
            return 0;
        };

        observers.retain(|_, tx| tx.send(record.clone()).is_ok());
        let delivered = observers.len();
        if observers.is_empty() {
            topics.remove(task_id);
        }
        delivered
    }

    pub fn subscriber_count(&self, task_id: &str) -> usize {
        self.inner.topics().get(task_id).map_or(0, HashMap::len)
    }

    /// Number of task ids with at least one observer.
    pub fn topic_count(&self) -> usize {
        self.inner.topics().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sculpt_core::task::{Checkpoint, TaskKind, TaskUpdate};

    fn record(task_id: &str) -> TaskRecord {
        TaskRecord::pending(task_id, TaskKind::Single, Utc::now())
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_event() {
        let bus = ProgressBroadcaster::new();
        let mut tab1 = bus.subscribe("t1");
        let mut tab2 = bus.subscribe("t1");

        assert_eq!(bus.publish("t1", &record("t1")), 2);

        assert_eq!(tab1.recv().await.unwrap().task_id, "t1");
        assert_eq!(tab2.recv().await.unwrap().task_id, "t1");
    }

    #[tokio::test]
    async fn events_are_scoped_to_their_task() {
        let bus = ProgressBroadcaster::new();
        let mut other = bus.subscribe("t2");

        bus.publish("t1", &record("t1"));

        assert!(other.try_recv().is_none());
    }

    #[tokio::test]
    async fn order_is_preserved_per_subscriber() {
        let bus = ProgressBroadcaster::new();
        let mut sub = bus.subscribe("t1");
        let mut rec = record("t1");

        for checkpoint in Checkpoint::ALL {
            rec.apply(TaskUpdate::checkpoint(checkpoint, "step"), Utc::now())
                .unwrap();
            bus.publish("t1", &rec);
        }

        for checkpoint in Checkpoint::ALL {
            assert_eq!(sub.recv().await.unwrap().progress, checkpoint.percent());
        }
    }

    #[test]
    fn dropping_a_subscription_unsubscribes() {
        let bus = ProgressBroadcaster::new();
        let sub = bus.subscribe("t1");
        assert_eq!(bus.subscriber_count("t1"), 1);

        drop(sub);

        assert_eq!(bus.subscriber_count("t1"), 0);
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn explicit_unsubscribe_ends_the_stream() {
        let bus = ProgressBroadcaster::new();
        let mut sub = bus.subscribe("t1");
        let handle = sub.handle().clone();

        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));
        assert!(sub.recv().await.is_none());
        assert_eq!(bus.publish("t1", &record("t1")), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_others() {
        let bus = ProgressBroadcaster::new();
        let _slow = bus.subscribe("t1");
        let mut fast = bus.subscribe("t1");

        for _ in 0..1_000 {
            bus.publish("t1", &record("t1"));
        }

        assert!(fast.recv().await.is_some());
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = ProgressBroadcaster::new();
        assert_eq!(bus.publish("orphan", &record("orphan")), 0);
    }
}
