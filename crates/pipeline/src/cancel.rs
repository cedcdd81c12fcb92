//! Cancellation tokens for queued and running jobs.
//!
//! Cancelling only signals the job; the executor observes the token at
//! its next checkpoint and writes the CANCELLED record itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sculpt_core::types::TaskId;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<TaskId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Token for a newly enqueued task. A child of `parent` when given, so
    /// shutting down the parent cancels every job.
    pub fn register(&self, task_id: &str, parent: Option<&CancellationToken>) -> CancellationToken {
        let token = match parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        self.tokens().insert(task_id.to_string(), token.clone());
        token
    }

    /// Signal the task. Returns `false` when it is not queued or running.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.tokens().get(task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, task_id: &str) {
        self.tokens().remove(task_id);
    }

    /// Tasks queued or running.
    pub fn active(&self) -> usize {
        self.tokens().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signals_registered_token() {
        let registry = CancellationRegistry::new();
        let token = registry.register("t1", None);

        assert!(registry.cancel("t1"));
        assert!(token.is_cancelled());
        assert!(!registry.cancel("t2"));
    }

    #[test]
    fn parent_cancellation_reaches_jobs() {
        let registry = CancellationRegistry::new();
        let shutdown = CancellationToken::new();
        let token = registry.register("t1", Some(&shutdown));

        shutdown.cancel();

        assert!(token.is_cancelled());
    }

    #[test]
    fn removed_tasks_are_no_longer_cancellable() {
        let registry = CancellationRegistry::new();
        registry.register("t1", None);
        registry.remove("t1");
        assert!(!registry.cancel("t1"));
        assert_eq!(registry.active(), 0);
    }
}
