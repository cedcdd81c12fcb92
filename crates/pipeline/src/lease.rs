//! Per-fingerprint single-flight guard.
//!
//! At most one [`Lease`] exists per fingerprint. The lease records the
//! task building that fingerprint, so a second caller can be pointed at
//! the running task. Dropping the lease releases the fingerprint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sculpt_core::types::TaskId;

#[derive(Default)]
struct Inner {
    held: Mutex<HashMap<String, TaskId>>,
}

impl Inner {
    fn held(&self) -> MutexGuard<'_, HashMap<String, TaskId>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct KeyLeases {
    inner: Arc<Inner>,
}

impl KeyLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `fingerprint` for `task_id`, or return the task already
    /// holding it.
    pub fn try_acquire(&self, fingerprint: &str, task_id: &str) -> Result<Lease, TaskId> {
        let mut held = self.inner.held();
        if let Some(owner) = held.get(fingerprint) {
            return Err(owner.clone());
        }
        held.insert(fingerprint.to_string(), task_id.to_string());
        Ok(Lease {
            fingerprint: fingerprint.to_string(),
            leases: self.inner.clone(),
        })
    }

    /// Task currently holding `fingerprint`.
    pub fn holder(&self, fingerprint: &str) -> Option<TaskId> {
        self.inner.held().get(fingerprint).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.held().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive claim on one fingerprint.
pub struct Lease {
    fingerprint: String,
    leases: Arc<Inner>,
}

impl Lease {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.leases.held().remove(&self.fingerprint);
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_reports_the_holder() {
        let leases = KeyLeases::new();
        let _lease = leases.try_acquire("f1:sculpture:2024:1:Q:VER", "t1").unwrap();

        assert_eq!(
            leases.try_acquire("f1:sculpture:2024:1:Q:VER", "t2").unwrap_err(),
            "t1"
        );
        assert!(leases.try_acquire("f1:sculpture:2024:1:Q:HAM", "t3").is_ok());
    }

    #[test]
    fn dropping_the_lease_releases_the_key() {
        let leases = KeyLeases::new();
        let lease = leases.try_acquire("k", "t1").unwrap();
        assert_eq!(leases.holder("k").as_deref(), Some("t1"));

        drop(lease);

        assert!(leases.is_empty());
        assert!(leases.try_acquire("k", "t2").is_ok());
    }
}
