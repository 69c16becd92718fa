//! Single-writer-per-instance invariant and the job shape handed to workers
//!.

use std::collections::HashSet;
use std::sync::Mutex;

use fleet_data::model::BackupKind;

use crate::error::{BackupError, BackupResult};

/// One queued backup run, ready for a worker to execute.
#[derive(Debug, Clone)]
pub struct Job {
    /// The row this job executes.
    pub run_id: i64,
    /// Instance the run backs up.
    pub instance_id: i64,
    /// Cadence the run was requested under.
    pub kind: BackupKind,
}

/// Tracks which instances currently have a run in flight. `try_acquire` is
/// an atomic test-and-set; enforces at most one run per instance at any
/// instant.
#[derive(Default)]
pub struct InflightSet {
    instances: Mutex<HashSet<i64>>,
}

impl InflightSet {
    /// An empty inflight set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `instance_id`, failing with [`BackupError::InstanceBusy`] if it
    /// is already claimed.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InstanceBusy`] if a run for this instance is
    /// already in flight.
    pub fn try_acquire(&self, instance_id: i64) -> BackupResult<()> {
        let mut instances = self.instances.lock().unwrap();
        if instances.insert(instance_id) {
            Ok(())
        } else {
            Err(BackupError::InstanceBusy { instance_id })
        }
    }

    /// Release `instance_id`'s claim, permitting a future run to be queued.
    pub fn release(&self, instance_id: i64) {
        self.instances.lock().unwrap().remove(&instance_id);
    }

    /// Whether `instance_id` currently has a claim (test-only introspection).
    #[cfg(test)]
    #[must_use]
    pub fn is_held(&self, instance_id: i64) -> bool {
        self.instances.lock().unwrap().contains(&instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_instance_is_rejected() {
        let set = InflightSet::new();
        set.try_acquire(1).unwrap();
        let err = set.try_acquire(1).unwrap_err();
        assert!(matches!(err, BackupError::InstanceBusy { instance_id: 1 }));
    }

    #[test]
    fn release_permits_reacquiring() {
        let set = InflightSet::new();
        set.try_acquire(1).unwrap();
        set.release(1);
        assert!(set.try_acquire(1).is_ok());
    }

    #[test]
    fn different_instances_do_not_contend() {
        let set = InflightSet::new();
        set.try_acquire(1).unwrap();
        assert!(set.try_acquire(2).is_ok());
        assert!(set.is_held(1));
        assert!(set.is_held(2));
    }
}
