//! Per-instance debounce maps.
//!
//! A single `std::sync::Mutex` guards both maps, held only for map reads
//! and writes and never across an `.await` point.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct InstanceState {
    last_applied: HashMap<String, Instant>,
    last_deleted: HashMap<String, Instant>,
}

/// Tracks, per instance, when a hash last had limits applied or was queued
/// for deletion, so a scan tick can skip torrents processed too recently.
pub struct DebounceMaps {
    instances: Mutex<HashMap<i64, InstanceState>>,
}

impl DebounceMaps {
    /// An empty set of maps.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `hash` had limits applied within `skip_within` of now.
    #[must_use]
    pub fn is_apply_debounced(&self, instance_id: i64, hash: &str, skip_within: Duration) -> bool {
        let instances = self.instances.lock().unwrap();
        instances
            .get(&instance_id)
            .and_then(|state| state.last_applied.get(hash))
            .is_some_and(|at| at.elapsed() < skip_within)
    }

    /// Record that `hash` just had limits successfully applied.
    pub fn mark_applied(&self, instance_id: i64, hash: &str) {
        let mut instances = self.instances.lock().unwrap();
        instances
            .entry(instance_id)
            .or_default()
            .last_applied
            .insert(hash.to_string(), Instant::now());
    }

    /// Whether `hash` was queued for deletion within `skip_within` of now.
    #[must_use]
    pub fn is_delete_debounced(&self, instance_id: i64, hash: &str, skip_within: Duration) -> bool {
        let instances = self.instances.lock().unwrap();
        instances
            .get(&instance_id)
            .and_then(|state| state.last_deleted.get(hash))
            .is_some_and(|at| at.elapsed() < skip_within)
    }

    /// Record that `hash` was just successfully queued for deletion.
    pub fn mark_deleted(&self, instance_id: i64, hash: &str) {
        let mut instances = self.instances.lock().unwrap();
        instances
            .entry(instance_id)
            .or_default()
            .last_deleted
            .insert(hash.to_string(), Instant::now());
    }

    /// Evict every entry older than `max_age` across every instance, to
    /// bound memory. Run on a fixed interval, independent of scan ticks.
    pub fn sweep(&self, max_age: Duration) {
        let mut instances = self.instances.lock().unwrap();
        instances.retain(|_, state| {
            state.last_applied.retain(|_, at| at.elapsed() < max_age);
            state.last_deleted.retain(|_, at| at.elapsed() < max_age);
            !state.last_applied.is_empty() || !state.last_deleted.is_empty()
        });
    }
}

impl Default for DebounceMaps {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_not_debounced() {
        let maps = DebounceMaps::new();
        assert!(!maps.is_apply_debounced(1, "a", Duration::from_secs(120)));
    }

    #[test]
    fn marked_entry_is_debounced_within_window() {
        let maps = DebounceMaps::new();
        maps.mark_applied(1, "a");
        assert!(maps.is_apply_debounced(1, "a", Duration::from_secs(120)));
        assert!(!maps.is_apply_debounced(1, "a", Duration::from_nanos(0)));
    }

    #[test]
    fn delete_and_apply_maps_are_independent() {
        let maps = DebounceMaps::new();
        maps.mark_applied(1, "a");
        assert!(!maps.is_delete_debounced(1, "a", Duration::from_secs(300)));
    }

    #[test]
    fn instances_do_not_share_state() {
        let maps = DebounceMaps::new();
        maps.mark_applied(1, "a");
        assert!(!maps.is_apply_debounced(2, "a", Duration::from_secs(120)));
    }

    #[test]
    fn sweep_evicts_old_entries_and_keeps_fresh_ones() {
        let maps = DebounceMaps::new();
        maps.mark_applied(1, "old");
        std::thread::sleep(Duration::from_millis(10));
        maps.mark_applied(1, "fresh");
        maps.sweep(Duration::from_millis(5));
        assert!(!maps.is_apply_debounced(1, "old", Duration::from_secs(120)));
        assert!(maps.is_apply_debounced(1, "fresh", Duration::from_secs(120)));
    }
}
