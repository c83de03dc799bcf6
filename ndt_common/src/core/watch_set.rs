//! # Watch-Set Tracker
//!
//! The one piece of mutable state shared between the consumer loop and the
//! report job: for every watched cell identifier, whether PM counters were
//! observed in the current reporting window.
//!
//! All three operations take the lock for their whole duration, so a
//! snapshot-with-reset can never drop a mark that lands in between.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Owned status map keyed by watch identifier.
#[derive(Debug, Default)]
pub struct WatchSetTracker {
    status: Mutex<BTreeMap<String, bool>>,
}

impl WatchSetTracker {
    /// An empty watch set.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, bool>> {
        // A panic while holding the guard cannot leave the map half-written.
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets every given identifier to `false`, adding the missing ones.
    /// Entries not in `identifiers` are left untouched.
    pub fn seed<I, S>(&self, identifiers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut status = self.lock();
        for id in identifiers {
            status.insert(id.into(), false);
        }
        debug!(watched = status.len(), "Watch set seeded");
    }

    /// Flags `identifier` as observed. Returns `false` when it is not watched.
    pub fn mark_observed(&self, identifier: &str) -> bool {
        match self.lock().get_mut(identifier) {
            Some(observed) => {
                *observed = true;
                true
            }
            None => false,
        }
    }

    /// Returns an identifier-sorted copy of the map, clearing every flag in
    /// the same critical section when `reset` is set.
    pub fn snapshot_and_maybe_reset(&self, reset: bool) -> BTreeMap<String, bool> {
        let mut status = self.lock();
        let snapshot = status.clone();
        if reset {
            status.values_mut().for_each(|observed| *observed = false);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const CELL_A: &str =
        "urn:3gpp:dn:SubNetwork=Europe,ManagedElement=A,GNBDUFunction=1,NRCellDU=A-1";
    const CELL_B: &str =
        "urn:3gpp:dn:SubNetwork=Europe,ManagedElement=B,GNBDUFunction=1,NRCellDU=B-1";

    #[test]
    fn mark_on_unseeded_identifier_is_a_no_op() {
        let tracker = WatchSetTracker::new();
        tracker.seed([CELL_A]);

        assert!(!tracker.mark_observed(CELL_B));
        let snapshot = tracker.snapshot_and_maybe_reset(false);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(CELL_A), Some(&false));
    }

    #[test]
    fn reset_then_snapshot_is_all_false() {
        let tracker = WatchSetTracker::new();
        tracker.seed([CELL_A, CELL_B]);
        tracker.mark_observed(CELL_A);

        let first = tracker.snapshot_and_maybe_reset(true);
        assert_eq!(first.get(CELL_A), Some(&true));

        let second = tracker.snapshot_and_maybe_reset(false);
        assert!(second.values().all(|observed| !observed));
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn seed_keeps_existing_entries() {
        let tracker = WatchSetTracker::new();
        tracker.seed([CELL_A]);
        tracker.mark_observed(CELL_A);
        tracker.seed([CELL_B]);

        let snapshot = tracker.snapshot_and_maybe_reset(false);
        assert_eq!(snapshot.get(CELL_A), Some(&true));
        assert_eq!(snapshot.get(CELL_B), Some(&false));
    }

    #[test]
    fn snapshot_is_sorted_by_identifier() {
        let tracker = WatchSetTracker::new();
        tracker.seed(["c", "a", "b"]);
        let keys: Vec<_> = tracker.snapshot_and_maybe_reset(false).into_keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn concurrent_marks_are_not_lost() {
        let tracker = Arc::new(WatchSetTracker::new());
        let ids: Vec<String> = (0..64).map(|i| format!("cell-{i:02}")).collect();
        tracker.seed(ids.clone());

        let handles: Vec<_> = ids
            .chunks(16)
            .map(|chunk| {
                let tracker = Arc::clone(&tracker);
                let chunk = chunk.to_vec();
                std::thread::spawn(move || {
                    for id in chunk {
                        tracker.mark_observed(&id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(tracker.snapshot_and_maybe_reset(false).values().all(|v| *v));
    }
}
