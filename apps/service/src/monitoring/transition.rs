use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Result of feeding one verdict into the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Verdict of the preceding check, `None` on the first observation
    pub previous: Option<bool>,
    pub changed: bool,
}

/// Last known up/down verdict per target, in memory only
///
/// A target with no entry has not completed a check since startup, so its
/// first verdict is never reported as a change.
#[derive(Debug, Default)]
pub struct TransitionTracker {
    last_status: Mutex<HashMap<Uuid, bool>>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `is_up` for `target_id` and report whether it flipped
    pub fn observe(&self, target_id: Uuid, is_up: bool) -> Transition {
        let mut last_status = self.last_status.lock().unwrap_or_else(|e| e.into_inner());
        let previous = last_status.insert(target_id, is_up);

        Transition { previous, changed: previous.is_some_and(|was_up| was_up != is_up) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_never_changes() {
        for verdict in [true, false] {
            let tracker = TransitionTracker::new();
            let transition = tracker.observe(Uuid::new_v4(), verdict);
            assert_eq!(transition, Transition { previous: None, changed: false });
        }
    }

    #[test]
    fn test_flip_is_reported_once() {
        let tracker = TransitionTracker::new();
        let id = Uuid::new_v4();

        assert!(!tracker.observe(id, false).changed);
        let flip = tracker.observe(id, true);
        assert_eq!(flip, Transition { previous: Some(false), changed: true });
        assert!(!tracker.observe(id, true).changed);
        assert!(tracker.observe(id, false).changed);
    }

    #[test]
    fn test_targets_are_independent() {
        let tracker = TransitionTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        tracker.observe(a, true);
        assert_eq!(tracker.observe(b, false).previous, None);
        assert_eq!(tracker.observe(a, true).previous, Some(true));
        assert_eq!(tracker.observe(b, false).previous, Some(false));
    }
}
