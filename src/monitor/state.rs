use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::models::{CheckResult, Transition};

/// Last observed up/down status per target.
///
/// A missing entry means the target has not completed a check yet; it is
/// never read as "down".
#[derive(Debug, Default)]
pub struct StateTracker {
    last: Mutex<HashMap<String, bool>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `result` and returns the transition it caused, if any.
    ///
    /// The first observation of a target never yields a transition.
    pub fn observe(&self, result: &CheckResult) -> Option<Transition> {
        let prior = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            last.insert(result.target.clone(), result.success)
        };

        match prior {
            Some(was_up) if was_up != result.success => Some(Transition {
                target: result.target.clone(),
                is_up: result.success,
                was_up,
            }),
            _ => None,
        }
    }

    pub fn status(&self, target: &str) -> Option<bool> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn result(target: &str, success: bool) -> CheckResult {
        if success {
            CheckResult::up(target, Utc::now(), Duration::ZERO)
        } else {
            CheckResult::down(target, Utc::now(), Duration::ZERO, "down")
        }
    }

    #[test]
    fn test_first_observation_never_transitions() {
        let tracker = StateTracker::new();
        assert_eq!(tracker.status("a"), None);
        assert_eq!(tracker.observe(&result("a", false)), None);
        assert_eq!(tracker.observe(&result("b", true)), None);
        assert_eq!(tracker.status("a"), Some(false));
        assert_eq!(tracker.status("b"), Some(true));
    }

    #[test]
    fn test_fires_once_per_flip() {
        let tracker = StateTracker::new();
        let sequence = [true, true, false, false, false, true, false, false];
        let transitions: Vec<Transition> = sequence
            .iter()
            .filter_map(|&up| tracker.observe(&result("svc", up)))
            .collect();

        assert_eq!(
            transitions,
            vec![
                Transition { target: "svc".into(), is_up: false, was_up: true },
                Transition { target: "svc".into(), is_up: true, was_up: false },
                Transition { target: "svc".into(), is_up: false, was_up: true },
            ]
        );
    }

    #[test]
    fn test_targets_are_tracked_independently() {
        let tracker = StateTracker::new();
        tracker.observe(&result("a", true));
        tracker.observe(&result("b", false));
        assert_eq!(tracker.observe(&result("b", false)), None);
        let flip = tracker.observe(&result("a", false)).unwrap();
        assert_eq!(flip.target, "a");

        assert_eq!(tracker.status("a"), Some(false));
        assert_eq!(tracker.status("b"), Some(false));
        assert_eq!(tracker.status("c"), None);
    }

    #[test]
    fn test_concurrent_writers_keep_every_entry() {
        let tracker = Arc::new(StateTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let name = format!("t{i}");
                    let mut flips = 0;
                    for n in 0..100 {
                        if tracker.observe(&result(&name, n % 2 == 0)).is_some() {
                            flips += 1;
                        }
                    }
                    flips
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 99);
        }
        for i in 0..8 {
            assert_eq!(tracker.status(&format!("t{i}")), Some(false));
        }
    }
}
