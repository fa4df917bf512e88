use parking_lot::Mutex;
use std::sync::Arc;

use crate::feedback::Feedback;
use crate::knob_config::KnobConfig;

/// A tried configuration together with its measurement.
///
/// Both halves are shared, so one config or feedback may back several
/// history slots.
#[derive(Debug, Clone)]
pub struct GenResult {
    pub config: Arc<KnobConfig>,
    pub feedback: Arc<dyn Feedback>,
}

impl GenResult {
    pub fn new(config: Arc<KnobConfig>, feedback: Arc<dyn Feedback>) -> Self {
        Self { config, feedback }
    }
}

/// Append-only log of explored configurations, safe to share across threads.
///
/// Appends are atomic; readers work on a snapshot copied under the lock, so a
/// scan or sort never observes a half-finished append.
#[derive(Debug, Default)]
pub struct History {
    entries: Mutex<Vec<GenResult>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: GenResult) {
        self.entries.lock().push(result);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Point-in-time copy of every entry, in insertion order.
    pub fn snapshot(&self) -> Vec<GenResult> {
        self.entries.lock().clone()
    }

    /// The entry no other informative entry beats, if any exist.
    ///
    /// Ties keep the earliest entry.
    pub fn best(&self) -> Option<GenResult> {
        let snapshot = self.snapshot();
        let mut best: Option<&GenResult> = None;
        for entry in snapshot.iter().filter(|e| e.feedback.is_informative()) {
            match best {
                Some(current) if !entry.feedback.better_than(current.feedback.as_ref()) => {}
                _ => best = Some(entry),
            }
        }
        best.cloned()
    }

    /// Every entry, best first.
    pub fn best_first(&self) -> Vec<GenResult> {
        sort_best_first(self.snapshot())
    }
}

/// Order `entries` best first under [`Feedback::better_than`].
///
/// `better_than` need not be a total order and the std sorts may panic on
/// such comparators, so this is a stable insertion sort. Non-informative
/// entries keep their relative order at the end.
pub fn sort_best_first(entries: Vec<GenResult>) -> Vec<GenResult> {
    let (measured, unmeasured): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| entry.feedback.is_informative());

    let mut sorted: Vec<GenResult> = Vec::with_capacity(measured.len() + unmeasured.len());
    for entry in measured {
        let position = sorted
            .iter()
            .position(|placed| entry.feedback.better_than(placed.feedback.as_ref()))
            .unwrap_or(sorted.len());
        sorted.insert(position, entry);
    }
    sorted.extend(unmeasured);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{ExecutionTime, NoOpFeedback};
    use rayon::prelude::*;

    fn timed(score: f64) -> GenResult {
        GenResult::new(
            Arc::new(KnobConfig::empty()),
            Arc::new(ExecutionTime::from_samples([score])),
        )
    }

    fn score(result: &GenResult) -> f64 {
        result
            .feedback
            .as_any()
            .downcast_ref::<ExecutionTime>()
            .and_then(ExecutionTime::mean)
            .unwrap()
    }

    #[test]
    fn test_best_of_empty_history() {
        assert!(History::new().best().is_none());
    }

    #[test]
    fn test_best_and_order_lower_wins() {
        let history = History::new();
        for s in [10.0, 3.0, 7.0] {
            history.push(timed(s));
        }

        assert_eq!(score(&history.best().unwrap()), 3.0);
        let order: Vec<f64> = history.best_first().iter().map(score).collect();
        assert_eq!(order, vec![3.0, 7.0, 10.0]);
    }

    #[test]
    fn test_order_independent_of_insertion() {
        let forward = History::new();
        let backward = History::new();
        let scores = [5.0, 1.0, 9.0, 4.0, 2.0];
        for s in scores {
            forward.push(timed(s));
        }
        for s in scores.iter().rev() {
            backward.push(timed(*s));
        }

        let a: Vec<f64> = forward.best_first().iter().map(score).collect();
        let b: Vec<f64> = backward.best_first().iter().map(score).collect();
        assert_eq!(a, b);
        assert_eq!(a, vec![1.0, 2.0, 4.0, 5.0, 9.0]);
    }

    #[test]
    fn test_sentinels_are_ignored_by_best() {
        let history = History::new();
        let sentinel = GenResult::new(Arc::new(KnobConfig::empty()), Arc::new(NoOpFeedback));
        history.push(sentinel.clone());
        history.push(sentinel);
        assert!(history.best().is_none());

        history.push(timed(8.0));
        assert_eq!(score(&history.best().unwrap()), 8.0);

        let sorted = history.best_first();
        assert_eq!(sorted.len(), 3);
        assert!(sorted[0].feedback.is_informative());
        assert!(!sorted[2].feedback.is_informative());
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let history = History::new();
        (0..256).into_par_iter().for_each(|i| {
            history.push(timed(f64::from(i % 17) + 1.0));
        });

        assert_eq!(history.len(), 256);
        let best = history.best().unwrap();
        assert!(
            history
                .snapshot()
                .iter()
                .all(|entry| !entry.feedback.better_than(best.feedback.as_ref()))
        );
        assert_eq!(score(&best), 1.0);
    }
}
