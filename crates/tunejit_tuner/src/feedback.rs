//! Measurements attached to tried configurations.
//!
//! All ordering flows through [`Feedback::better_than`]:
//! `a` is superseded by `b` iff `b.better_than(a)`, and `a` sorts before `b`
//! in a best-first report iff `a.better_than(b)`.

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::any::Any;
use std::fmt;
use std::time::Duration;

pub trait Feedback: fmt::Debug + Send + Sync {
    /// Strict order: never true for `self` against itself.
    fn better_than(&self, other: &dyn Feedback) -> bool;

    /// False for feedback that carries no measurement yet. Such feedback never
    /// wins a comparison and is never displaced by one.
    fn is_informative(&self) -> bool;

    /// Record one timed run of the configuration this feedback belongs to.
    fn record_sample(&self, _elapsed: Duration) {}

    fn as_any(&self) -> &dyn Any;

    fn report(&self) -> Value;
}

/// Sentinel for "no measurement", used when tuning is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoOpFeedback;

impl Feedback for NoOpFeedback {
    fn better_than(&self, _other: &dyn Feedback) -> bool {
        false
    }

    fn is_informative(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn report(&self) -> Value {
        Value::Null
    }
}

/// Wall-clock running time in seconds; the lower mean wins.
#[derive(Debug, Default)]
pub struct ExecutionTime {
    samples: Mutex<Vec<f64>>,
}

impl ExecutionTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        Self {
            samples: Mutex::new(samples.into_iter().filter(|s| s.is_finite()).collect()),
        }
    }

    pub fn record(&self, seconds: f64) {
        if seconds.is_finite() {
            self.samples.lock().push(seconds);
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn mean(&self) -> Option<f64> {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    pub fn stddev(&self) -> Option<f64> {
        let samples = self.samples.lock();
        if samples.len() < 2 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>()
            / (samples.len() - 1) as f64;
        Some(variance.sqrt())
    }
}

impl Feedback for ExecutionTime {
    fn better_than(&self, other: &dyn Feedback) -> bool {
        let Some(other) = other.as_any().downcast_ref::<ExecutionTime>() else {
            return false;
        };
        match (self.mean(), other.mean()) {
            (Some(mine), Some(theirs)) => mine < theirs,
            _ => false,
        }
    }

    fn is_informative(&self) -> bool {
        self.sample_count() > 0
    }

    fn record_sample(&self, elapsed: Duration) {
        self.record(elapsed.as_secs_f64());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn report(&self) -> Value {
        json!({
            "mean": self.mean(),
            "stddev": self.stddev(),
            "samples": self.sample_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_time_wins() {
        let fast = ExecutionTime::from_samples([1.0, 3.0]);
        let slow = ExecutionTime::from_samples([4.0]);
        assert!(fast.better_than(&slow));
        assert!(!slow.better_than(&fast));
        assert!(!fast.better_than(&fast));
    }

    #[test]
    fn test_sentinel_never_wins_or_loses() {
        let sentinel = NoOpFeedback;
        let measured = ExecutionTime::from_samples([0.5]);
        assert!(!sentinel.better_than(&measured));
        assert!(!measured.better_than(&sentinel));
        assert!(!sentinel.is_informative());
    }

    #[test]
    fn test_unmeasured_time_is_not_informative() {
        let pending = ExecutionTime::new();
        let measured = ExecutionTime::from_samples([2.0]);
        assert!(!pending.is_informative());
        assert!(!pending.better_than(&measured));
        assert!(!measured.better_than(&pending));

        pending.record_sample(Duration::from_secs(1));
        assert!(pending.is_informative());
        assert!(pending.better_than(&measured));
    }

    #[test]
    fn test_statistics() {
        let time = ExecutionTime::from_samples([2.0, 4.0, f64::NAN]);
        assert_eq!(time.sample_count(), 2);
        assert_eq!(time.mean(), Some(3.0));
        let stddev = time.stddev().unwrap();
        assert!((stddev - std::f64::consts::SQRT_2).abs() < 1e-9);
    }
}
