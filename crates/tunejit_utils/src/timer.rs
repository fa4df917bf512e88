use std::time::{Duration, Instant};

/// Simple stopwatch helper for wall-clock measurements.
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start_new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Run `f` and return its result with the time it took.
    pub fn time<T>(f: impl FnOnce() -> T) -> (T, Duration) {
        let watch = Self::start_new();
        let value = f();
        (value, watch.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_returns_value() {
        let (value, elapsed) = Stopwatch::time(|| 21 * 2);
        assert_eq!(value, 42);
        assert!(elapsed < Duration::from_secs(5));
    }
}
