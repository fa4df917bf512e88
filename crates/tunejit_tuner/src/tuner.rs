use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

use crate::apply::apply_config;
use crate::error::TunerError;
use crate::history::{GenResult, History};
use crate::knob_config::KnobConfig;
use crate::knob_set::KnobSet;
use crate::report;

/// State every tuner shares: the knob set it tunes and its history.
pub struct TunerCore<M: ?Sized> {
    knobs: Mutex<KnobSet<M>>,
    history: Arc<History>,
}

impl<M: ?Sized> TunerCore<M> {
    pub fn new(knobs: KnobSet<M>) -> Self {
        Self {
            knobs: Mutex::new(knobs),
            history: Arc::new(History::new()),
        }
    }

    /// Shared handle to the history. Worker threads append through it while
    /// the coordinator keeps exclusive use of the tuner itself.
    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    pub fn with_knobs<R>(&self, f: impl FnOnce(&KnobSet<M>) -> R) -> R {
        f(&self.knobs.lock())
    }

    pub fn apply_config(&self, config: &KnobConfig, module: &mut M) -> Result<(), TunerError> {
        apply_config(&mut self.knobs.lock(), config, module)
    }
}

/// Exploration policy plus a thread-safe log of what has been tried.
///
/// `next_config`, `should_compile_next` and `analyze` take `&mut self`: one
/// coordinator drives them. The remaining operations take `&self`, only touch
/// state that is safe to share, and may be called from any thread while the
/// coordinator is busy.
pub trait Tuner<M: ?Sized>: Send + Sync {
    fn core(&self) -> &TunerCore<M>;

    /// The next candidate to try. Must not change any live knob value.
    fn next_config(&mut self) -> GenResult;

    /// Whether another speculative compilation may start before feedback on
    /// the earlier ones arrives.
    fn should_compile_next(&mut self) -> bool;

    /// Take in a compiled and measured module, update policy state and record
    /// the outcome with [`Tuner::add_config`].
    fn analyze(&mut self, module: &M);

    fn add_config(&self, result: GenResult) {
        self.core().history().push(result);
    }

    fn best_seen(&self) -> Option<GenResult> {
        self.core().history().best()
    }

    fn apply_config(&self, config: &KnobConfig, module: &mut M) -> Result<(), TunerError> {
        self.core().apply_config(config, module)
    }

    fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        let best = self.best_seen();
        let record = best
            .as_ref()
            .map(|result| self.core().with_knobs(|knobs| report::version_record(knobs, result)));
        report::write_best(out, record.as_ref())
    }

    fn dump_stats(&self, out: &mut dyn Write) -> io::Result<()> {
        let entries = self.core().history().best_first();
        let records = self
            .core()
            .with_knobs(|knobs| report::version_records(knobs, &entries));
        report::write_stats(out, &records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{ExecutionTime, Feedback};
    use crate::grid::GridTuner;
    use crate::knob::{KnobId, ScalarKnob};
    use crate::noop::NoOpTuner;
    use rayon::prelude::*;
    use std::time::Duration;

    fn knobs() -> (KnobSet<()>, KnobId) {
        let mut knobs = KnobSet::new();
        let id = knobs
            .add_int(ScalarKnob::new("width", 0, 0, 63, |_, _| {}))
            .unwrap();
        (knobs, id)
    }

    fn timed(id: KnobId, millis: u64) -> GenResult {
        let config = KnobConfig::builder()
            .int(id, i64::try_from(millis).unwrap())
            .build();
        let feedback = ExecutionTime::new();
        feedback.record_sample(Duration::from_millis(millis + 1));
        GenResult::new(Arc::new(config), Arc::new(feedback))
    }

    fn record_concurrently(shared: &dyn Tuner<()>, id: KnobId) {
        (0..64u64).into_par_iter().for_each(|millis| {
            shared.add_config(timed(id, millis));
            let _ = shared.best_seen();
            let mut sink = Vec::new();
            shared.dump_stats(&mut sink).unwrap();
        });
    }

    #[test]
    fn test_grid_tuner_shared_across_threads() {
        let (knobs, id) = knobs();
        let tuner = GridTuner::new(knobs, 4);
        record_concurrently(&tuner, id);

        assert_eq!(tuner.core().history().len(), 64);
        let best = tuner.best_seen().unwrap();
        assert_eq!(best.config.int(id), Some(0));
    }

    #[test]
    fn test_noop_tuner_shared_across_threads() {
        let (knobs, id) = knobs();
        let tuner = NoOpTuner::new(knobs);
        record_concurrently(&tuner, id);

        assert_eq!(tuner.core().history().len(), 64);
        let mut out = Vec::new();
        tuner.dump_stats(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_apply_config_from_many_threads() {
        let (knobs, id) = knobs();
        let tuner: Box<dyn Tuner<()>> = Box::new(GridTuner::new(knobs, 1));
        let shared = tuner.as_ref();
        (0..16i64).into_par_iter().for_each(|value| {
            let config = KnobConfig::builder().int(id, value).build();
            shared.apply_config(&config, &mut ()).unwrap();
        });

        let value = shared.core().with_knobs(|knobs| knobs.int_value(id)).unwrap();
        assert!((0..16).contains(&value));
    }
}
