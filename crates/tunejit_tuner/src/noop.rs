use std::io::{self, Write};
use std::sync::Arc;

use crate::feedback::NoOpFeedback;
use crate::history::GenResult;
use crate::knob_config::KnobConfig;
use crate::knob_set::KnobSet;
use crate::tuner::{Tuner, TunerCore};

/// Tuner used when tuning is disabled.
///
/// Always hands out the same empty config with sentinel feedback, never asks
/// for speculative work and reports nothing.
pub struct NoOpTuner<M: ?Sized> {
    core: TunerCore<M>,
    fixed: GenResult,
}

impl<M: ?Sized> NoOpTuner<M> {
    pub fn new(knobs: KnobSet<M>) -> Self {
        Self {
            core: TunerCore::new(knobs),
            fixed: GenResult::new(Arc::new(KnobConfig::empty()), Arc::new(NoOpFeedback)),
        }
    }
}

impl<M: ?Sized> Default for NoOpTuner<M> {
    fn default() -> Self {
        Self::new(KnobSet::new())
    }
}

impl<M: ?Sized> Tuner<M> for NoOpTuner<M> {
    fn core(&self) -> &TunerCore<M> {
        &self.core
    }

    fn next_config(&mut self) -> GenResult {
        self.fixed.clone()
    }

    fn should_compile_next(&mut self) -> bool {
        false
    }

    fn analyze(&mut self, _module: &M) {}

    fn dump(&self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    fn dump_stats(&self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_same_config() {
        let mut tuner: NoOpTuner<()> = NoOpTuner::default();
        let first = tuner.next_config();
        let second = tuner.next_config();

        assert!(first.config.is_empty());
        assert!(Arc::ptr_eq(&first.config, &second.config));
        assert!(Arc::ptr_eq(&first.feedback, &second.feedback));
        assert!(!first.feedback.is_informative());
        assert!(!tuner.should_compile_next());
    }

    #[test]
    fn test_reports_nothing() {
        let mut tuner: NoOpTuner<()> = NoOpTuner::default();
        let result = tuner.next_config();
        tuner.analyze(&());
        tuner.add_config(result);

        let mut out = Vec::new();
        tuner.dump(&mut out).unwrap();
        tuner.dump_stats(&mut out).unwrap();
        assert!(out.is_empty());
        assert!(tuner.best_seen().is_none());
    }

    #[test]
    fn test_empty_config_applies_cleanly() {
        let tuner: NoOpTuner<()> = NoOpTuner::default();
        let config = KnobConfig::empty();
        assert!(tuner.apply_config(&config, &mut ()).is_ok());
    }
}
