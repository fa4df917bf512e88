use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

use crate::feedback::ExecutionTime;
use crate::history::GenResult;
use crate::knob::{KnobId, LoopSetting};
use crate::knob_config::KnobConfig;
use crate::knob_set::KnobSet;
use crate::tuner::{Tuner, TunerCore};

#[derive(Debug, Clone)]
enum Axis {
    Int { id: KnobId, values: Vec<i64> },
    Loop { id: KnobId, values: Vec<LoopSetting> },
}

impl Axis {
    fn len(&self) -> usize {
        match self {
            Axis::Int { values, .. } => values.len(),
            Axis::Loop { values, .. } => values.len(),
        }
    }
}

/// Exhaustive search over the cartesian product of every knob's candidates.
///
/// Configurations are produced in mixed-radix order with the first knob
/// varying fastest. Once the space is exhausted the tuner keeps handing out
/// the best configuration seen so far.
pub struct GridTuner<M: ?Sized> {
    core: TunerCore<M>,
    axes: Vec<Axis>,
    cursor: Vec<usize>,
    exhausted: bool,
    in_flight: VecDeque<GenResult>,
    max_in_flight: usize,
    generated: usize,
}

impl<M: ?Sized> GridTuner<M> {
    pub fn new(knobs: KnobSet<M>, max_in_flight: usize) -> Self {
        let mut axes = Vec::new();
        for knob in knobs.int_knobs() {
            let values = knob.candidates();
            if !values.is_empty() {
                axes.push(Axis::Int {
                    id: knob.id(),
                    values,
                });
            }
        }
        for knob in knobs.loop_knobs() {
            let values = knob.candidates();
            if !values.is_empty() {
                axes.push(Axis::Loop {
                    id: knob.id(),
                    values,
                });
            }
        }

        let cursor = vec![0; axes.len()];
        Self {
            core: TunerCore::new(knobs),
            axes,
            cursor,
            exhausted: false,
            in_flight: VecDeque::new(),
            max_in_flight: max_in_flight.max(1),
            generated: 0,
        }
    }

    /// Number of distinct configurations in the search space.
    pub fn space_size(&self) -> usize {
        self.axes
            .iter()
            .fold(1usize, |acc, axis| acc.saturating_mul(axis.len()))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn current_config(&self) -> KnobConfig {
        let mut builder = KnobConfig::builder();
        for (axis, &index) in self.axes.iter().zip(&self.cursor) {
            builder = match axis {
                Axis::Int { id, values } => builder.int(*id, values[index]),
                Axis::Loop { id, values } => builder.loop_setting(*id, values[index].clone()),
            };
        }
        builder.build()
    }

    fn advance(&mut self) {
        for (axis, index) in self.axes.iter().zip(self.cursor.iter_mut()) {
            *index += 1;
            if *index < axis.len() {
                return;
            }
            *index = 0;
        }
        self.exhausted = true;
        info!(configs = self.generated, "grid search space exhausted");
    }

    fn exploit(&self) -> Arc<KnobConfig> {
        self.best_seen()
            .map_or_else(|| Arc::new(KnobConfig::empty()), |best| best.config)
    }
}

impl<M: ?Sized> Tuner<M> for GridTuner<M> {
    fn core(&self) -> &TunerCore<M> {
        &self.core
    }

    fn next_config(&mut self) -> GenResult {
        let config = if self.exhausted {
            self.exploit()
        } else {
            let config = Arc::new(self.current_config());
            self.generated += 1;
            self.advance();
            config
        };

        let result = GenResult::new(config, Arc::new(ExecutionTime::new()));
        self.in_flight.push_back(result.clone());
        debug!(
            generated = self.generated,
            in_flight = self.in_flight.len(),
            exhausted = self.exhausted,
            "grid tuner produced configuration"
        );
        result
    }

    fn should_compile_next(&mut self) -> bool {
        !self.exhausted && self.in_flight.len() < self.max_in_flight
    }

    fn analyze(&mut self, _module: &M) {
        if let Some(result) = self.in_flight.pop_front() {
            self.add_config(result);
        }
    }
}
