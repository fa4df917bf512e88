//! Feedback-directed tuning of knobs over an intermediate-representation module.
//!
//! A [`Tuner`] hands out candidate [`KnobConfig`]s, the caller writes them into
//! the module through [`Tuner::apply_config`], compiles and measures the result,
//! and the outcome is folded back into the tuner's [`History`].
//!
//! Everything here is generic over the module type `M`, so the crate does not
//! link against any particular backend.

pub mod apply;
pub mod error;
pub mod feedback;
pub mod grid;
pub mod history;
pub mod knob;
pub mod knob_config;
pub mod knob_set;
pub mod noop;
pub mod report;
pub mod tuner;

pub use apply::apply_config;
pub use error::TunerError;
pub use feedback::{ExecutionTime, Feedback, NoOpFeedback};
pub use grid::GridTuner;
pub use history::{GenResult, History, sort_best_first};
pub use knob::{
    Knob, KnobId, KnobKind, LoopKnob, LoopSetting, MAX_SCALAR_CANDIDATES, ScalarKnob,
};
pub use knob_config::{KnobConfig, KnobConfigBuilder, KnobValue};
pub use knob_set::KnobSet;
pub use noop::NoOpTuner;
pub use tuner::{Tuner, TunerCore};
