//! Adaptive autotuning JIT: tunable knobs over LLVM modules, native
//! compilation, and feedback-directed search over knob configurations.

pub mod cli;
pub mod session;

pub use session::{SessionSummary, TuningSession};
pub use tunejit_config as config;
pub use tunejit_jit as jit;
pub use tunejit_symbol as symbol;
pub use tunejit_tuner as tuner;
pub use tunejit_utils as utils;
