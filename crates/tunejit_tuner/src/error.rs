use thiserror::Error;

use crate::knob::{KnobId, KnobKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TunerError {
    /// A configuration names a knob the knob set does not own. This is an
    /// integration error: configs must only be applied to the set they were
    /// generated for.
    #[error("configuration references unknown {kind} knob {id}")]
    UnknownKnob { id: KnobId, kind: KnobKind },
}
