use tracing::debug;

use crate::error::TunerError;
use crate::knob_config::KnobConfig;
use crate::knob_set::KnobSet;

/// Write `config` into `knobs`, then let every knob mutate `module`.
///
/// The module is only touched after the whole config has been written, so
/// knobs that consult each other always see a settled configuration. Knobs
/// the config does not mention still apply their current value.
pub fn apply_config<M: ?Sized>(
    knobs: &mut KnobSet<M>,
    config: &KnobConfig,
    module: &mut M,
) -> Result<(), TunerError> {
    knobs.assign(config)?;
    knobs.apply_all(module);
    debug!(
        assigned = config.len(),
        knobs = knobs.len(),
        "applied knob configuration"
    );
    Ok(())
}
