use std::fmt;

use inkwell::attributes::{Attribute, AttributeLoc};
use tunejit_tuner::{Knob, KnobId};

use crate::module::IrModule;

/// Toggles an enum function attribute (`optsize`, `minsize`, `noinline`, ...)
/// on every function the module defines. 0 clears it, anything else sets it.
pub struct AttributeKnob {
    id: KnobId,
    attribute: String,
    kind_id: u32,
    value: i64,
}

impl AttributeKnob {
    /// `None` if LLVM knows no enum attribute called `attribute`.
    pub fn new(attribute: &str) -> Option<Self> {
        let kind_id = Attribute::get_named_enum_kind_id(attribute);
        if kind_id == 0 {
            return None;
        }
        Some(Self {
            id: KnobId::fresh(),
            attribute: attribute.to_string(),
            kind_id,
            value: 0,
        })
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl Knob<IrModule> for AttributeKnob {
    type Value = i64;

    fn id(&self) -> KnobId {
        self.id
    }

    fn name(&self) -> &str {
        &self.attribute
    }

    fn value(&self) -> i64 {
        self.value
    }

    fn set_value(&mut self, value: i64) {
        self.value = value.clamp(0, 1);
    }

    fn candidates(&self) -> Vec<i64> {
        vec![0, 1]
    }

    fn apply(&self, module: &mut IrModule) {
        let enabled = self.value != 0;
        module.with_module(|context, module| {
            for function in module.get_functions() {
                if function.count_basic_blocks() == 0 {
                    continue;
                }
                if enabled {
                    function.add_attribute(
                        AttributeLoc::Function,
                        context.create_enum_attribute(self.kind_id, 0),
                    );
                } else {
                    function.remove_enum_attribute(AttributeLoc::Function, self.kind_id);
                }
            }
        });
    }
}

impl fmt::Debug for AttributeKnob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeKnob")
            .field("id", &self.id)
            .field("attribute", &self.attribute)
            .field("value", &self.value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunejit_tuner::{KnobConfig, KnobSet, apply_config};

    const KERNEL: &str = r"
define i64 @kernel(i64 %x) {
entry:
  %y = add i64 %x, 1
  ret i64 %y
}
";

    fn has_attribute(module: &IrModule, kind_id: u32) -> bool {
        module.with_module(|_, module| {
            module
                .get_function("kernel")
                .and_then(|f| f.get_enum_attribute(AttributeLoc::Function, kind_id))
                .is_some()
        })
    }

    #[test]
    fn test_unknown_attribute() {
        assert!(AttributeKnob::new("not-an-attribute").is_none());
    }

    #[test]
    fn test_toggle_through_config() {
        let knob = AttributeKnob::new("optsize").unwrap();
        let kind_id = knob.kind_id;
        let mut knobs = KnobSet::new();
        let id = knobs.add_int(knob).unwrap();
        let mut module = IrModule::from_ir("kernel", KERNEL).unwrap();

        let on = KnobConfig::builder().int(id, 1).build();
        apply_config(&mut knobs, &on, &mut module).unwrap();
        assert!(has_attribute(&module, kind_id));
        assert!(module.print_to_string().contains("optsize"));

        let off = KnobConfig::builder().int(id, 0).build();
        apply_config(&mut knobs, &off, &mut module).unwrap();
        assert!(!has_attribute(&module, kind_id));
    }

    #[test]
    fn test_values_clamp_to_switch() {
        let mut knob = AttributeKnob::new("noinline").unwrap();
        knob.set_value(7);
        assert_eq!(knob.value(), 1);
        knob.set_value(-3);
        assert_eq!(knob.value(), 0);
    }
}
