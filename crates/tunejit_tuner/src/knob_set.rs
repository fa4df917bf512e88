use std::collections::BTreeMap;
use std::fmt;

use crate::error::TunerError;
use crate::knob::{Knob, KnobId, KnobKind, LoopSetting};
use crate::knob_config::{KnobConfig, KnobValue};

pub type IntKnob<M> = Box<dyn Knob<M, Value = i64>>;
pub type LoopKnobBox<M> = Box<dyn Knob<M, Value = LoopSetting>>;

/// Registry of every knob for one tunable region, partitioned by kind.
///
/// Knob IDs and knob names are both unique across all kinds.
pub struct KnobSet<M: ?Sized> {
    int_knobs: BTreeMap<KnobId, IntKnob<M>>,
    loop_knobs: BTreeMap<KnobId, LoopKnobBox<M>>,
}

impl<M: ?Sized> Default for KnobSet<M> {
    fn default() -> Self {
        Self {
            int_knobs: BTreeMap::new(),
            loop_knobs: BTreeMap::new(),
        }
    }
}

impl<M: ?Sized> KnobSet<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integer knob. Returns `None` if its ID or name is already
    /// taken.
    pub fn add_int<K>(&mut self, knob: K) -> Option<KnobId>
    where
        K: Knob<M, Value = i64> + 'static,
    {
        let id = knob.id();
        if self.contains(id) || self.find(knob.name()).is_some() {
            return None;
        }
        self.int_knobs.insert(id, Box::new(knob));
        Some(id)
    }

    /// Register a loop knob. Returns `None` if its ID or name is already
    /// taken.
    pub fn add_loop<K>(&mut self, knob: K) -> Option<KnobId>
    where
        K: Knob<M, Value = LoopSetting> + 'static,
    {
        let id = knob.id();
        if self.contains(id) || self.find(knob.name()).is_some() {
            return None;
        }
        self.loop_knobs.insert(id, Box::new(knob));
        Some(id)
    }

    pub fn contains(&self, id: KnobId) -> bool {
        self.kind_of(id).is_some()
    }

    pub fn kind_of(&self, id: KnobId) -> Option<KnobKind> {
        if self.int_knobs.contains_key(&id) {
            Some(KnobKind::ScalarInt)
        } else if self.loop_knobs.contains_key(&id) {
            Some(KnobKind::Loop)
        } else {
            None
        }
    }

    pub fn name_of(&self, id: KnobId) -> Option<&str> {
        self.int_knobs
            .get(&id)
            .map(|knob| knob.name())
            .or_else(|| self.loop_knobs.get(&id).map(|knob| knob.name()))
    }

    /// ID of the knob called `name`.
    pub fn find(&self, name: &str) -> Option<KnobId> {
        self.int_knobs
            .values()
            .map(|knob| (knob.id(), knob.name()))
            .chain(self.loop_knobs.values().map(|knob| (knob.id(), knob.name())))
            .find_map(|(id, knob_name)| (knob_name == name).then_some(id))
    }

    pub fn int_value(&self, id: KnobId) -> Option<i64> {
        self.int_knobs.get(&id).map(|knob| knob.value())
    }

    pub fn loop_value(&self, id: KnobId) -> Option<LoopSetting> {
        self.loop_knobs.get(&id).map(|knob| knob.value())
    }

    pub fn int_knobs(&self) -> impl Iterator<Item = &IntKnob<M>> {
        self.int_knobs.values()
    }

    pub fn loop_knobs(&self) -> impl Iterator<Item = &LoopKnobBox<M>> {
        self.loop_knobs.values()
    }

    pub fn len(&self) -> usize {
        self.int_knobs.len() + self.loop_knobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.int_knobs.is_empty() && self.loop_knobs.is_empty()
    }

    /// Check that every ID in `config` names a knob of the matching kind.
    pub fn validate(&self, config: &KnobConfig) -> Result<(), TunerError> {
        if let Some((id, _)) = config
            .int_values()
            .find(|(id, _)| !self.int_knobs.contains_key(id))
        {
            return Err(TunerError::UnknownKnob {
                id,
                kind: KnobKind::ScalarInt,
            });
        }
        if let Some((id, _)) = config
            .loop_values()
            .find(|(id, _)| !self.loop_knobs.contains_key(id))
        {
            return Err(TunerError::UnknownKnob {
                id,
                kind: KnobKind::Loop,
            });
        }
        Ok(())
    }

    /// `config` keyed by knob name instead of knob ID.
    ///
    /// Names survive across processes where IDs do not, so this is the form
    /// to persist.
    pub fn named_values(
        &self,
        config: &KnobConfig,
    ) -> Result<BTreeMap<String, KnobValue>, TunerError> {
        self.validate(config)?;

        let mut named = BTreeMap::new();
        for (id, value) in config.int_values() {
            if let Some(name) = self.name_of(id) {
                named.insert(name.to_string(), KnobValue::Int(value));
            }
        }
        for (id, value) in config.loop_values() {
            if let Some(name) = self.name_of(id) {
                named.insert(name.to_string(), KnobValue::Loop(value.clone()));
            }
        }
        Ok(named)
    }

    /// Overwrite the stored value of every knob `config` names.
    ///
    /// The config is validated first, so on error no knob has changed.
    pub fn assign(&mut self, config: &KnobConfig) -> Result<(), TunerError> {
        self.validate(config)?;

        for (id, value) in config.int_values() {
            if let Some(knob) = self.int_knobs.get_mut(&id) {
                knob.set_value(value);
            }
        }
        for (id, value) in config.loop_values() {
            if let Some(knob) = self.loop_knobs.get_mut(&id) {
                knob.set_value(value.clone());
            }
        }
        Ok(())
    }

    /// Let every knob, touched or not, apply its current value to `module`.
    pub fn apply_all(&self, module: &mut M) {
        for knob in self.int_knobs.values() {
            knob.apply(module);
        }
        for knob in self.loop_knobs.values() {
            knob.apply(module);
        }
    }
}

impl<M: ?Sized> fmt::Debug for KnobSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for knob in self.int_knobs.values() {
            map.entry(&knob.name(), &knob.value());
        }
        for knob in self.loop_knobs.values() {
            map.entry(&knob.name(), &knob.value());
        }
        map.finish()
    }
}
