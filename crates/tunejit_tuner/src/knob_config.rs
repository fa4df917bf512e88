use ahash::AHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::knob::{KnobId, LoopSetting};
use crate::knob_set::KnobSet;

/// A knob value detached from its knob, as stored in persistent keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnobValue {
    Int(i64),
    Loop(LoopSetting),
}

/// One point in the search space: a value for some subset of a knob set's knobs.
///
/// A config never touches a knob directly and cannot be changed once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnobConfig {
    ints: BTreeMap<KnobId, i64>,
    loops: BTreeMap<KnobId, LoopSetting>,
}

impl KnobConfig {
    /// The config that assigns nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> KnobConfigBuilder {
        KnobConfigBuilder::default()
    }

    /// Snapshot the current value of every knob in `knobs`.
    pub fn from_knob_set<M: ?Sized>(knobs: &KnobSet<M>) -> Self {
        let mut builder = Self::builder();
        for knob in knobs.int_knobs() {
            builder = builder.int(knob.id(), knob.value());
        }
        for knob in knobs.loop_knobs() {
            builder = builder.loop_setting(knob.id(), knob.value());
        }
        builder.build()
    }

    pub fn int(&self, id: KnobId) -> Option<i64> {
        self.ints.get(&id).copied()
    }

    pub fn loop_setting(&self, id: KnobId) -> Option<&LoopSetting> {
        self.loops.get(&id)
    }

    pub fn int_values(&self) -> impl Iterator<Item = (KnobId, i64)> + '_ {
        self.ints.iter().map(|(id, value)| (*id, *value))
    }

    pub fn loop_values(&self) -> impl Iterator<Item = (KnobId, &LoopSetting)> + '_ {
        self.loops.iter().map(|(id, value)| (*id, value))
    }

    pub fn len(&self) -> usize {
        self.ints.len() + self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.loops.is_empty()
    }

    /// Hash of the assignment. Knob IDs are process-local, so this only
    /// identifies a config within one process; see
    /// [`KnobSet::named_values`] for a form that can be stored.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.ints.hash(&mut hasher);
        self.loops.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Default)]
pub struct KnobConfigBuilder {
    ints: BTreeMap<KnobId, i64>,
    loops: BTreeMap<KnobId, LoopSetting>,
}

impl KnobConfigBuilder {
    pub fn int(mut self, id: KnobId, value: i64) -> Self {
        self.ints.insert(id, value);
        self
    }

    pub fn loop_setting(mut self, id: KnobId, value: LoopSetting) -> Self {
        self.loops.insert(id, value);
        self
    }

    pub fn build(self) -> KnobConfig {
        KnobConfig {
            ints: self.ints,
            loops: self.loops,
        }
    }
}
