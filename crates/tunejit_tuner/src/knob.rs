use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_KNOB_ID: AtomicU64 = AtomicU64::new(1);

/// Most candidates a scalar knob offers an exhaustive search. Wider ranges are
/// sampled with a coarser stride.
pub const MAX_SCALAR_CANDIDATES: usize = 1024;

/// Process-unique identifier of a knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KnobId(u64);

impl KnobId {
    /// Hand out an identifier no other knob in this process has.
    pub fn fresh() -> Self {
        Self(NEXT_KNOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for KnobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of knob kinds a [`KnobSet`](crate::KnobSet) partitions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnobKind {
    ScalarInt,
    Loop,
}

impl KnobKind {
    pub fn name(self) -> &'static str {
        match self {
            KnobKind::ScalarInt => "scalar",
            KnobKind::Loop => "loop",
        }
    }
}

impl fmt::Display for KnobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Loop transformation hints carried by a loop knob.
///
/// `None` leaves the decision to the backend's own heuristics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopSetting {
    pub unroll_count: Option<u32>,
    pub vectorize_width: Option<u32>,
    pub interleave_count: Option<u32>,
    pub disable_unroll: bool,
    pub disable_vectorize: bool,
}

impl LoopSetting {
    pub fn unrolled(count: u32) -> Self {
        Self {
            unroll_count: Some(count),
            ..Self::default()
        }
    }

    pub fn vectorized(width: u32) -> Self {
        Self {
            vectorize_width: Some(width),
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            disable_unroll: true,
            disable_vectorize: true,
            ..Self::default()
        }
    }
}

/// A tunable decision point that mutates a module of type `M` when applied.
///
/// Knobs are owned by exactly one [`KnobSet`](crate::KnobSet). Setting a value
/// never touches the module; only [`Knob::apply`] does.
pub trait Knob<M: ?Sized>: Send {
    type Value: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;

    fn id(&self) -> KnobId;

    fn name(&self) -> &str;

    fn value(&self) -> Self::Value;

    fn set_value(&mut self, value: Self::Value);

    /// Every value an exhaustive search should try for this knob.
    fn candidates(&self) -> Vec<Self::Value>;

    fn apply(&self, module: &mut M);
}

type ScalarApplier<M> = Box<dyn Fn(&mut M, i64) + Send + Sync>;
type LoopApplier<M> = Box<dyn Fn(&mut M, &LoopSetting) + Send + Sync>;

/// Integer knob over an inclusive range, applied through a closure.
pub struct ScalarKnob<M: ?Sized> {
    id: KnobId,
    name: String,
    value: i64,
    min: i64,
    max: i64,
    step: i64,
    applier: ScalarApplier<M>,
}

impl<M: ?Sized> ScalarKnob<M> {
    pub fn new<F>(name: impl Into<String>, default: i64, min: i64, max: i64, applier: F) -> Self
    where
        F: Fn(&mut M, i64) + Send + Sync + 'static,
    {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            id: KnobId::fresh(),
            name: name.into(),
            value: default.clamp(min, max),
            min,
            max,
            step: 1,
            applier: Box::new(applier),
        }
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.step = step.max(1);
        self
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }
}

impl<M: ?Sized> Knob<M> for ScalarKnob<M> {
    type Value = i64;

    fn id(&self) -> KnobId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> i64 {
        self.value
    }

    fn set_value(&mut self, value: i64) {
        self.value = value;
    }

    fn candidates(&self) -> Vec<i64> {
        let span = i128::from(self.max) - i128::from(self.min);
        let limit = MAX_SCALAR_CANDIDATES as i128;
        let mut stride = i128::from(self.step);
        if span / stride + 1 > limit {
            // ceil(span / (limit - 1)) fits the range into `limit` points
            stride = (span + limit - 2) / (limit - 1);
        }

        let mut values = Vec::new();
        let mut current = i128::from(self.min);
        while current <= i128::from(self.max) && values.len() < MAX_SCALAR_CANDIDATES {
            if let Ok(value) = i64::try_from(current) {
                values.push(value);
            }
            current += stride;
        }
        values
    }

    fn apply(&self, module: &mut M) {
        (self.applier)(module, self.value);
    }
}

impl<M: ?Sized> fmt::Debug for ScalarKnob<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarKnob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &self.value)
            .field("range", &(self.min..=self.max))
            .finish_non_exhaustive()
    }
}

/// Loop-transformation knob choosing among a fixed list of settings.
pub struct LoopKnob<M: ?Sized> {
    id: KnobId,
    name: String,
    value: LoopSetting,
    options: Vec<LoopSetting>,
    applier: LoopApplier<M>,
}

impl<M: ?Sized> LoopKnob<M> {
    pub fn new<F>(name: impl Into<String>, options: Vec<LoopSetting>, applier: F) -> Self
    where
        F: Fn(&mut M, &LoopSetting) + Send + Sync + 'static,
    {
        Self {
            id: KnobId::fresh(),
            name: name.into(),
            value: LoopSetting::default(),
            options,
            applier: Box::new(applier),
        }
    }
}

impl<M: ?Sized> Knob<M> for LoopKnob<M> {
    type Value = LoopSetting;

    fn id(&self) -> KnobId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> LoopSetting {
        self.value.clone()
    }

    fn set_value(&mut self, value: LoopSetting) {
        self.value = value;
    }

    fn candidates(&self) -> Vec<LoopSetting> {
        self.options.clone()
    }

    fn apply(&self, module: &mut M) {
        (self.applier)(module, &self.value);
    }
}

impl<M: ?Sized> fmt::Debug for LoopKnob<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopKnob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
