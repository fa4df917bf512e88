//! Tuning session coordinator.
//!
//! One thread owns the tuner and drives it: it asks for configurations while
//! the tuner allows speculation, applies each one to a private copy of the base
//! module, then compiles and measures the whole batch in parallel. Outcomes are
//! handed back to the tuner in the order the configurations were produced.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tunejit_config::{CompileOptions, TunerConfig, TunerKind};
use tunejit_jit::{BitcodeCache, CompiledFunction, IrModule, SpecializationKey};
use tunejit_symbol::{GlobalMapping, SymbolTracker};
use tunejit_tuner::{ExecutionTime, GenResult, GridTuner, KnobConfig, KnobSet, NoOpTuner, Tuner};
use tunejit_utils::timer::Stopwatch;

struct Candidate {
    result: GenResult,
    module: IrModule,
}

/// Everything a worker needs to build and time one candidate.
#[derive(Clone, Copy)]
struct BuildPlan<'a> {
    entry: &'a str,
    globals: Option<&'a [GlobalMapping]>,
    options: CompileOptions,
    samples: usize,
}

/// What a finished run explored.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub tried: usize,
    pub best: Option<GenResult>,
}

impl SessionSummary {
    /// Mean running time of the best configuration, in seconds.
    pub fn best_mean(&self) -> Option<f64> {
        self.best.as_ref().and_then(|best| {
            best.feedback
                .as_any()
                .downcast_ref::<ExecutionTime>()
                .and_then(ExecutionTime::mean)
        })
    }
}

pub struct TuningSession {
    tuner: Box<dyn Tuner<IrModule>>,
    base: IrModule,
    entry: String,
    globals: Option<Arc<[GlobalMapping]>>,
    options: CompileOptions,
    config: TunerConfig,
    cache: Option<Arc<BitcodeCache>>,
}

impl TuningSession {
    /// Set up a session tuning `knobs` over `base`.
    ///
    /// `entry` must be defined by `base`; its globals are taken from `tracker`.
    pub fn new(
        mut base: IrModule,
        entry: &str,
        knobs: KnobSet<IrModule>,
        config: TunerConfig,
        options: CompileOptions,
        tracker: &SymbolTracker,
    ) -> Result<Self> {
        base.set_entry(entry)
            .with_context(|| format!("module `{}` cannot be tuned", base.name()))?;

        let tuner: Box<dyn Tuner<IrModule>> = match config.tuner_kind() {
            TunerKind::NoOp => Box::new(NoOpTuner::new(knobs)),
            TunerKind::Grid => Box::new(GridTuner::new(knobs, config.max_in_flight)),
        };
        info!(
            entry,
            tuner = ?config.tuner_kind(),
            max_in_flight = config.max_in_flight,
            iterations = config.iterations,
            "tuning session created"
        );

        Ok(Self {
            tuner,
            base,
            entry: entry.to_string(),
            globals: tracker.globals_for(entry),
            options,
            config,
            cache: None,
        })
    }

    /// Keep the bitcode of every measured version in `cache`, and rebuild the
    /// best version from it in [`TuningSession::compile_best`].
    pub fn with_cache(mut self, cache: Arc<BitcodeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn tuner(&self) -> &dyn Tuner<IrModule> {
        self.tuner.as_ref()
    }

    /// Explore configurations until the budget runs out or the tuner has
    /// nothing new to try. `measure` runs the compiled function once; it is
    /// timed `samples` times per configuration.
    pub fn run<F>(&mut self, measure: F) -> Result<SessionSummary>
    where
        F: Fn(&CompiledFunction) -> Result<()> + Sync,
    {
        let mut tried = 0;
        while tried < self.config.iterations {
            let batch = self.next_batch(self.config.iterations - tried)?;
            tried += batch.len();

            let plan = self.plan();
            let compiled = batch
                .into_par_iter()
                .map(|candidate| compile_and_measure(plan, candidate, &measure))
                .collect::<Result<Vec<_>>>()?;

            for (result, function) in compiled {
                self.dump_module(&function);
                self.cache_version(&result.config, &function);
                debug!(
                    config = result.config.content_hash(),
                    feedback = %result.feedback.report(),
                    "measured configuration"
                );
                self.tuner.analyze(function.module());
            }

            if !self.tuner.should_compile_next() {
                break;
            }
        }

        let best = self.tuner.best_seen();
        info!(tried, found_best = best.is_some(), "tuning session finished");
        Ok(SessionSummary { tried, best })
    }

    /// Compile the best configuration seen so far, or the untouched base
    /// module if nothing has been measured. With a cache attached, a stored
    /// version is rebuilt from its bitcode instead.
    pub fn compile_best(&self) -> Result<CompiledFunction> {
        let config = self
            .tuner
            .best_seen()
            .map_or_else(|| Arc::new(KnobConfig::empty()), |best| best.config);

        let module = match self.cached_module(&config)? {
            Some(module) => module,
            None => {
                let mut module = self.base.duplicate()?;
                self.tuner.apply_config(&config, &mut module)?;
                module
            }
        };
        CompiledFunction::compile(&self.entry, self.globals.as_deref(), module, self.options)
            .with_context(|| format!("failed to compile best version of `{}`", self.entry))
    }

    /// Write the best-first statistics report and print the best config.
    /// Failures are logged, never fatal. With tuning disabled nothing is
    /// written at all.
    pub fn finish(&self) {
        if self.config.tuner_kind() == TunerKind::NoOp {
            return;
        }
        if let Some(path) = &self.config.stats_path {
            let written = File::create(path).and_then(|file| {
                let mut out = BufWriter::new(file);
                self.tuner.dump_stats(&mut out)?;
                out.flush()
            });
            match written {
                Ok(()) => info!(path = %path.display(), "wrote tuning statistics"),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not write tuning statistics");
                }
            }
        }

        if let Err(err) = self.tuner.dump(&mut io::stderr().lock()) {
            warn!(error = %err, "could not print best configuration");
        }
    }

    fn next_batch(&mut self, budget: usize) -> Result<Vec<Candidate>> {
        let mut batch = Vec::new();
        while batch.len() < budget && (batch.is_empty() || self.tuner.should_compile_next()) {
            let result = self.tuner.next_config();
            let mut module = self.base.duplicate()?;
            self.tuner.apply_config(&result.config, &mut module)?;
            batch.push(Candidate { result, module });
        }
        Ok(batch)
    }

    fn plan(&self) -> BuildPlan<'_> {
        BuildPlan {
            entry: &self.entry,
            globals: self.globals.as_deref(),
            options: self.options,
            samples: self.config.samples,
        }
    }

    fn cache_key(&self, config: &KnobConfig) -> Result<SpecializationKey> {
        let key = self.tuner.core().with_knobs(|knobs| {
            SpecializationKey::new(self.entry.as_str(), knobs, config, self.options)
        })?;
        Ok(key)
    }

    fn cache_version(&self, config: &KnobConfig, function: &CompiledFunction) {
        let Some(cache) = &self.cache else {
            return;
        };
        let stored = self
            .cache_key(config)
            .and_then(|key| Ok(cache.store(key, function)?));
        if let Err(err) = stored {
            warn!(error = %err, "could not cache compiled version");
        }
    }

    fn cached_module(&self, config: &KnobConfig) -> Result<Option<IrModule>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let key = self.cache_key(config)?;
        let Some(bytes) = cache.fetch(&key)? else {
            return Ok(None);
        };
        let module = IrModule::from_bitcode(&bytes);
        if module.is_none() {
            warn!(entry = %self.entry, "cached best version is not valid bitcode");
        } else {
            debug!(entry = %self.entry, key = %key.digest(), "rebuilding best version from cache");
        }
        Ok(module)
    }

    fn dump_module(&self, function: &CompiledFunction) {
        let Some(path) = &self.config.dump_path else {
            return;
        };
        if let Err(err) = function.write_to_file(path, true) {
            warn!(error = %err, "could not dump module");
        }
    }
}

fn compile_and_measure<F>(
    plan: BuildPlan<'_>,
    candidate: Candidate,
    measure: &F,
) -> Result<(GenResult, CompiledFunction)>
where
    F: Fn(&CompiledFunction) -> Result<()> + Sync,
{
    let Candidate { result, module } = candidate;
    let function = CompiledFunction::compile(plan.entry, plan.globals, module, plan.options)
        .with_context(|| format!("failed to compile `{}`", plan.entry))?;

    for _ in 0..plan.samples {
        let (outcome, elapsed) = Stopwatch::time(|| measure(&function));
        outcome.with_context(|| format!("measuring `{}` failed", plan.entry))?;
        result.feedback.record_sample(elapsed);
    }
    Ok((result, function))
}
