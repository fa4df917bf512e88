//! CLI wiring for the `tunejit` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tunejit_config::{CodegenOptLevel, CompileOptions, TunerConfig};
use tunejit_jit::{AttributeKnob, BitcodeCache, CompiledFunction, IrModule};
use tunejit_symbol::SymbolTracker;
use tunejit_tuner::KnobSet;
use tunejit_utils::logger::init_logging;

use crate::session::TuningSession;

type EntryFn = extern "C" fn() -> i64;

#[derive(Parser, Debug)]
#[command(name = "tunejit", version, about = "Adaptive autotuning JIT for LLVM modules")]
pub struct Cli {
    /// Codegen optimization level (0-3 or none/less/default/aggressive)
    #[arg(long, default_value = "aggressive")]
    pub opt_level: CodegenOptLevel,

    /// Use the fast instruction selector
    #[arg(long, default_value_t = false)]
    pub fast_isel: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile textual IR and write it out as bitcode.
    Compile {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Entry function; defaults to the only defined function
        #[arg(long)]
        entry: Option<String>,
    },
    /// Compile a module and call its zero-argument `i64` entry function.
    Run {
        input: PathBuf,
        #[arg(long)]
        entry: Option<String>,
    },
    /// Rebuild a bitcode file and write its textual IR.
    Dump {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = false)]
        append: bool,
    },
    /// Grid-tune function attributes on a zero-argument `i64` entry function.
    Tune {
        input: PathBuf,
        #[arg(long)]
        entry: Option<String>,
        /// Attributes to toggle
        #[arg(long, value_delimiter = ',', default_value = "optsize,minsize,noinline")]
        attributes: Vec<String>,
        #[arg(long)]
        iterations: Option<usize>,
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        max_in_flight: Option<usize>,
        /// Write the best-first JSON report here
        #[arg(long)]
        stats: Option<PathBuf>,
        /// Append every compiled version's IR here
        #[arg(long)]
        dump_ir: Option<PathBuf>,
        /// Keep every measured version's bitcode in this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Compile once without tuning
        #[arg(long, default_value_t = false)]
        no_tune: bool,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    init_logging();

    let Cli {
        opt_level,
        fast_isel,
        command,
    } = cli;
    let options = CompileOptions {
        opt_level,
        fast_isel,
        ..CompileOptions::default()
    };

    match command {
        Command::Compile {
            input,
            output,
            entry,
        } => {
            let (module, entry) = load_module(&input, entry.as_deref())?;
            let function = CompiledFunction::compile(&entry, None, module, options)?;
            fs::write(&output, function.serialize())
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(entry = %entry, output = %output.display(), "wrote bitcode");
        }
        Command::Run { input, entry } => {
            let (module, entry) = load_module(&input, entry.as_deref())?;
            let function = CompiledFunction::compile(&entry, None, module, options)?;
            // SAFETY: the entry is documented to take no arguments and return i64.
            let call: EntryFn = unsafe { function.as_fn() };
            println!("{}", call());
        }
        Command::Dump {
            input,
            output,
            append,
        } => {
            let bytes =
                fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
            let function = CompiledFunction::deserialize(&bytes, &SymbolTracker::new())?
                .ok_or_else(|| anyhow!("{} is not a loadable module", input.display()))?;
            function.write_to_file(&output, append)?;
        }
        Command::Tune {
            input,
            entry,
            attributes,
            iterations,
            samples,
            max_in_flight,
            stats,
            dump_ir,
            cache_dir,
            no_tune,
        } => {
            let mut config = TunerConfig::from_env();
            if let Some(iterations) = iterations {
                config.iterations = iterations;
            }
            if let Some(samples) = samples {
                config.samples = samples.max(1);
            }
            if let Some(max_in_flight) = max_in_flight {
                config.max_in_flight = max_in_flight.max(1);
            }
            if stats.is_some() {
                config.stats_path = stats;
            }
            if dump_ir.is_some() {
                config.dump_path = dump_ir;
            }
            if no_tune {
                config.enabled = false;
            }

            let (module, entry) = load_module(&input, entry.as_deref())?;
            let knobs = attribute_knobs(&attributes)?;
            let tracker = SymbolTracker::new();
            let mut session = TuningSession::new(module, &entry, knobs, config, options, &tracker)?;
            if let Some(dir) = cache_dir {
                session = session.with_cache(Arc::new(BitcodeCache::with_directory(dir)?));
            }

            let summary = session.run(|function| {
                // SAFETY: as for `run`.
                let call: EntryFn = unsafe { function.as_fn() };
                std::hint::black_box(call());
                Ok(())
            })?;
            session.finish();

            let best = session.compile_best()?;
            // SAFETY: as for `run`.
            let call: EntryFn = unsafe { best.as_fn() };
            info!(
                tried = summary.tried,
                best_mean = summary.best_mean(),
                result = call(),
                "tuning complete"
            );
        }
    }

    Ok(())
}

/// Read textual IR or bitcode (by `.bc` extension) and settle on an entry.
fn load_module(path: &Path, entry: Option<&str>) -> Result<(IrModule, String)> {
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("module");
    let mut module = if path.extension().is_some_and(|ext| ext == "bc") {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        IrModule::from_bitcode(&bytes)
            .ok_or_else(|| anyhow!("{} is not valid bitcode", path.display()))?
    } else {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        IrModule::from_ir(name, &text)?
    };

    let entry = match entry {
        Some(entry) => entry.to_string(),
        None => module.entry_function_name().ok_or_else(|| {
            anyhow!(
                "{} defines several functions; pass --entry",
                path.display()
            )
        })?,
    };
    module.set_entry(&entry)?;
    Ok((module, entry))
}

fn attribute_knobs(attributes: &[String]) -> Result<KnobSet<IrModule>> {
    let mut knobs = KnobSet::new();
    for attribute in attributes {
        let Some(knob) = AttributeKnob::new(attribute) else {
            bail!("unknown function attribute `{attribute}`");
        };
        if knobs.add_int(knob).is_none() {
            bail!("function attribute `{attribute}` listed twice");
        }
    }
    Ok(knobs)
}
