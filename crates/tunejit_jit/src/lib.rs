//! Compiled-artifact lifecycle: build native code from an LLVM module, ship it
//! around as bitcode, and rebuild it, re-linked against process symbols.

pub mod cache;
mod engine;
pub mod error;
pub mod function;
pub mod knobs;
pub mod module;

pub use cache::{BitcodeCache, CacheMetadata, CacheStats, SpecializationKey};
pub use error::JitError;
pub use function::CompiledFunction;
pub use knobs::AttributeKnob;
pub use module::{ENTRY_METADATA, IrModule};
