use std::ffi::CString;
use std::fmt;
use std::fs::OpenOptions;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};
use tunejit_config::CompileOptions;
use tunejit_symbol::{GlobalMapping, SymbolTracker};

use crate::engine::{NativeEngine, native_target};
use crate::error::JitError;
use crate::module::IrModule;

/// A native function compiled from an [`IrModule`].
///
/// Owns both the execution engine and the module it was built from; the
/// machine code stays valid for as long as this value lives. Two compiled
/// functions are equal only if they are the same artifact.
pub struct CompiledFunction {
    address: usize,
    entry: String,
    // dropped before `module`: the engine frees the LLVM module, the module
    // wrapper frees the context
    _engine: NativeEngine,
    module: IrModule,
}

impl CompiledFunction {
    /// Compile `module` and resolve `entry` to a callable address.
    ///
    /// Every global in `globals` that the module references is bound to its
    /// address before code is emitted; names the module does not mention are
    /// skipped.
    ///
    /// # Panics
    ///
    /// If the engine resolves `entry` to a null address.
    pub fn compile(
        entry: &str,
        globals: Option<&[GlobalMapping]>,
        mut module: IrModule,
        options: CompileOptions,
    ) -> Result<Self, JitError> {
        native_target().map_err(|message| JitError::EngineCreation {
            symbol: entry.to_string(),
            message,
        })?;
        let entry_symbol =
            CString::new(entry).map_err(|_| JitError::InvalidEntrySymbol(entry.to_string()))?;
        if !module.defines_function(entry) {
            return Err(JitError::UnknownEntry(entry.to_string()));
        }
        module.verify()?;
        module.target_host();
        if options.ipra {
            debug!(entry, "interprocedural register allocation is not available through MCJIT");
        }

        let raw = module.release_to_engine();
        // SAFETY: the module is valid and is owned by the engine from here on.
        let engine = unsafe { NativeEngine::create(raw, &options) }.map_err(|message| {
            JitError::EngineCreation {
                symbol: entry.to_string(),
                message,
            }
        })?;

        for mapping in globals.unwrap_or_default() {
            match module.global_value(&mapping.name) {
                // SAFETY: the value comes from the module the engine owns.
                Some(value) => unsafe { engine.add_global_mapping(value, mapping.address) },
                None => debug!(entry, global = %mapping, "module does not reference global"),
            }
        }

        let address = engine.function_address(&entry_symbol);
        assert_ne!(address, 0, "entry `{entry}` resolved to a null address");
        debug!(
            entry,
            address,
            opt_level = options.opt_level.name(),
            fast_isel = options.fast_isel,
            "compiled function"
        );

        Ok(Self {
            address: address as usize,
            entry: entry.to_string(),
            _engine: engine,
            module,
        })
    }

    /// The module as bitcode. Carries no machine code, no address, and no
    /// global bindings.
    pub fn serialize(&self) -> Vec<u8> {
        self.module.to_bitcode()
    }

    /// Rebuild a compiled function from [`CompiledFunction::serialize`] output.
    ///
    /// The entry name is read back from the module and its globals are looked
    /// up in `tracker`. Returns `Ok(None)` if `bytes` do not decode to a valid
    /// module with an entry function; the result is a new artifact that never
    /// compares equal to the one that was serialized.
    pub fn deserialize(bytes: &[u8], tracker: &SymbolTracker) -> Result<Option<Self>, JitError> {
        let Some(module) = IrModule::from_bitcode(bytes) else {
            warn!(len = bytes.len(), "bytes do not hold a valid module");
            return Ok(None);
        };
        let Some(entry) = module.entry_function_name() else {
            warn!(module = %module.name(), "deserialized module has no entry function");
            return Ok(None);
        };

        let globals = tracker.globals_for(&entry);
        Self::compile(&entry, globals.as_deref(), module, CompileOptions::default()).map(Some)
    }

    /// Write the module as textual IR. An empty path is a no-op.
    pub fn write_to_file(&self, path: &Path, append: bool) -> Result<(), JitError> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|source| JitError::CouldNotOpenFile {
                path: path.to_path_buf(),
                source,
            })?;
        file.write_all(self.module.print_to_string().as_bytes())
            .map_err(|source| JitError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(entry = %self.entry, path = %path.display(), append, "wrote module IR");
        Ok(())
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn module(&self) -> &IrModule {
        &self.module
    }

    /// Reinterpret the entry address as a function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the entry's signature,
    /// and the pointer must not be called after `self` is dropped.
    pub unsafe fn as_fn<F: Copy>(&self) -> F {
        assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<usize>(),
            "F must be a function pointer"
        );
        // SAFETY: upheld by the caller.
        unsafe { std::mem::transmute_copy(&self.address) }
    }
}

impl PartialEq for CompiledFunction {
    fn eq(&self, other: &Self) -> bool {
        self.module.raw() == other.module.raw()
    }
}

impl Eq for CompiledFunction {}

impl Hash for CompiledFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module.raw().hash(state);
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("entry", &self.entry)
            .field("address", &format_args!("{:#x}", self.address))
            .finish_non_exhaustive()
    }
}
