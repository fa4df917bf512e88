use std::convert::Infallible;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use inkwell::attributes::AttributeLoc;
use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use inkwell::targets::TargetMachine;
use inkwell::values::{AsValueRef, BasicMetadataValueEnum, FunctionValue};
use llvm_sys::prelude::{LLVMModuleRef, LLVMValueRef};

use crate::error::JitError;

/// Named metadata recording which function a module is built around.
pub const ENTRY_METADATA: &str = "tunejit.entry";

/// An LLVM module together with the context that owns it.
///
/// Every module lives in its own context, so separate modules can be built,
/// tuned and compiled on separate threads. Once a module is handed to an
/// execution engine the engine frees it; the context is always freed here,
/// after the module.
pub struct IrModule {
    module: ManuallyDrop<Module<'static>>,
    context: NonNull<Context>,
    owned_by_engine: bool,
}

// SAFETY: the context is private to this value and every module created in it
// is owned by this value, so nothing else can reach LLVM state tied to it.
unsafe impl Send for IrModule {}

impl IrModule {
    fn build<F, E>(build: F) -> Result<Self, E>
    where
        F: for<'ctx> FnOnce(&'ctx Context) -> Result<Module<'ctx>, E>,
    {
        let context = NonNull::from(Box::leak(Box::new(Context::create())));
        // SAFETY: the context stays allocated until `Drop` runs, which disposes
        // the module before freeing it.
        let context_ref: &'static Context = unsafe { context.as_ref() };
        match build(context_ref) {
            Ok(module) => Ok(Self {
                module: ManuallyDrop::new(module),
                context,
                owned_by_engine: false,
            }),
            Err(err) => {
                // SAFETY: nothing borrowed from the context survived `build`.
                drop(unsafe { Box::from_raw(context.as_ptr()) });
                Err(err)
            }
        }
    }

    /// A module with nothing in it.
    pub fn empty(name: &str) -> Self {
        match Self::build(|context| Ok::<_, Infallible>(context.create_module(name))) {
            Ok(module) => module,
            Err(never) => match never {},
        }
    }

    /// Parse textual LLVM IR.
    pub fn from_ir(name: &str, text: &str) -> Result<Self, JitError> {
        Self::build(|context| {
            let buffer = MemoryBuffer::create_from_memory_range_copy(text.as_bytes(), name);
            context
                .create_module_from_ir(buffer)
                .map_err(|err| JitError::InvalidIr(err.to_string()))
        })
    }

    /// Decode bitcode. `None` if `bytes` do not hold a well-formed module.
    pub fn from_bitcode(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let module = Self::build(|context| {
            let buffer = MemoryBuffer::create_from_memory_range_copy(bytes, "bitcode");
            Module::parse_bitcode_from_buffer(&buffer, context).map_err(|_| ())
        })
        .ok()?;
        module.verify().is_ok().then_some(module)
    }

    /// An independent copy living in a fresh context.
    pub fn duplicate(&self) -> Result<Self, JitError> {
        Self::from_bitcode(&self.to_bitcode()).ok_or_else(|| {
            JitError::InvalidModule(format!("module `{}` does not survive a copy", self.name()))
        })
    }

    /// Run `f` against the module and its context.
    ///
    /// The context lifetime is left generic so that no LLVM handle can
    /// outlive `self`.
    pub fn with_module<R>(&self, f: impl for<'ctx> FnOnce(&'ctx Context, &Module<'ctx>) -> R) -> R {
        // SAFETY: see `build`.
        let context: &'static Context = unsafe { self.context.as_ref() };
        f(context, &self.module)
    }

    pub fn name(&self) -> String {
        self.module.get_name().to_string_lossy().into_owned()
    }

    pub fn to_bitcode(&self) -> Vec<u8> {
        self.module.write_bitcode_to_memory().as_slice().to_vec()
    }

    pub fn print_to_string(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn verify(&self) -> Result<(), JitError> {
        self.module
            .verify()
            .map_err(|err| JitError::InvalidModule(err.to_string()))
    }

    /// Whether the module holds a body for `name`.
    pub fn defines_function(&self, name: &str) -> bool {
        self.module
            .get_function(name)
            .is_some_and(is_defined)
    }

    pub fn defined_functions(&self) -> Vec<String> {
        self.module
            .get_functions()
            .filter(|function| is_defined(*function))
            .filter_map(|function| function.get_name().to_str().ok().map(str::to_string))
            .collect()
    }

    /// Mark `name` as the entry function, so it can be found again after a
    /// bitcode round trip. Marking the same function again is a no-op; a
    /// module keeps its first entry.
    pub fn set_entry(&mut self, name: &str) -> Result<(), JitError> {
        if !self.defines_function(name) {
            return Err(JitError::UnknownEntry(name.to_string()));
        }
        match self.marked_entry() {
            Some(marked) if marked == name => return Ok(()),
            Some(marked) => {
                return Err(JitError::InvalidModule(format!(
                    "entry already marked as `{marked}`"
                )));
            }
            None => {}
        }
        self.with_module(|context, module| {
            let node = context.metadata_node(&[context.metadata_string(name).into()]);
            module
                .add_global_metadata(ENTRY_METADATA, &node)
                .map_err(|err| JitError::InvalidModule(err.to_string()))
        })
    }

    /// The marked entry function, or the only defined function if none is
    /// marked.
    pub fn entry_function_name(&self) -> Option<String> {
        if let Some(marked) = self.marked_entry() {
            return Some(marked);
        }

        let mut defined = self.defined_functions();
        if defined.len() == 1 {
            defined.pop()
        } else {
            None
        }
    }

    fn marked_entry(&self) -> Option<String> {
        self.module
            .get_global_metadata(ENTRY_METADATA)
            .into_iter()
            .flat_map(|node| node.get_node_values())
            .find_map(|value| match value {
                BasicMetadataValueEnum::MetadataValue(md) => md
                    .get_string_value()
                    .and_then(|name| name.to_str().ok())
                    .map(str::to_string),
                _ => None,
            })
    }

    /// Point the module at the host: default triple, plus host CPU name and
    /// features on every defined function.
    pub(crate) fn target_host(&self) {
        let cpu = TargetMachine::get_host_cpu_name().to_string();
        let features = TargetMachine::get_host_cpu_features().to_string();
        self.with_module(|context, module| {
            module.set_triple(&TargetMachine::get_default_triple());
            for function in module.get_functions().filter(|f| is_defined(*f)) {
                function.add_attribute(
                    AttributeLoc::Function,
                    context.create_string_attribute("target-cpu", &cpu),
                );
                function.add_attribute(
                    AttributeLoc::Function,
                    context.create_string_attribute("target-features", &features),
                );
            }
        });
    }

    /// Function or global variable called `name`.
    pub(crate) fn global_value(&self, name: &str) -> Option<LLVMValueRef> {
        self.module
            .get_function(name)
            .map(|function| function.as_value_ref())
            .or_else(|| self.module.get_global(name).map(|global| global.as_value_ref()))
    }

    /// Hand the module over to an execution engine. From here on the engine
    /// frees it, even if engine creation fails.
    pub(crate) fn release_to_engine(&mut self) -> LLVMModuleRef {
        self.owned_by_engine = true;
        self.module.as_mut_ptr()
    }

    pub(crate) fn raw(&self) -> usize {
        self.module.as_mut_ptr() as usize
    }
}

fn is_defined(function: FunctionValue<'_>) -> bool {
    function.count_basic_blocks() > 0
}

impl Drop for IrModule {
    fn drop(&mut self) {
        if !self.owned_by_engine {
            // SAFETY: the module is dropped exactly once, here.
            unsafe { ManuallyDrop::drop(&mut self.module) };
        }
        // SAFETY: allocated in `build` and released only here, after the
        // module.
        drop(unsafe { Box::from_raw(self.context.as_ptr()) });
    }
}

impl fmt::Debug for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrModule")
            .field("name", &self.name())
            .field("owned_by_engine", &self.owned_by_engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FUNCTIONS: &str = r"
define i64 @helper(i64 %x) {
entry:
  %y = mul i64 %x, 2
  ret i64 %y
}

define i64 @kernel(i64 %x) {
entry:
  %y = call i64 @helper(i64 %x)
  ret i64 %y
}
";

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            IrModule::from_ir("bad", "define nonsense"),
            Err(JitError::InvalidIr(_))
        ));
    }

    #[test]
    fn test_entry_marker_survives_bitcode() {
        let mut module = IrModule::from_ir("two", TWO_FUNCTIONS).unwrap();
        assert_eq!(module.entry_function_name(), None);
        module.set_entry("kernel").unwrap();

        module.set_entry("kernel").unwrap();
        assert!(module.set_entry("helper").is_err());

        let copy = IrModule::from_bitcode(&module.to_bitcode()).unwrap();
        assert_eq!(copy.entry_function_name().as_deref(), Some("kernel"));
    }

    #[test]
    fn test_sole_function_is_the_entry() {
        let module = IrModule::from_ir(
            "one",
            "define void @only() {\nentry:\n  ret void\n}\n",
        )
        .unwrap();
        assert_eq!(module.entry_function_name().as_deref(), Some("only"));
    }

    #[test]
    fn test_set_entry_requires_definition() {
        let mut module = IrModule::empty("nothing");
        assert!(matches!(
            module.set_entry("missing"),
            Err(JitError::UnknownEntry(_))
        ));
    }

    #[test]
    fn test_duplicate_is_independent() {
        let module = IrModule::from_ir("two", TWO_FUNCTIONS).unwrap();
        let copy = module.duplicate().unwrap();
        assert_ne!(module.raw(), copy.raw());
        assert_eq!(copy.defined_functions(), module.defined_functions());
        drop(module);
        assert!(copy.defines_function("kernel"));
    }

    #[test]
    fn test_bad_bitcode() {
        assert!(IrModule::from_bitcode(&[]).is_none());
        assert!(IrModule::from_bitcode(b"definitely not bitcode").is_none());
    }
}
