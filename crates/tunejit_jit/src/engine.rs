//! Thin MCJIT wrapper over the C API.
//!
//! inkwell's `ExecutionEngine` cannot toggle fast instruction selection, so
//! the engine is built directly from `LLVMMCJITCompilerOptions`.

use std::ffi::{CStr, c_char};
use std::mem;
use std::ptr;

use inkwell::execution_engine::ExecutionEngine;
use inkwell::targets::{InitializationConfig, Target};
use llvm_sys::core::LLVMDisposeMessage;
use llvm_sys::execution_engine::{
    LLVMAddGlobalMapping, LLVMCreateMCJITCompilerForModule, LLVMDisposeExecutionEngine,
    LLVMExecutionEngineRef, LLVMGetFunctionAddress, LLVMInitializeMCJITCompilerOptions,
    LLVMMCJITCompilerOptions,
};
use llvm_sys::prelude::{LLVMModuleRef, LLVMValueRef};
use once_cell::sync::Lazy;
use tunejit_config::{CodegenOptLevel, CompileOptions};

static NATIVE_TARGET: Lazy<Result<(), String>> = Lazy::new(|| {
    ExecutionEngine::link_in_mc_jit();
    Target::initialize_native(&InitializationConfig::default())
});

/// Initialize the host target and link in MCJIT, once per process.
pub(crate) fn native_target() -> Result<(), String> {
    (*NATIVE_TARGET).clone()
}

pub(crate) struct NativeEngine {
    raw: LLVMExecutionEngineRef,
}

// SAFETY: the engine is only reached through the compiled function that owns
// it, and MCJIT serializes its own symbol lookups.
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    /// Build an engine that takes ownership of `module`.
    ///
    /// # Safety
    ///
    /// `module` must be a valid module that nothing else will free. LLVM
    /// frees it when creation fails, so it must not be used after an error.
    pub(crate) unsafe fn create(
        module: LLVMModuleRef,
        options: &CompileOptions,
    ) -> Result<Self, String> {
        let size = mem::size_of::<LLVMMCJITCompilerOptions>();
        // SAFETY: the options struct is plain data and is filled in by LLVM.
        let mut mc_options: LLVMMCJITCompilerOptions = unsafe { mem::zeroed() };
        unsafe { LLVMInitializeMCJITCompilerOptions(&mut mc_options, size) };
        mc_options.OptLevel = opt_level_code(options.opt_level);
        mc_options.EnableFastISel = i32::from(options.fast_isel);

        let mut raw: LLVMExecutionEngineRef = ptr::null_mut();
        let mut error: *mut c_char = ptr::null_mut();
        // SAFETY: every pointer is valid for the duration of the call.
        let failed = unsafe {
            LLVMCreateMCJITCompilerForModule(&mut raw, module, &mut mc_options, size, &mut error)
        };
        if failed != 0 {
            return Err(take_message(error));
        }
        Ok(Self { raw })
    }

    /// Resolve `global` to `address` when the engine links the module.
    ///
    /// # Safety
    ///
    /// `global` must belong to the module owned by this engine.
    pub(crate) unsafe fn add_global_mapping(&self, global: LLVMValueRef, address: usize) {
        unsafe { LLVMAddGlobalMapping(self.raw, global, address as *mut _) };
    }

    /// Finalize code generation and return the address of `name`, or 0.
    pub(crate) fn function_address(&self, name: &CStr) -> u64 {
        // SAFETY: the engine is alive and `name` is NUL terminated.
        unsafe { LLVMGetFunctionAddress(self.raw, name.as_ptr()) }
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        // SAFETY: created in `create` and disposed of only here. This also
        // frees the module handed over at creation.
        unsafe { LLVMDisposeExecutionEngine(self.raw) };
    }
}

fn opt_level_code(level: CodegenOptLevel) -> u32 {
    match level {
        CodegenOptLevel::None => 0,
        CodegenOptLevel::Less => 1,
        CodegenOptLevel::Default => 2,
        CodegenOptLevel::Aggressive => 3,
    }
}

fn take_message(message: *mut c_char) -> String {
    if message.is_null() {
        return "unknown error".to_string();
    }
    // SAFETY: LLVM hands out NUL terminated messages that the caller disposes.
    unsafe {
        let text = CStr::from_ptr(message).to_string_lossy().into_owned();
        LLVMDisposeMessage(message);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_level_codes() {
        assert_eq!(opt_level_code(CodegenOptLevel::None), 0);
        assert_eq!(opt_level_code(CodegenOptLevel::Aggressive), 3);
    }

    #[test]
    fn test_native_target_initializes_once() {
        assert!(native_target().is_ok());
        assert!(native_target().is_ok());
    }
}
