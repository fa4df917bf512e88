use tempfile::TempDir;
use tunejit_config::{CodegenOptLevel, CompileOptions};
use tunejit_jit::{CompiledFunction, IrModule, JitError};
use tunejit_symbol::{GlobalMapping, SymbolTracker};

const ADD: &str = r"
define i64 @add(i64 %a, i64 %b) {
entry:
  %sum = add i64 %a, %b
  ret i64 %sum
}
";

const SHIFTED: &str = r"
@offset = external global i64

define i64 @shifted(i64 %x) {
entry:
  %o = load i64, ptr @offset
  %r = add i64 %x, %o
  ret i64 %r
}
";

static OFFSET: i64 = 100;

type BinaryFn = extern "C" fn(i64, i64) -> i64;
type UnaryFn = extern "C" fn(i64) -> i64;

fn compile_add(options: CompileOptions) -> CompiledFunction {
    let module = IrModule::from_ir("add", ADD).unwrap();
    CompiledFunction::compile("add", None, module, options).unwrap()
}

#[test]
fn test_compile_and_call() {
    for level in [CodegenOptLevel::None, CodegenOptLevel::Aggressive] {
        let function = compile_add(CompileOptions::with_opt_level(level));
        assert_ne!(function.address(), 0);
        let add: BinaryFn = unsafe { function.as_fn() };
        assert_eq!(add(40, 2), 42);
    }
}

#[test]
fn test_fast_isel_build() {
    let options = CompileOptions {
        fast_isel: true,
        ..CompileOptions::default()
    };
    let function = compile_add(options);
    let add: BinaryFn = unsafe { function.as_fn() };
    assert_eq!(add(-1, 1), 0);
}

#[test]
fn test_ipra_request_still_compiles() {
    let plain = compile_add(CompileOptions::default());
    let with_ipra = compile_add(CompileOptions {
        ipra: true,
        ..CompileOptions::default()
    });
    let plain_add: BinaryFn = unsafe { plain.as_fn() };
    let ipra_add: BinaryFn = unsafe { with_ipra.as_fn() };
    assert_eq!(plain_add(20, 22), ipra_add(20, 22));
}

#[test]
fn test_unknown_entry() {
    let module = IrModule::from_ir("add", ADD).unwrap();
    let err = CompiledFunction::compile("sub", None, module, CompileOptions::default()).unwrap_err();
    assert!(matches!(err, JitError::UnknownEntry(name) if name == "sub"));
}

#[test]
fn test_round_trip_yields_new_artifact() {
    let tracker = SymbolTracker::new();
    let original = compile_add(CompileOptions::default());
    let bytes = original.serialize();

    let restored = CompiledFunction::deserialize(&bytes, &tracker)
        .unwrap()
        .unwrap();
    assert_eq!(restored.entry(), "add");
    assert_ne!(original, restored);
    assert_eq!(original, original);

    let add: BinaryFn = unsafe { restored.as_fn() };
    assert_eq!(add(20, 22), 42);
}

#[test]
fn test_malformed_bytes_are_rejected() {
    let tracker = SymbolTracker::new();
    assert!(CompiledFunction::deserialize(b"", &tracker).unwrap().is_none());
    assert!(
        CompiledFunction::deserialize(b"\x42\x43\xc0\xde garbage", &tracker)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_globals_are_relinked_from_tracker() {
    let mapping = GlobalMapping::of("offset", &raw const OFFSET);
    let mut module = IrModule::from_ir("shifted", SHIFTED).unwrap();
    module.set_entry("shifted").unwrap();
    let original = CompiledFunction::compile(
        "shifted",
        Some(std::slice::from_ref(&mapping)),
        module,
        CompileOptions::default(),
    )
    .unwrap();
    let shifted: UnaryFn = unsafe { original.as_fn() };
    assert_eq!(shifted(1), 101);

    let tracker = SymbolTracker::new();
    assert!(tracker.track(original.address(), "shifted", [mapping]));

    let restored = CompiledFunction::deserialize(&original.serialize(), &tracker)
        .unwrap()
        .unwrap();
    let shifted: UnaryFn = unsafe { restored.as_fn() };
    assert_eq!(shifted(42), 142);
}

#[test]
fn test_unreferenced_globals_are_skipped() {
    let module = IrModule::from_ir("add", ADD).unwrap();
    let extra = [GlobalMapping::of("offset", &raw const OFFSET)];
    let function =
        CompiledFunction::compile("add", Some(&extra), module, CompileOptions::default()).unwrap();
    let add: BinaryFn = unsafe { function.as_fn() };
    assert_eq!(add(1, 1), 2);
}

#[test]
fn test_write_to_file() {
    let function = compile_add(CompileOptions::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.ll");

    function.write_to_file(&path, false).unwrap();
    function.write_to_file(&path, true).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("define i64 @add").count(), 2);

    function.write_to_file(&path, false).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("define i64 @add").count(), 1);
}

#[test]
fn test_write_to_empty_path_is_noop() {
    let function = compile_add(CompileOptions::default());
    assert!(function.write_to_file(std::path::Path::new(""), false).is_ok());
}

#[test]
fn test_write_to_missing_directory_fails() {
    let function = compile_add(CompileOptions::default());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("dump.ll");
    let err = function.write_to_file(&path, false).unwrap_err();
    assert!(matches!(err, JitError::CouldNotOpenFile { .. }));
}
