//! Integration coverage tying the module manager, the hot-loop profiler,
//! and the JIT facade together, using `rstest` fixtures the way
//! integration-level VM scenarios are exercised.

use orus_vm::{
    compiler::{
        ExportKind,
        ModuleExport,
    },
    intern::StringInterner,
    jit::{
        IrOp,
        IrProgram,
    },
    module::ModuleManager,
    value::TypedKind,
    vm::profiler::LoopKey,
    Interpreter,
};
use orus_vm::consts::VmConfig;
use rstest::*;

#[fixture]
fn interner() -> StringInterner {
    StringInterner::new()
}

#[rstest]
fn alias_resolves_the_same_export_as_the_canonical_module(mut interner: StringInterner) {
    let mut modules = ModuleManager::new();
    modules.load_module("intrinsics/math");
    modules
        .alias_module("intrinsics/math", "std/math")
        .expect("canonical module exists");

    let export = ModuleExport {
        name: interner.intern("sin"),
        kind: ExportKind::Function,
        register_id: 3,
        value_kind: Some(TypedKind::F64),
        intrinsic_symbol: Some(interner.intern("__c_sin")),
        function_index: Some(0),
    };
    modules
        .declare_export("intrinsics/math", export)
        .expect("module was loaded");

    let canonical = modules
        .resolve_export(&interner, "intrinsics/math", "sin")
        .expect("export resolves through the canonical name");
    let via_alias = modules
        .resolve_export(&interner, "std/math", "sin")
        .expect("export resolves through the alias");
    assert_eq!(canonical.register_id, via_alias.register_id);
    assert_eq!(canonical.kind, via_alias.kind);

    // A second registration of the same alias must fail.
    assert!(modules.alias_module("intrinsics/math", "std/math").is_err());
}

#[fixture]
fn vm() -> Interpreter {
    Interpreter::new(VmConfig::default().with_hot_threshold(3))
}

#[rstest]
fn hot_loop_ticks_to_threshold_then_installs_a_jit_entry(mut vm: Interpreter) {
    let key = LoopKey { func: 0, loop_id: 0 };
    let mut program = IrProgram::new();
    program.push(IrOp::LoadConst, TypedKind::I32);
    program.push(IrOp::Arithmetic, TypedKind::I32);
    program.push(IrOp::Safepoint, TypedKind::I32);

    assert!(!vm.on_back_edge(key, &program));
    assert!(!vm.on_back_edge(key, &program));
    assert!(vm.on_back_edge(key, &program));

    assert_eq!(vm.jit.jit_compilation_count, 1);
    let entry = vm
        .jit
        .jit_lookup_entry(key)
        .expect("a JIT entry was installed on the threshold crossing");
    assert_eq!(vm.jit.jit_invocation_count, 1);
    assert_ne!(entry.entry_point, u64::MAX);
}

#[rstest]
fn jit_disabled_still_resets_the_counter_and_reports_the_crossing() {
    let mut vm = Interpreter::new(VmConfig::default().with_hot_threshold(2).with_jit_enabled(false));
    let key = LoopKey { func: 1, loop_id: 0 };
    let mut program = IrProgram::new();
    program.push(IrOp::Safepoint, TypedKind::Bool);

    assert!(!vm.on_back_edge(key, &program));
    assert!(vm.on_back_edge(key, &program));
    assert_eq!(vm.jit.jit_compilation_count, 0);
    assert!(vm.jit.jit_lookup_entry(key).is_none());

    // Counter was reset, so the next crossing takes another full threshold.
    assert!(!vm.on_back_edge(key, &program));
    assert!(vm.on_back_edge(key, &program));
}
