//! JIT facade, IR, and cross-backend parity contract.
//!
//! Only the IR-level parity contract is specified; backends here are
//! in-process stand-ins that record a parity report instead of emitting
//! native code, which is sufficient to exercise the facade's wiring to the
//! profiler and the entry cache.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::value::TypedKind;
use crate::vm::profiler::LoopKey;

/// One instruction in the flat, ordered typed IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOp {
    LoadConst,
    Arithmetic,
    Comparison,
    Conversion,
    StringConcat,
    HelperCall,
    Safepoint,
    Return,
    /// Any heap load/store the loop body performs; counted in
    /// `memory_ops` in the parity report.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrInstruction {
    pub op: IrOp,
    pub value_kind: TypedKind,
}

/// A flat IR program for one hot loop.
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub instructions: Vec<IrInstruction>,
}

impl IrProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: IrOp, value_kind: TypedKind) {
        self.instructions.push(IrInstruction { op, value_kind });
    }
}

/// A backend-independent summary of an IR program's shape.
/// `value_kind_mask` sets bit `k` iff some instruction carries
/// `value_kind = k` (see [`TypedKind::bit`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParityReport {
    pub total_instructions: u32,
    pub arithmetic_ops: u32,
    pub comparison_ops: u32,
    pub helper_ops: u32,
    pub safepoints: u32,
    pub conversion_ops: u32,
    pub memory_ops: u32,
    pub value_kind_mask: u32,
}

/// A compile target. Distinct targets must still agree on
/// [`ParityReport`]s for the same program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    X86_64,
    Aarch64,
}

/// Computes `program`'s parity report. `target` is accepted only to mirror
/// the facade's real call shape; the analysis itself is target-independent
/// by construction.
pub fn collect_parity(program: &IrProgram, _target: Target) -> ParityReport {
    let mut report = ParityReport::default();
    for instruction in &program.instructions {
        report.total_instructions += 1;
        match instruction.op {
            IrOp::Arithmetic => report.arithmetic_ops += 1,
            IrOp::Comparison => report.comparison_ops += 1,
            IrOp::HelperCall | IrOp::StringConcat => report.helper_ops += 1,
            IrOp::Safepoint => report.safepoints += 1,
            IrOp::Conversion => report.conversion_ops += 1,
            IrOp::Memory => report.memory_ops += 1,
            IrOp::LoadConst | IrOp::Return => {}
        }
        report.value_kind_mask |= 1 << instruction.value_kind.bit();
    }
    report
}

/// A cached native entry point for one hot loop.
/// `entry_point` stands in for a real native function pointer; since the
/// machine-code emitter itself is out of scope, it is a unique opaque id
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitEntry {
    pub func: u32,
    pub loop_id: u32,
    pub entry_point: u64,
    pub generation: u32,
}

/// Compiles hot loops into [`JitEntry`] cache entries. Append-plus-lookup
/// only: entries are never rewritten, a higher generation supersedes an
/// older one by key.
#[derive(Debug, Default)]
pub struct JitFacade {
    entries: HashMap<LoopKey, JitEntry>,
    next_entry_point: u64,
    next_generation: u32,
    pub jit_compilation_count: u64,
    pub jit_invocation_count: u64,
}

impl JitFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `program` for `key`, installing a fresh [`JitEntry`].
    /// `jit_compilation_count` increases by one.
    pub fn compile_and_install(&mut self, key: LoopKey, program: &IrProgram) -> JitEntry {
        let _ = collect_parity(program, Target::X86_64);
        let entry_point = self.next_entry_point;
        self.next_entry_point += 1;
        let generation = self.next_generation;
        self.next_generation += 1;
        let entry = JitEntry {
            func: key.func,
            loop_id: key.loop_id,
            entry_point,
            generation,
        };
        self.entries.insert(key, entry);
        self.jit_compilation_count += 1;
        entry
    }

    /// Looks up a previously installed entry, counting the invocation.
    pub fn jit_lookup_entry(&mut self, key: LoopKey) -> Option<JitEntry> {
        let entry = self.entries.get(&key).copied();
        if entry.is_some() {
            self.jit_invocation_count += 1;
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> IrProgram {
        let mut program = IrProgram::new();
        program.push(IrOp::LoadConst, TypedKind::I32);
        program.push(IrOp::Arithmetic, TypedKind::I32);
        program.push(IrOp::Comparison, TypedKind::Bool);
        program.push(IrOp::Safepoint, TypedKind::I32);
        program
    }

    #[test]
    fn parity_report_is_identical_across_targets() {
        let program = sample_program();
        let x86 = collect_parity(&program, Target::X86_64);
        let arm = collect_parity(&program, Target::Aarch64);
        assert_eq!(x86, arm);
    }

    #[test]
    fn value_kind_mask_sets_a_bit_per_kind_present() {
        let program = sample_program();
        let report = collect_parity(&program, Target::X86_64);
        assert_eq!(report.value_kind_mask, (1 << TypedKind::I32.bit()) | (1 << TypedKind::Bool.bit()));
    }

    #[test]
    fn compile_and_install_then_lookup_round_trips() {
        let mut jit = JitFacade::new();
        let key = LoopKey { func: 0, loop_id: 0 };
        let program = sample_program();
        jit.compile_and_install(key, &program);
        assert_eq!(jit.jit_compilation_count, 1);

        let entry = jit.jit_lookup_entry(key).expect("entry installed");
        assert_eq!(jit.jit_invocation_count, 1);
        assert_eq!(entry.func, 0);
        assert_eq!(entry.loop_id, 0);
    }

    #[test]
    fn unknown_loop_key_misses() {
        let mut jit = JitFacade::new();
        assert!(jit.jit_lookup_entry(LoopKey { func: 9, loop_id: 9 }).is_none());
        assert_eq!(jit.jit_invocation_count, 0);
    }
}
