//! Register VM: dispatch loop, opcodes, and the typed-register cache
//! wiring.

pub mod enum_instance;
pub mod profiler;
pub mod registers;

use alloc::{
    sync::Arc,
    vec::Vec,
};

use hashbrown::HashMap;

use crate::{
    bytecode::Opcode,
    consts::{
        GLOBAL_REG_START,
        VmConfig,
    },
    error::{
        DispatchOutcome,
        ErrorKind,
        ErrorObject,
        SourceLocation,
    },
    gc::GcHeap,
    intern::{
        InternedStr,
        StringInterner,
    },
    jit::JitFacade,
    value::Value,
};

use profiler::{
    LoopKey,
    Profiler,
};
use registers::RegisterFile;

/// A native function an intrinsic trampoline's `CALL_NATIVE_R` can invoke.
/// The implementation behind a `@[core("symbol")]` declaration is an
/// external interface; `args` holds one `Value` per parameter, in
/// declaration order.
pub type NativeFn = fn(args: &[Value]) -> Value;

/// A registered native: the function pointer plus the arity
/// `CALL_NATIVE_R`'s dispatch needs to know how many argument registers to
/// read before the result register.
#[derive(Clone, Copy)]
struct NativeEntry {
    func: NativeFn,
    arity: u8,
}

/// The register VM.
///
/// A single cooperative dispatch loop over one chunk at a time; safepoints
/// (back-edges, function entry, allocator slow paths) are the only
/// suspension points.
pub struct Interpreter {
    registers: RegisterFile,
    pub heap: GcHeap,
    pub interner: StringInterner,
    profiler: Profiler,
    pub jit: JitFacade,
    natives: HashMap<InternedStr, NativeEntry>,
    functions: Vec<Arc<[u8]>>,
    config: VmConfig,
    last_error: Option<ErrorObject>,
    current_file: Arc<str>,
}

impl Interpreter {
    pub fn new(config: VmConfig) -> Self {
        Self {
            registers: RegisterFile::new(config.register_count),
            heap: GcHeap::new(config.gc_trigger_bytes),
            interner: StringInterner::new(),
            profiler: Profiler::new(config.hot_threshold),
            jit: JitFacade::new(),
            natives: HashMap::new(),
            functions: Vec::new(),
            config,
            last_error: None,
            current_file: Arc::from("<script>"),
        }
    }

    pub fn set_current_file(&mut self, file: &str) {
        self.current_file = Arc::from(file);
    }

    /// Registers a native under `symbol` with the given fixed `arity`. A
    /// `CALL_NATIVE_R` trampoline invoking this symbol must have been
    /// compiled against a signature with exactly `arity` parameters.
    pub fn register_native(&mut self, symbol: &str, arity: u8, f: NativeFn) {
        let handle = self.interner.intern(symbol);
        self.natives.insert(handle, NativeEntry { func: f, arity });
    }

    pub fn load_functions(&mut self, functions: Vec<Arc<[u8]>>) {
        self.functions = functions;
    }

    pub fn last_error(&self) -> Option<&ErrorObject> {
        self.last_error.as_ref()
    }

    fn runtime_error(&mut self, kind: ErrorKind, message: impl Into<alloc::string::String>) -> DispatchOutcome {
        let message = message.into();
        tracing::debug!(kind = %kind, %message, file = %self.current_file, "runtime error");
        self.last_error = Some(ErrorObject::new(
            kind,
            message,
            SourceLocation::unknown(self.current_file.clone()),
        ));
        DispatchOutcome::RuntimeError
    }

    /// Runs `code` from offset 0 until `HALT`, `RETURN_R`, or an error.
    /// Returns the dispatch outcome; a runtime error also populates
    /// [`Interpreter::last_error`].
    pub fn run(&mut self, code: &[u8]) -> DispatchOutcome {
        let mut ip = 0usize;
        loop {
            let Some(&opcode_byte) = code.get(ip) else {
                return self.runtime_error(ErrorKind::Internal, "instruction pointer ran off the chunk");
            };
            let Some(opcode) = Opcode::from_u8(opcode_byte) else {
                return self.runtime_error(ErrorKind::Internal, "unknown opcode byte");
            };
            let instruction_offset = ip;

            match opcode {
                Opcode::Halt => return DispatchOutcome::Ok,

                Opcode::Jump => {
                    let disp = read_i16(code, ip + 1);
                    ip = (instruction_offset as i64 + 3 + disp as i64) as usize;
                }
                Opcode::JumpShort => {
                    let disp = code[ip + 1];
                    ip = instruction_offset + 2 + disp as usize;
                }
                Opcode::Loop => {
                    let back = read_u16(code, ip + 1);
                    tracing::trace!(offset = instruction_offset, "safepoint: back-edge");
                    ip = instruction_offset + 3 - back as usize;
                }
                Opcode::LoopShort => {
                    let back = code[ip + 1];
                    tracing::trace!(offset = instruction_offset, "safepoint: back-edge");
                    ip = instruction_offset + 2 - back as usize;
                }

                Opcode::JumpIfNotR => {
                    let reg = code[ip + 1];
                    let disp = read_i16(code, ip + 2);
                    let next = instruction_offset + 4;
                    if !self.registers.get_register_safe(reg).is_truthy() {
                        ip = (next as i64 + disp as i64) as usize;
                    } else {
                        ip = next;
                    }
                }
                Opcode::JumpIfNotI32Typed => {
                    // aux encodes step sign (0 = ascending, 1 = descending);
                    // the comparison bound lives in the register
                    // immediately following `reg`, by the compiler's typed
                    // span convention.
                    let reg = code[ip + 1];
                    let aux = code[ip + 2];
                    let disp = read_i16(code, ip + 3);
                    let next = instruction_offset + 5;

                    let i = self.typed_i32_rehydrated(reg);
                    let bound = self.typed_i32_rehydrated(reg + 1);
                    let still_running = if aux == 0 { i < bound } else { i > bound };
                    if !still_running {
                        ip = (next as i64 + disp as i64) as usize;
                    } else {
                        ip = next;
                    }
                }

                Opcode::AddI32Typed => {
                    let dst = code[ip + 1];
                    let lhs = code[ip + 2];
                    let rhs = code[ip + 3];
                    let sum = self
                        .typed_i32_rehydrated(lhs)
                        .wrapping_add(self.typed_i32_rehydrated(rhs));
                    self.registers.store_i32_typed_hot(dst, sum);
                    ip = instruction_offset + 4;
                }
                Opcode::MulI32Imm => {
                    let dst = code[ip + 1];
                    let src = code[ip + 2];
                    let imm = read_i32(code, ip + 3);
                    let lhs = self.typed_i32_rehydrated(src);
                    match lhs.checked_mul(imm) {
                        Some(product) => {
                            self.registers.store_i32_typed_hot(dst, product);
                            self.registers.reconcile_typed_register(dst);
                            ip = instruction_offset + 7;
                        }
                        None => {
                            return self.runtime_error(
                                ErrorKind::Value,
                                "OP_MUL_I32_IMM overflowed an i32",
                            );
                        }
                    }
                }
                Opcode::IncI32R => {
                    let reg = code[ip + 1];
                    self.registers.inc_i32_r(reg);
                    ip = instruction_offset + 2;
                }
                Opcode::DecI32R => {
                    let reg = code[ip + 1];
                    self.registers.dec_i32_r(reg);
                    ip = instruction_offset + 2;
                }

                Opcode::LoadGlobal => {
                    let dst = code[ip + 1];
                    let idx = code[ip + 2];
                    let value = self.registers.get_register_safe(GLOBAL_REG_START as u8 + idx);
                    self.registers.set_register_safe(dst, value);
                    ip = instruction_offset + 3;
                }
                Opcode::StoreGlobal => {
                    let idx = code[ip + 1];
                    let src = code[ip + 2];
                    let value = self.registers.reconcile_typed_register(src);
                    self.registers.set_register_safe(GLOBAL_REG_START as u8 + idx, value);
                    ip = instruction_offset + 3;
                }

                Opcode::LoadConstI32 => {
                    let dst = code[ip + 1];
                    let imm = read_i32(code, ip + 2);
                    self.registers.set_register_safe(dst, Value::I32(imm));
                    ip = instruction_offset + 6;
                }
                Opcode::MoveR => {
                    let dst = code[ip + 1];
                    let src = code[ip + 2];
                    let value = self.registers.get_register_safe(src);
                    self.registers.set_register_safe(dst, value);
                    ip = instruction_offset + 3;
                }
                Opcode::EqI32Typed => {
                    let dst = code[ip + 1];
                    let lhs = code[ip + 2];
                    let rhs = code[ip + 3];
                    let eq = self.typed_i32_rehydrated(lhs) == self.typed_i32_rehydrated(rhs);
                    self.registers.set_register_safe(dst, Value::Bool(eq));
                    ip = instruction_offset + 4;
                }

                Opcode::CallNativeR => {
                    let symbol = InternedStr::from_raw(read_u16(code, ip + 1) as u32);
                    let Some(NativeEntry { func, arity }) = self.natives.get(&symbol).copied()
                    else {
                        return self.runtime_error(ErrorKind::Name, "unresolved native symbol");
                    };
                    let arity = arity as usize;
                    let arg_regs_start = ip + 3;
                    let args: Vec<Value> = (0..arity)
                        .map(|i| self.registers.get_register_safe(code[arg_regs_start + i]))
                        .collect();
                    let result_reg = code[arg_regs_start + arity];
                    let result = func(&args);
                    self.registers.set_register_safe(result_reg, result);
                    ip = arg_regs_start + arity + 1;
                }
                Opcode::CallR => {
                    let func_idx = code[ip + 1] as usize;
                    let argc = code[ip + 2] as usize;
                    let arg_regs_start = ip + 3;
                    let dst = code[arg_regs_start + argc];
                    let Some(chunk) = self.functions.get(func_idx).cloned() else {
                        return self.runtime_error(ErrorKind::Name, "unresolved function index");
                    };
                    match self.run(&chunk) {
                        DispatchOutcome::Ok => {
                            let result = self.registers.get_register_safe(0);
                            self.registers.set_register_safe(dst, result);
                        }
                        other => return other,
                    }
                    ip = arg_regs_start + argc + 1;
                }
                Opcode::ReturnR => {
                    let reg = code[ip + 1];
                    self.registers.set_register_safe(0, self.registers.get_register_safe(reg));
                    return DispatchOutcome::Ok;
                }

                Opcode::BranchTyped => {
                    return self.runtime_error(
                        ErrorKind::Internal,
                        "BRANCH_TYPED must never be emitted by this compiler",
                    );
                }
            }
        }
    }

    /// Reads a register as `i32`, rehydrating the typed cache from the
    /// boxed cell first if it was cold.
    fn typed_i32_rehydrated(&mut self, reg: u8) -> i32 {
        if let Some(v) = self.registers.try_read_i32_typed(reg) {
            return v;
        }
        match self.registers.get_register_safe(reg) {
            Value::I32(v) => v,
            _ => 0,
        }
    }

    /// Ticks the profiler for `(func, loop)` and, on a threshold crossing,
    /// consults the JIT if enabled. Returns whether this
    /// call crossed the threshold.
    pub fn on_back_edge(&mut self, key: LoopKey, program: &crate::jit::IrProgram) -> bool {
        let crossed = self.profiler.profile_tick(key);
        if crossed {
            if self.config.jit_enabled {
                self.jit.compile_and_install(key, program);
                tracing::info!(func = key.func, loop_id = key.loop_id, "tiered up to JIT");
            } else {
                tracing::debug!(func = key.func, loop_id = key.loop_id, "hot loop, JIT disabled");
            }
            self.profiler.reset(key);
        }
        crossed
    }
}

fn read_i16(code: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([code[at], code[at + 1]])
}

fn read_u16(code: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([code[at], code[at + 1]])
}

fn read_i32(code: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{
        BytecodeBuffer,
        OperandSize,
    };

    fn chunk_mul_i32_imm_twice(initial: i32, imm: i32) -> Vec<u8> {
        let mut buf = BytecodeBuffer::new();
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(0);
        buf.emit_i32(initial);
        buf.emit_opcode(Opcode::MulI32Imm);
        buf.emit_byte(0);
        buf.emit_byte(0);
        buf.emit_i32(imm);
        buf.emit_opcode(Opcode::MulI32Imm);
        buf.emit_byte(0);
        buf.emit_byte(0);
        buf.emit_i32(imm);
        buf.emit_opcode(Opcode::Halt);
        buf.seal().unwrap()
    }

    #[test]
    fn mul_i32_imm_twice_yields_eighteen_with_a_clean_typed_cache() {
        let mut vm = Interpreter::new(VmConfig::default());
        let code = chunk_mul_i32_imm_twice(2, 3);
        let outcome = vm.run(&code);
        assert_eq!(outcome, DispatchOutcome::Ok);
        assert_eq!(vm.registers.get_register_safe(0), Value::I32(18));
        assert!(!vm.registers.is_dirty(0));
    }

    #[test]
    fn mul_i32_imm_overflow_is_a_runtime_value_error() {
        let mut vm = Interpreter::new(VmConfig::default());
        let code = chunk_mul_i32_imm_twice(i32::MAX, 2);
        let outcome = vm.run(&code);
        assert_eq!(outcome, DispatchOutcome::RuntimeError);
        assert_eq!(vm.last_error().unwrap().kind, ErrorKind::Value);
    }

    #[test]
    fn inc_on_a_global_register_then_load_global_observes_the_post_increment_value() {
        let mut vm = Interpreter::new(VmConfig::default());
        let mut buf = BytecodeBuffer::new();
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(GLOBAL_REG_START as u8);
        buf.emit_i32(41);
        buf.emit_opcode(Opcode::IncI32R);
        buf.emit_byte(GLOBAL_REG_START as u8);
        buf.emit_opcode(Opcode::LoadGlobal);
        buf.emit_byte(10); // dst = F
        buf.emit_byte(GLOBAL_REG_START as u8);
        buf.emit_opcode(Opcode::Halt);
        let code = buf.seal().unwrap();

        let outcome = vm.run(&code);
        assert_eq!(outcome, DispatchOutcome::Ok);
        assert_eq!(vm.registers.get_register_safe(10), Value::I32(42));
        assert_eq!(vm.registers.get_register_safe(GLOBAL_REG_START as u8), Value::I32(42));
    }

    #[test]
    fn halt_stops_dispatch_and_returns_ok() {
        let mut vm = Interpreter::new(VmConfig::default());
        let mut buf = BytecodeBuffer::new();
        buf.emit_opcode(Opcode::Halt);
        let code = buf.seal().unwrap();
        assert_eq!(vm.run(&code), DispatchOutcome::Ok);
    }

    #[test]
    fn unknown_opcode_byte_is_an_internal_runtime_error() {
        let mut vm = Interpreter::new(VmConfig::default());
        let code = [0xffu8];
        assert_eq!(vm.run(&code), DispatchOutcome::RuntimeError);
        assert_eq!(vm.last_error().unwrap().kind, ErrorKind::Internal);
    }

    #[test]
    fn intrinsic_trampoline_invokes_the_registered_native() {
        let mut vm = Interpreter::new(VmConfig::default());
        vm.register_native("__double", 1, |args| match args[0] {
            Value::I32(n) => Value::I32(n * 2),
            other => other,
        });
        let symbol = vm.interner.intern("__double");

        let mut buf = BytecodeBuffer::new();
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(1);
        buf.emit_i32(21);
        buf.emit_opcode(Opcode::CallNativeR);
        buf.emit_u16(symbol.index() as u16);
        buf.emit_byte(1);
        buf.emit_byte(2);
        buf.emit_opcode(Opcode::ReturnR);
        buf.emit_byte(2);
        let code = buf.seal().unwrap();

        assert_eq!(vm.run(&code), DispatchOutcome::Ok);
        assert_eq!(vm.registers.get_register_safe(0), Value::I32(42));
    }

    #[test]
    fn intrinsic_trampoline_invokes_a_two_arg_native() {
        let mut vm = Interpreter::new(VmConfig::default());
        vm.register_native("__add", 2, |args| match (args[0], args[1]) {
            (Value::I32(a), Value::I32(b)) => Value::I32(a + b),
            _ => Value::Nil,
        });
        let symbol = vm.interner.intern("__add");

        let mut buf = BytecodeBuffer::new();
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(1);
        buf.emit_i32(19);
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(2);
        buf.emit_i32(23);
        buf.emit_opcode(Opcode::CallNativeR);
        buf.emit_u16(symbol.index() as u16);
        buf.emit_byte(1);
        buf.emit_byte(2);
        buf.emit_byte(3);
        buf.emit_opcode(Opcode::ReturnR);
        buf.emit_byte(3);
        let code = buf.seal().unwrap();

        assert_eq!(vm.run(&code), DispatchOutcome::Ok);
        assert_eq!(vm.registers.get_register_safe(0), Value::I32(42));
    }

    #[test]
    fn jump_if_not_i32_typed_drives_a_for_range_loop_to_completion() {
        // for i in 0..4..1: i += 1 (compiled by hand to exercise the VM in
        // isolation from the compiler).
        let mut buf = BytecodeBuffer::new();
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(0); // i
        buf.emit_i32(0);
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(1); // bound
        buf.emit_i32(4);
        buf.emit_opcode(Opcode::LoadConstI32);
        buf.emit_byte(2); // step
        buf.emit_i32(1);

        let guard_offset = buf.len();
        let guard_patch = buf.emit_jump_placeholder(
            Opcode::JumpIfNotI32Typed,
            &[0, 0],
            OperandSize::Word,
        );
        buf.emit_opcode(Opcode::AddI32Typed);
        buf.emit_byte(0);
        buf.emit_byte(0);
        buf.emit_byte(2);
        let back_edge = buf.emit_jump_placeholder(Opcode::Jump, &[], OperandSize::Word);
        buf.patch_jump(back_edge, guard_offset).unwrap();
        let end_offset = buf.len();
        buf.patch_jump(guard_patch, end_offset).unwrap();
        buf.emit_opcode(Opcode::Halt);
        let code = buf.seal().unwrap();

        let mut vm = Interpreter::new(VmConfig::default());
        assert_eq!(vm.run(&code), DispatchOutcome::Ok);
        assert_eq!(vm.registers.get_register_safe(0), Value::I32(4));
    }
}
