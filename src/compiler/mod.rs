//! Typed-AST → bytecode compiler.
//!
//! Given a typed AST, produces a sealed chunk for the top-level script, an
//! independent chunk per nested function, and a module-export table.

pub mod ast;
pub mod registers;
pub mod scope;

use alloc::{
    string::String,
    vec::Vec,
};

use hashbrown::HashMap;

use crate::{
    bytecode::{
        BytecodeBuffer,
        Opcode,
        OperandSize,
    },
    error::{
        ErrorKind,
        SimpleResult,
    },
    intern::{
        InternedStr,
        StringInterner,
    },
    value::TypedKind,
};

use ast::{
    Expr,
    ForRange,
    Function,
    If,
    Module,
    RegSlot,
    StepSign,
    Stmt,
};
use registers::{
    Bank,
    RegisterAllocator,
};
use scope::ScopeStack;

/// What kind of thing a module export names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function,
    Value,
    Type,
}

/// A single module-export table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleExport {
    pub name: InternedStr,
    pub kind: ExportKind,
    pub register_id: u8,
    pub value_kind: Option<TypedKind>,
    pub intrinsic_symbol: Option<InternedStr>,
    pub function_index: Option<u32>,
}

/// One compiled function's sealed chunk.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: InternedStr,
    pub bytecode: Vec<u8>,
    pub intrinsic_symbol: Option<InternedStr>,
}

/// The output of compiling one module: the top-level chunk, each function's
/// independent chunk, and the export table.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub top_level: Vec<u8>,
    pub functions: Vec<CompiledFunction>,
    pub exports: Vec<ModuleExport>,
}

/// Size, in bytes, of a `CALL_NATIVE_R` instruction's operand block for an
/// intrinsic of the given arity: `symbol: u16, arg_reg[arity]: u8, result_reg: u8`.
/// For the unary case this is 4, which is what puts `RETURN_R` at offset 5.
fn call_native_r_operand_bytes(arity: usize) -> usize {
    2 + arity + 1
}

/// Maps a typed-AST signature kind to the register bank that holds it.
fn bank_for_typed_kind(kind: TypedKind) -> Bank {
    match kind {
        TypedKind::I32 => Bank::I32,
        TypedKind::I64 => Bank::I64,
        TypedKind::U32 => Bank::U32,
        TypedKind::U64 => Bank::U64,
        TypedKind::F64 => Bank::F64,
        TypedKind::Bool => Bank::BoolFrame,
    }
}

/// Compiles one module's typed AST into bytecode.
///
/// Holds a borrowed [`StringInterner`] because the same table is shared with
/// the VM for the lifetime of one run.
pub struct Compiler<'a> {
    interner: &'a mut StringInterner,
    registers: RegisterAllocator,
    scopes: ScopeStack,
    errors: crate::error::ErrorReporter,
    function_index: u32,

    // Mirrors of the innermost loop frame's offsets, reset to -1/0 after
    // every function so a fresh function always starts clean.
    current_loop_start: i64,
    current_loop_continue: i64,
    current_loop_end: i64,
}

impl<'a> Compiler<'a> {
    pub fn new(interner: &'a mut StringInterner) -> Self {
        Self {
            interner,
            registers: RegisterAllocator::new(),
            scopes: ScopeStack::new(),
            errors: crate::error::ErrorReporter::new(),
            function_index: 0,
            current_loop_start: -1,
            current_loop_continue: -1,
            current_loop_end: -1,
        }
    }

    pub fn compile_module(&mut self, module: &Module) -> SimpleResult<CompiledModule> {
        let mut functions = Vec::new();
        let mut exports = Vec::new();

        for function in &module.functions {
            let (compiled, export) = self.compile_function(function)?;
            exports.push(export);
            functions.push(compiled);
        }

        let mut top_level_locals = HashMap::new();
        let mut top_level_buffer = BytecodeBuffer::new();
        for stmt in &module.top_level {
            self.compile_stmt(&mut top_level_buffer, &mut top_level_locals, stmt)?;
        }
        let top_level = top_level_buffer.seal()?;

        if self.errors.has_errors() {
            return Err((ErrorKind::Compile, String::from("module failed to compile")));
        }

        Ok(CompiledModule {
            top_level,
            functions,
            exports,
        })
    }

    fn compile_function(
        &mut self,
        function: &Function,
    ) -> SimpleResult<(CompiledFunction, ModuleExport)> {
        let name_handle = self.interner.intern(&function.name);
        let function_index = self.function_index;
        self.function_index += 1;

        let (bytecode, intrinsic_symbol, value_kind) = if let Some((symbol, signature)) =
            &function.intrinsic
        {
            let symbol_handle = self.interner.intern(symbol);
            let trampoline = self.compile_intrinsic_trampoline(symbol_handle, signature)?;
            (trampoline, Some(symbol_handle), Some(signature.return_kind))
        } else {
            let mut locals = HashMap::new();
            let mut buffer = BytecodeBuffer::new();
            for stmt in &function.body {
                self.compile_stmt(&mut buffer, &mut locals, stmt)?;
            }
            (buffer.seal()?, None, None)
        };

        // Loop context must read back to its rest state after every
        // function, regardless of what happened inside it.
        debug_assert_eq!(self.current_loop_start, -1);
        debug_assert_eq!(self.current_loop_continue, -1);
        debug_assert_eq!(self.current_loop_end, -1);
        debug_assert_eq!(self.scopes.loop_depth(), 0);

        let export = ModuleExport {
            name: name_handle,
            kind: ExportKind::Function,
            register_id: 0,
            value_kind,
            intrinsic_symbol,
            function_index: Some(function_index),
        };

        Ok((
            CompiledFunction {
                name: name_handle,
                bytecode,
                intrinsic_symbol,
            },
            export,
        ))
    }

    /// Emits `CALL_NATIVE_R, symbol, arg_reg[arity], result_reg, RETURN_R,
    /// result_reg` for the given C-ABI signature. For a unary intrinsic this
    /// puts `RETURN_R` at offset 5, matching the fixed layout this trampoline
    /// used before it supported more than one parameter.
    fn compile_intrinsic_trampoline(
        &mut self,
        symbol: InternedStr,
        signature: &ast::IntrinsicSignature,
    ) -> SimpleResult<Vec<u8>> {
        let mut buffer = BytecodeBuffer::new();

        let arg_registers: Vec<u8> = signature
            .param_kinds
            .iter()
            .map(|&kind| {
                let allocation = self.registers.alloc_typed(bank_for_typed_kind(kind))?;
                Ok(self.registers.flat_register(allocation))
            })
            .collect::<SimpleResult<Vec<u8>>>()?;
        let result_allocation =
            self.registers.alloc_typed(bank_for_typed_kind(signature.return_kind))?;
        let result_register = self.registers.flat_register(result_allocation);

        buffer.emit_opcode(Opcode::CallNativeR);
        buffer.emit_u16(symbol.index() as u16);
        for &arg_register in &arg_registers {
            buffer.emit_byte(arg_register);
        }
        buffer.emit_byte(result_register);
        let return_offset = buffer.len();
        debug_assert_eq!(
            return_offset,
            1 + call_native_r_operand_bytes(arg_registers.len())
        );
        buffer.emit_opcode(Opcode::ReturnR);
        buffer.emit_byte(result_register);
        buffer.seal()
    }

    fn compile_stmt(
        &mut self,
        buffer: &mut BytecodeBuffer,
        locals: &mut HashMap<RegSlot, u8>,
        stmt: &Stmt,
    ) -> SimpleResult<()> {
        match stmt {
            Stmt::ForRange(for_range) => self.compile_for_range(buffer, locals, for_range),
            Stmt::If(if_stmt) => self.compile_if(buffer, locals, if_stmt),
            Stmt::Continue => self.compile_continue(buffer),
            Stmt::Break => self.compile_break(buffer),
            Stmt::Expr(expr) => self.compile_expr(buffer, locals, expr),
        }
    }

    fn resolve(
        &mut self,
        locals: &mut HashMap<RegSlot, u8>,
        bank: Bank,
        slot: RegSlot,
    ) -> SimpleResult<u8> {
        if let Some(&reg) = locals.get(&slot) {
            return Ok(reg);
        }
        let allocation = self.registers.alloc_typed(bank)?;
        let reg = self.registers.flat_register(allocation);
        locals.insert(slot, reg);
        Ok(reg)
    }

    /// Lowers `for i in a..b..step`
    /// `JUMP_IF_NOT_I32_TYPED` guard, the body, an `ADD_I32_TYPED` increment,
    /// and a back-edge to the guard. Never emits `BRANCH_TYPED`.
    ///
    /// The guard's `aux` byte carries the step-sign discriminator; the upper bound lives in
    /// the typed register immediately following the loop variable, reserved
    /// as a single contiguous span alongside the step register so the guard
    /// and increment can locate both without a dedicated ISA operand.
    fn compile_for_range(
        &mut self,
        buffer: &mut BytecodeBuffer,
        locals: &mut HashMap<RegSlot, u8>,
        for_range: &ForRange,
    ) -> SimpleResult<()> {
        self.scopes.push_loop();
        self.registers.enter_scope();

        let span = self.registers.begin_typed_span(Bank::I32, 3, false)?;
        let i_reg = self.registers.flat_span_register(&span, 0);
        let end_reg = self.registers.flat_span_register(&span, 1);
        let step_reg = self.registers.flat_span_register(&span, 2);
        locals.insert(for_range.var, i_reg);

        buffer.emit_opcode(Opcode::LoadConstI32);
        buffer.emit_byte(i_reg);
        buffer.emit_i32(for_range.start);

        buffer.emit_opcode(Opcode::LoadConstI32);
        buffer.emit_byte(end_reg);
        buffer.emit_i32(for_range.end);

        buffer.emit_opcode(Opcode::LoadConstI32);
        buffer.emit_byte(step_reg);
        buffer.emit_i32(for_range.step);

        let aux = match for_range.step_sign {
            StepSign::Positive => 0u8,
            StepSign::Negative => 1u8,
        };
        let guard_offset = buffer.len();
        let guard_patch = buffer.emit_jump_placeholder(
            Opcode::JumpIfNotI32Typed,
            &[i_reg, aux],
            OperandSize::Word,
        );

        self.current_loop_start = guard_offset as i64;

        for stmt in &for_range.body {
            self.compile_stmt(buffer, locals, stmt)?;
        }

        let continue_offset = buffer.len();
        self.current_loop_continue = continue_offset as i64;
        if let Some(loop_frame) = self.scopes.current_loop_mut() {
            loop_frame.continue_offset = continue_offset as i64;
        }

        buffer.emit_opcode(Opcode::AddI32Typed);
        buffer.emit_byte(i_reg);
        buffer.emit_byte(i_reg);
        buffer.emit_byte(step_reg);

        let back_edge = buffer.emit_jump_placeholder(Opcode::Jump, &[], OperandSize::Word);
        buffer.patch_jump(back_edge, guard_offset)?;

        let end_offset = buffer.len();
        self.current_loop_end = end_offset as i64;
        buffer.patch_jump(guard_patch, end_offset)?;

        let loop_frame = self.scopes.pop();
        if let Some(scope::Frame::Loop(loop_frame)) = loop_frame {
            for break_patch in loop_frame.break_patches {
                buffer.patch_jump(break_patch, end_offset)?;
            }
            for continue_patch in loop_frame.continue_patches {
                buffer.patch_jump(continue_patch, continue_offset)?;
            }
        }

        self.registers.release_typed_span(span);
        self.registers.exit_scope();

        self.current_loop_start = -1;
        self.current_loop_continue = -1;
        self.current_loop_end = -1;
        Ok(())
    }

    fn compile_if(
        &mut self,
        buffer: &mut BytecodeBuffer,
        locals: &mut HashMap<RegSlot, u8>,
        if_stmt: &If,
    ) -> SimpleResult<()> {
        let cond_reg = self.resolve(locals, Bank::BoolFrame, if_stmt.cond)?;
        let skip_then = buffer.emit_jump_placeholder(
            Opcode::JumpIfNotR,
            &[cond_reg],
            OperandSize::Word,
        );
        for stmt in &if_stmt.then_branch {
            self.compile_stmt(buffer, locals, stmt)?;
        }
        if if_stmt.else_branch.is_empty() {
            let end = buffer.len();
            buffer.patch_jump(skip_then, end)?;
            return Ok(());
        }
        let skip_else = buffer.emit_jump_placeholder(Opcode::Jump, &[], OperandSize::Word);
        let else_start = buffer.len();
        buffer.patch_jump(skip_then, else_start)?;
        for stmt in &if_stmt.else_branch {
            self.compile_stmt(buffer, locals, stmt)?;
        }
        let end = buffer.len();
        buffer.patch_jump(skip_else, end)?;
        Ok(())
    }

    /// `continue` targets the increment offset, not the guard: recorded as a
    /// forward patch and resolved once the loop closes.
    ///
    /// A `continue`/`break` outside any loop is a compile error, but it is
    /// accumulated in the reporter rather than aborting the rest of the
    /// compile.
    fn compile_continue(&mut self, buffer: &mut BytecodeBuffer) -> SimpleResult<()> {
        let patch = buffer.emit_jump_placeholder(Opcode::Jump, &[], OperandSize::Word);
        match self.scopes.current_loop_mut() {
            Some(loop_frame) => loop_frame.continue_patches.push(patch),
            None => self
                .errors
                .push(crate::error::CompileError::new(
                    ErrorKind::Compile,
                    "`continue` outside of a loop",
                )),
        }
        Ok(())
    }

    fn compile_break(&mut self, buffer: &mut BytecodeBuffer) -> SimpleResult<()> {
        let patch = buffer.emit_jump_placeholder(Opcode::Jump, &[], OperandSize::Word);
        match self.scopes.current_loop_mut() {
            Some(loop_frame) => loop_frame.break_patches.push(patch),
            None => self
                .errors
                .push(crate::error::CompileError::new(
                    ErrorKind::Compile,
                    "`break` outside of a loop",
                )),
        }
        Ok(())
    }

    fn compile_expr(
        &mut self,
        buffer: &mut BytecodeBuffer,
        locals: &mut HashMap<RegSlot, u8>,
        expr: &Expr,
    ) -> SimpleResult<()> {
        match expr {
            Expr::MulImm { dst, src, imm } => {
                let dst_reg = self.resolve(locals, Bank::I32, *dst)?;
                let src_reg = self.resolve(locals, Bank::I32, *src)?;
                buffer.emit_opcode(Opcode::MulI32Imm);
                buffer.emit_byte(dst_reg);
                buffer.emit_byte(src_reg);
                buffer.emit_i32(*imm);
                Ok(())
            }
            Expr::EqI32 { dst, lhs, rhs } => {
                let dst_reg = self.resolve(locals, Bank::BoolFrame, *dst)?;
                let lhs_reg = self.resolve(locals, Bank::I32, *lhs)?;
                let rhs_reg = self.resolve(locals, Bank::I32, *rhs)?;
                buffer.emit_opcode(Opcode::EqI32Typed);
                buffer.emit_byte(dst_reg);
                buffer.emit_byte(lhs_reg);
                buffer.emit_byte(rhs_reg);
                Ok(())
            }
            Expr::IncI32(slot) => {
                let reg = self.resolve(locals, Bank::I32, *slot)?;
                buffer.emit_opcode(Opcode::IncI32R);
                buffer.emit_byte(reg);
                Ok(())
            }
            Expr::DecI32(slot) => {
                let reg = self.resolve(locals, Bank::I32, *slot)?;
                buffer.emit_opcode(Opcode::DecI32R);
                buffer.emit_byte(reg);
                Ok(())
            }
        }
    }
}
