//! Minimal typed AST.
//!
//! The surface lexer/parser and the type-inference engine are external
//! interfaces; this module is the typed-AST contract the compiler consumes,
//! just enough structure to drive the lowering algorithms it implements
//! (`for` ranges, conditionals, break/continue, intrinsic declarations,
//! typed-immediate arithmetic).

use alloc::{
    string::String,
    vec::Vec,
};

use crate::value::TypedKind;

/// Whether a `for i in a..b..step` range counts up or down. The guard
/// opcode is identical either way; this only selects the `aux` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSign {
    Positive,
    Negative,
}

#[derive(Debug, Clone)]
pub struct ForRange {
    /// The symbolic slot the loop variable is bound to for the duration of
    /// the body; the compiler assigns it a physical typed register.
    pub var: RegSlot,
    pub start: i32,
    pub end: i32,
    pub step: i32,
    pub step_sign: StepSign,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct If {
    /// Slot already holding the typed `bool` result of the condition
    /// expression (computed by a preceding `Stmt::Expr`).
    pub cond: RegSlot,
    pub then_branch: Vec<Stmt>,
    pub else_branch: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    ForRange(ForRange),
    If(If),
    Continue,
    Break,
    Expr(Expr),
}

/// A typed expression. Only the shapes the compiler needs as lowering
/// targets are represented; the type-inference oracle is assumed to
/// have already resolved operand kinds and literal-vs-register shape, so the
/// compiler's "immediate opcode selection" is a direct translation of the
/// AST node it is handed, not a re-derivation of it.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A typed-register multiply by a compile-time-known `i32` literal.
    MulImm { dst: RegSlot, src: RegSlot, imm: i32 },
    /// A typed `i32` equality comparison between two registers.
    EqI32 { dst: RegSlot, lhs: RegSlot, rhs: RegSlot },
    /// In-place typed increment/decrement.
    IncI32(RegSlot),
    DecI32(RegSlot),
}

/// A symbolic reference to a typed-AST local; the compiler resolves this to
/// a physical register id through the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegSlot(pub u32);

#[derive(Debug, Clone)]
pub struct IntrinsicSignature {
    pub param_kinds: Vec<TypedKind>,
    pub return_kind: TypedKind,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// `Some` iff the function carries a `@[core("symbol")]` attribute.
    pub intrinsic: Option<(String, IntrinsicSignature)>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub top_level: Vec<Stmt>,
    pub functions: Vec<Function>,
}
