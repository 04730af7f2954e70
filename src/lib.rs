//! Orus VM: an ahead-of-time-compiled, register-based virtual machine for a
//! statically typed scripting language.
//!
//! The surface lexer/parser, type-inference engine, GC marking algorithm,
//! module file I/O, CLI front-end, and error pretty-printer are external
//! interfaces this crate consumes rather than implements. This
//! crate is the register bytecode compiler and the virtual machine: the
//! bytecode buffer and jump patcher, the dual-bank register allocator, the
//! scope stack, the typed-AST-to-bytecode compiler, the typed-register
//! cache, the dispatch loop and its opcodes, the tagged-union constructor,
//! the hot-loop profiler, the JIT facade and IR, and the module manager.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

extern crate alloc;

pub mod bytecode;
pub mod compiler;
pub mod consts;
pub mod error;
pub mod gc;
pub mod intern;
pub mod jit;
pub mod module;
pub mod value;
pub mod vm;

pub mod prelude {
    //! Re-exports of the crate's primary entry points.
    pub use crate::{
        bytecode::{
            BytecodeBuffer,
            Opcode,
            OperandSize,
            PatchId,
        },
        compiler::{
            ast,
            CompiledModule,
            Compiler,
            ExportKind,
            ModuleExport,
        },
        consts::VmConfig,
        error::{
            DispatchOutcome,
            ErrorKind,
            ErrorObject,
            SourceLocation,
        },
        gc::{
            GcHeap,
            GcRef,
        },
        intern::{
            InternedStr,
            StringInterner,
        },
        jit::{
            collect_parity,
            IrOp,
            IrProgram,
            JitFacade,
            ParityReport,
            Target,
        },
        module::ModuleManager,
        value::{
            EnumInstance,
            TypedKind,
            Value,
        },
        vm::{
            enum_instance::{
                make_tagged_union,
                result_err,
                result_ok,
                TaggedUnionSpec,
            },
            profiler::{
                LoopKey,
                Profiler,
            },
            Interpreter,
            NativeFn,
        },
    };
}
