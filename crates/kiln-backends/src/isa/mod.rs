//! Program IR (the kiln compute instruction set)
//!
//! Programs are token-based: every value is a numbered token declared in the
//! program's symbol table as a scalar (`Constant`, `Variable`) or an array
//! (`Array`, `ArrayPointer`) of `U32`, `I32`, `F32`, or `Bool`.
//!
//! # Operation Categories
//!
//! - **Structure**: Block, If, IfElse, While, Phi
//! - **Synchronization**: MemoryBarrier, ControlBarrier
//! - **Work items**: WorkerId, NumWorkers
//! - **Memory**: Load, Store, Constant, ArrayNew, ArrayLen, ArrayLoad, ArrayStore
//! - **Conversion**: U32fromF32, I32fromF32, F32fromU32, F32fromI32, I32fromU32, U32fromI32
//! - **Arithmetic/Logic**: Add, Sub, Mul, Div, Rem, Neg, Not, Shl, Shr, BitAnd, BitOr, BitXor
//! - **Comparison**: Eq, Ne, Lt, Le, Gt, Ge

mod compile;
mod program;
mod types;

pub use compile::{compile, compile_program, CompileError, CompiledProgram, Diagnostic, Parameter};
pub use program::{LabelId, Op, Program, ProgramError, ProgramResult, StorageType, TokenId};
pub use types::{DataType, ElementKind, Io, ScalarValue, Shape, TokenType, TokenValue, VectorValue};
