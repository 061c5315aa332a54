//! Program IR and its JSON source format

use super::types::{DataType, ScalarValue, TokenType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Errors that can occur when reading or writing program source
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProgramError {
    /// Source text is not a well-formed program document
    #[error("malformed program source at line {line}, column {column}: {message}")]
    Parse { line: usize, column: usize, message: String },

    /// Program could not be rendered as JSON
    #[error("failed to serialize program: {0}")]
    Serialize(String),
}

/// Result type for program operations
pub type ProgramResult<T> = std::result::Result<T, ProgramError>;

/// Identifier of a token (SSA value, variable, or array) in a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u32);

impl TokenId {
    pub const fn new(id: u32) -> Self {
        TokenId(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Identifier of a structured block, referenced by `Phi`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub u32);

impl LabelId {
    pub const fn new(id: u32) -> Self {
        LabelId(id)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Storage class hint recorded by program producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    Variable(DataType),
    /// Array shared by all workers (element type, maximum size; 0 = unbounded)
    SharedArray(DataType, u32),
    /// Array private to each worker (element type, maximum size)
    PrivateArray(DataType, u32),
}

/// A single IR operation
///
/// Operands are token ids. Results come first, e.g. `Add(r, a, b)` computes
/// `r = a + b`. Structured control flow carries its nested blocks inline:
///
/// - `If(cond_ops, cond, label, body, end_label)`
/// - `IfElse(cond_ops, cond, then_label, then_body, else_label, else_body, end_label)`
/// - `While(cond_label, cond_ops, cond, body_label, body, end_label)`
/// - `Phi(r, a, label_a, b, label_b)` picks `a` when `label_a` was the most
///   recently entered block, otherwise `b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Block(Vec<Op>),
    If(Vec<Op>, TokenId, LabelId, Vec<Op>, LabelId),
    IfElse(Vec<Op>, TokenId, LabelId, Vec<Op>, LabelId, Vec<Op>, LabelId),
    While(LabelId, Vec<Op>, TokenId, LabelId, Vec<Op>, LabelId),
    Phi(TokenId, TokenId, LabelId, TokenId, LabelId),
    MemoryBarrier,
    ControlBarrier,

    WorkerId(TokenId),
    NumWorkers(TokenId),

    Load(TokenId, TokenId),
    Store(TokenId, TokenId),
    Constant(TokenId, ScalarValue),
    /// `ArrayNew(r, size, element_type, max_size, shared)`
    ArrayNew(TokenId, TokenId, DataType, u32, bool),
    ArrayLen(TokenId, TokenId),
    ArrayLoad(TokenId, TokenId, TokenId),
    ArrayStore(TokenId, TokenId, TokenId),

    U32fromF32(TokenId, TokenId),
    I32fromF32(TokenId, TokenId),
    F32fromU32(TokenId, TokenId),
    F32fromI32(TokenId, TokenId),
    I32fromU32(TokenId, TokenId),
    U32fromI32(TokenId, TokenId),

    Add(TokenId, TokenId, TokenId),
    Sub(TokenId, TokenId, TokenId),
    Mul(TokenId, TokenId, TokenId),
    Div(TokenId, TokenId, TokenId),
    Rem(TokenId, TokenId, TokenId),
    Neg(TokenId, TokenId),
    Not(TokenId, TokenId),
    Shl(TokenId, TokenId, TokenId),
    Shr(TokenId, TokenId, TokenId),
    BitAnd(TokenId, TokenId, TokenId),
    BitOr(TokenId, TokenId, TokenId),
    BitXor(TokenId, TokenId, TokenId),

    Eq(TokenId, TokenId, TokenId),
    Ne(TokenId, TokenId, TokenId),
    Lt(TokenId, TokenId, TokenId),
    Le(TokenId, TokenId, TokenId),
    Gt(TokenId, TokenId, TokenId),
    Ge(TokenId, TokenId, TokenId),
}

impl Op {
    /// Operation mnemonic, as written in source
    pub fn name(&self) -> &'static str {
        match self {
            Op::Block(_) => "Block",
            Op::If(..) => "If",
            Op::IfElse(..) => "IfElse",
            Op::While(..) => "While",
            Op::Phi(..) => "Phi",
            Op::MemoryBarrier => "MemoryBarrier",
            Op::ControlBarrier => "ControlBarrier",
            Op::WorkerId(_) => "WorkerId",
            Op::NumWorkers(_) => "NumWorkers",
            Op::Load(..) => "Load",
            Op::Store(..) => "Store",
            Op::Constant(..) => "Constant",
            Op::ArrayNew(..) => "ArrayNew",
            Op::ArrayLen(..) => "ArrayLen",
            Op::ArrayLoad(..) => "ArrayLoad",
            Op::ArrayStore(..) => "ArrayStore",
            Op::U32fromF32(..) => "U32fromF32",
            Op::I32fromF32(..) => "I32fromF32",
            Op::F32fromU32(..) => "F32fromU32",
            Op::F32fromI32(..) => "F32fromI32",
            Op::I32fromU32(..) => "I32fromU32",
            Op::U32fromI32(..) => "U32fromI32",
            Op::Add(..) => "Add",
            Op::Sub(..) => "Sub",
            Op::Mul(..) => "Mul",
            Op::Div(..) => "Div",
            Op::Rem(..) => "Rem",
            Op::Neg(..) => "Neg",
            Op::Not(..) => "Not",
            Op::Shl(..) => "Shl",
            Op::Shr(..) => "Shr",
            Op::BitAnd(..) => "BitAnd",
            Op::BitOr(..) => "BitOr",
            Op::BitXor(..) => "BitXor",
            Op::Eq(..) => "Eq",
            Op::Ne(..) => "Ne",
            Op::Lt(..) => "Lt",
            Op::Le(..) => "Le",
            Op::Gt(..) => "Gt",
            Op::Ge(..) => "Ge",
        }
    }

    /// Nested blocks with the field name used in diagnostic paths
    pub fn blocks(&self) -> Vec<(&'static str, &[Op])> {
        match self {
            Op::Block(ops) => vec![("ops", ops.as_slice())],
            Op::If(cond_ops, _, _, body, _) => vec![("cond", cond_ops.as_slice()), ("body", body.as_slice())],
            Op::IfElse(cond_ops, _, _, then_body, _, else_body, _) => {
                vec![("cond", cond_ops.as_slice()), ("then", then_body.as_slice()), ("else", else_body.as_slice())]
            }
            Op::While(_, cond_ops, _, _, body, _) => vec![("cond", cond_ops.as_slice()), ("body", body.as_slice())],
            _ => Vec::new(),
        }
    }

    /// Check if this is a synchronization operation
    pub fn is_barrier(&self) -> bool {
        matches!(self, Op::MemoryBarrier | Op::ControlBarrier)
    }
}

/// A compute program: token declarations, operations, and named parameters
///
/// # Example
///
/// ```
/// use kiln_backends::isa::{Program, TokenId};
///
/// let source = r#"{
///     "symbol": {"0": {"Variable": "U32"}},
///     "operation": [{"WorkerId": 0}],
///     "output": {"id": 0}
/// }"#;
///
/// let program = Program::from_json(source).unwrap();
/// assert_eq!(program.output["id"], TokenId(0));
/// assert_eq!(program.operation_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub symbol: BTreeMap<TokenId, TokenType>,
    #[serde(default)]
    pub operation: Vec<Op>,
    #[serde(default)]
    pub storage: BTreeMap<TokenId, StorageType>,
    #[serde(default)]
    pub input: BTreeMap<String, TokenId>,
    #[serde(default)]
    pub output: BTreeMap<String, TokenId>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse program source text
    pub fn from_json(source: &str) -> ProgramResult<Self> {
        serde_json::from_str(source).map_err(|err| ProgramError::Parse {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        })
    }

    /// Render the program as source text
    pub fn to_json(&self) -> ProgramResult<String> {
        serde_json::to_string(self).map_err(|err| ProgramError::Serialize(err.to_string()))
    }

    /// Declared type of `token`
    pub fn token_type(&self, token: TokenId) -> Option<TokenType> {
        self.symbol.get(&token).copied()
    }

    /// Total number of operations, nested blocks included
    pub fn operation_count(&self) -> usize {
        count_ops(&self.operation)
    }

    /// Check if any operation, at any depth, is a barrier
    pub fn uses_barriers(&self) -> bool {
        any_barrier(&self.operation)
    }
}

fn count_ops(ops: &[Op]) -> usize {
    ops.iter()
        .map(|op| 1 + op.blocks().into_iter().map(|(_, block)| count_ops(block)).sum::<usize>())
        .sum()
}

fn any_barrier(ops: &[Op]) -> bool {
    ops.iter()
        .any(|op| op.is_barrier() || op.blocks().into_iter().any(|(_, block)| any_barrier(block)))
}
