//! Program compilation: parsing plus whole-program type checking
//!
//! [`compile`] never stops at the first problem. Every diagnostic found is
//! collected, each tagged with the path of the offending operation
//! (`operation[2].While.body[0]`) or parameter (`input.a`).

use super::program::{Op, Program, TokenId};
use super::types::{DataType, ElementKind, Io, Shape, TokenType};
use std::collections::HashMap;
use std::fmt;

const NUMERIC: &[DataType] = &[DataType::I32, DataType::U32, DataType::F32];
const INTEGER: &[DataType] = &[DataType::I32, DataType::U32];
const BITWISE: &[DataType] = &[DataType::Bool, DataType::I32, DataType::U32];
const SIGNED: &[DataType] = &[DataType::I32, DataType::F32];
const ANY: &[DataType] = &[DataType::Bool, DataType::I32, DataType::U32, DataType::F32];

/// A single compiler finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Location in the program document
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Compilation failure carrying every diagnostic found
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render_diagnostics(.diagnostics))]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let lines: Vec<String> = diagnostics.iter().map(Diagnostic::to_string).collect();
    format!("{} diagnostic(s): {}", diagnostics.len(), lines.join("; "))
}

/// A named input or output of a compiled program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub io: Io,
    pub token: TokenId,
    pub shape: Shape,
    pub kind: ElementKind,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}` ({} {})", self.io, self.name, self.kind, self.shape)
    }
}

/// A type-checked program ready for dispatch
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    program: Program,
    parameters: Vec<Parameter>,
    uses_barriers: bool,
    operation_count: usize,
}

impl CompiledProgram {
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Declared parameters, inputs first, each group sorted by name
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up a parameter by name and direction
    pub fn parameter(&self, name: &str, io: Io) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.io == io && p.name == name)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.io == Io::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.io == Io::Output)
    }

    pub fn uses_barriers(&self) -> bool {
        self.uses_barriers
    }

    /// Static operation count, nested blocks included
    pub fn operation_count(&self) -> usize {
        self.operation_count
    }
}

/// Parse and type-check program source text
///
/// # Example
///
/// ```
/// use kiln_backends::isa::{compile, Io};
///
/// let compiled = compile(r#"{
///     "symbol": {"0": {"Array": "F32"}},
///     "input": {"data": 0}
/// }"#).unwrap();
/// assert!(compiled.parameter("data", Io::Input).is_some());
///
/// let err = compile(r#"{"input": {"data": 7}}"#).unwrap_err();
/// assert_eq!(err.diagnostics[0].path, "input.data");
/// ```
pub fn compile(source: &str) -> Result<CompiledProgram, CompileError> {
    let program = Program::from_json(source).map_err(|err| CompileError {
        diagnostics: vec![Diagnostic::new("source", err.to_string())],
    })?;
    compile_program(program)
}

/// Type-check an already parsed program
pub fn compile_program(program: Program) -> Result<CompiledProgram, CompileError> {
    let mut checker = Checker {
        program: &program,
        diagnostics: Vec::new(),
    };
    checker.check_ops(&program.operation, "operation");
    let parameters = checker.check_parameters();
    let diagnostics = checker.diagnostics;

    if !diagnostics.is_empty() {
        tracing::debug!(diagnostics = diagnostics.len(), "program_rejected");
        return Err(CompileError { diagnostics });
    }

    let uses_barriers = program.uses_barriers();
    let operation_count = program.operation_count();
    Ok(CompiledProgram {
        program,
        parameters,
        uses_barriers,
        operation_count,
    })
}

struct Checker<'p> {
    program: &'p Program,
    diagnostics: Vec<Diagnostic>,
}

impl<'p> Checker<'p> {
    fn report(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(path, message));
    }

    fn check_ops(&mut self, ops: &[Op], path: &str) {
        for (index, op) in ops.iter().enumerate() {
            let here = format!("{}[{}]", path, index);
            self.check_op(op, &here);
            for (field, block) in op.blocks() {
                self.check_ops(block, &format!("{}.{}.{}", here, op.name(), field));
            }
        }
    }

    fn declared(&mut self, token: TokenId, path: &str) -> Option<TokenType> {
        match self.program.token_type(token) {
            None => {
                self.report(path, format!("token {} is not declared", token));
                None
            }
            Some(TokenType::Null) => {
                self.report(path, format!("token {} is declared null", token));
                None
            }
            Some(ty) => Some(ty),
        }
    }

    fn scalar(&mut self, token: TokenId, path: &str) -> Option<DataType> {
        match self.declared(token, path)? {
            TokenType::Constant(ty) | TokenType::Variable(ty) => Some(ty),
            other => {
                self.report(path, format!("token {} is {}, expected a scalar", token, other));
                None
            }
        }
    }

    fn array(&mut self, token: TokenId, path: &str) -> Option<DataType> {
        match self.declared(token, path)? {
            TokenType::Array(ty) | TokenType::ArrayPointer(ty) => Some(ty),
            other => {
                self.report(path, format!("token {} is {}, expected an array", token, other));
                None
            }
        }
    }

    fn expect(&mut self, token: TokenId, actual: Option<DataType>, expected: DataType, path: &str) {
        if let Some(actual) = actual {
            if actual != expected {
                self.report(path, format!("token {} has type {}, expected {}", token, actual, expected));
            }
        }
    }

    fn expect_same(&mut self, token: TokenId, actual: Option<DataType>, other: Option<DataType>, path: &str) {
        if let Some(other) = other {
            self.expect(token, actual, other, path);
        }
    }

    fn expect_in(&mut self, token: TokenId, actual: Option<DataType>, allowed: &[DataType], path: &str) {
        if let Some(actual) = actual {
            if !allowed.contains(&actual) {
                self.report(path, format!("token {} has type {}, which this operation does not accept", token, actual));
            }
        }
    }

    fn index(&mut self, token: TokenId, path: &str) {
        let ty = self.scalar(token, path);
        self.expect(token, ty, DataType::U32, path);
    }

    fn condition(&mut self, token: TokenId, path: &str) {
        let ty = self.scalar(token, path);
        self.expect(token, ty, DataType::Bool, path);
    }

    fn convert(&mut self, r: TokenId, a: TokenId, to: DataType, from: DataType, path: &str) {
        let rt = self.scalar(r, path);
        self.expect(r, rt, to, path);
        let at = self.scalar(a, path);
        self.expect(a, at, from, path);
    }

    fn unary(&mut self, r: TokenId, a: TokenId, allowed: &[DataType], path: &str) {
        let at = self.scalar(a, path);
        self.expect_in(a, at, allowed, path);
        let rt = self.scalar(r, path);
        self.expect_same(r, rt, at, path);
    }

    fn binary(&mut self, r: TokenId, a: TokenId, b: TokenId, allowed: &[DataType], path: &str) {
        let at = self.scalar(a, path);
        self.expect_in(a, at, allowed, path);
        let bt = self.scalar(b, path);
        self.expect_same(b, bt, at, path);
        let rt = self.scalar(r, path);
        self.expect_same(r, rt, at, path);
    }

    fn shift(&mut self, r: TokenId, a: TokenId, b: TokenId, path: &str) {
        let at = self.scalar(a, path);
        self.expect_in(a, at, INTEGER, path);
        let bt = self.scalar(b, path);
        self.expect_in(b, bt, INTEGER, path);
        let rt = self.scalar(r, path);
        self.expect_same(r, rt, at, path);
    }

    fn compare(&mut self, r: TokenId, a: TokenId, b: TokenId, allowed: &[DataType], path: &str) {
        let at = self.scalar(a, path);
        self.expect_in(a, at, allowed, path);
        let bt = self.scalar(b, path);
        self.expect_same(b, bt, at, path);
        self.condition(r, path);
    }

    fn check_op(&mut self, op: &Op, path: &str) {
        match *op {
            Op::Block(_) | Op::MemoryBarrier | Op::ControlBarrier => {}
            Op::If(_, cond, ..) | Op::IfElse(_, cond, ..) | Op::While(_, _, cond, ..) => self.condition(cond, path),
            Op::Phi(r, a, _, b, _) => {
                let at = self.scalar(a, path);
                let bt = self.scalar(b, path);
                self.expect_same(b, bt, at, path);
                let rt = self.scalar(r, path);
                self.expect_same(r, rt, at, path);
            }
            Op::WorkerId(r) | Op::NumWorkers(r) => self.index(r, path),
            Op::Load(r, a) | Op::Store(r, a) => {
                let rt = self.scalar(r, path);
                let at = self.scalar(a, path);
                self.expect_same(a, at, rt, path);
            }
            Op::Constant(r, value) => {
                let rt = self.scalar(r, path);
                self.expect(r, rt, value.data_type(), path);
            }
            Op::ArrayNew(r, size, ty, _, _) => {
                let rt = self.array(r, path);
                self.expect(r, rt, ty, path);
                self.index(size, path);
            }
            Op::ArrayLen(r, a) => {
                self.index(r, path);
                self.array(a, path);
            }
            Op::ArrayLoad(r, a, i) => {
                let at = self.array(a, path);
                let rt = self.scalar(r, path);
                self.expect_same(r, rt, at, path);
                self.index(i, path);
            }
            Op::ArrayStore(a, i, v) => {
                let at = self.array(a, path);
                let vt = self.scalar(v, path);
                self.expect_same(v, vt, at, path);
                self.index(i, path);
            }
            Op::U32fromF32(r, a) => self.convert(r, a, DataType::U32, DataType::F32, path),
            Op::I32fromF32(r, a) => self.convert(r, a, DataType::I32, DataType::F32, path),
            Op::F32fromU32(r, a) => self.convert(r, a, DataType::F32, DataType::U32, path),
            Op::F32fromI32(r, a) => self.convert(r, a, DataType::F32, DataType::I32, path),
            Op::I32fromU32(r, a) => self.convert(r, a, DataType::I32, DataType::U32, path),
            Op::U32fromI32(r, a) => self.convert(r, a, DataType::U32, DataType::I32, path),
            Op::Add(r, a, b) | Op::Sub(r, a, b) | Op::Mul(r, a, b) | Op::Div(r, a, b) | Op::Rem(r, a, b) => {
                self.binary(r, a, b, NUMERIC, path)
            }
            Op::Neg(r, a) => self.unary(r, a, SIGNED, path),
            Op::Not(r, a) => self.unary(r, a, BITWISE, path),
            Op::Shl(r, a, b) | Op::Shr(r, a, b) => self.shift(r, a, b, path),
            Op::BitAnd(r, a, b) | Op::BitOr(r, a, b) | Op::BitXor(r, a, b) => self.binary(r, a, b, BITWISE, path),
            Op::Eq(r, a, b) | Op::Ne(r, a, b) => self.compare(r, a, b, ANY, path),
            Op::Lt(r, a, b) | Op::Le(r, a, b) | Op::Gt(r, a, b) | Op::Ge(r, a, b) => {
                self.compare(r, a, b, NUMERIC, path)
            }
        }
    }

    fn check_parameters(&mut self) -> Vec<Parameter> {
        let program = self.program;
        let mut parameters = Vec::new();

        for (io, table) in [(Io::Input, &program.input), (Io::Output, &program.output)] {
            // Buffers are routed by (token, io); two names on one token would share a buffer
            let mut owners: HashMap<TokenId, &str> = HashMap::new();
            for (name, &token) in table {
                let path = format!("{}.{}", io, name);
                if let Some(owner) = owners.insert(token, name) {
                    self.report(&path, format!("token {} is already parameter {}.{}", token, io, owner));
                    owners.insert(token, owner);
                    continue;
                }
                let Some(ty) = self.declared(token, &path) else {
                    continue;
                };
                let (Some(shape), Some(data_type)) = (ty.shape(), ty.data_type()) else {
                    continue;
                };
                let Some(kind) = data_type.element_kind() else {
                    self.report(&path, format!("parameter `{}` has type bool, which no resource can hold", name));
                    continue;
                };
                parameters.push(Parameter {
                    name: name.clone(),
                    io,
                    token,
                    shape,
                    kind,
                });
            }
        }

        parameters
    }
}
