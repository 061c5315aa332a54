//! Program builder
//!
//! Builds [`Program`]s from Rust instead of hand-written JSON source. Every
//! helper declares its result token and appends the operation to the block
//! currently being built; structured control flow takes closures that fill
//! the nested blocks.
//!
//! The builder does not type-check. Programs are checked when they are handed
//! to [`Executor::new_executable_from_program`](crate::Executor::new_executable_from_program)
//! or compiled from [`ProgramBuilder::to_json`] output.
//!
//! # Example
//!
//! ```
//! use kiln_core::builder::ProgramBuilder;
//! use kiln_core::{DataType, Executor, Io};
//!
//! # fn main() -> kiln_core::Result<()> {
//! // output[i] = input[i] * 2
//! let mut b = ProgramBuilder::new();
//! let input = b.input_array("input", DataType::U32);
//! let len = b.array_len(input);
//! let output = b.output_array("output", DataType::U32, len);
//! let i = b.worker_id();
//! let in_range = b.lt(i, len);
//! b.if_then(in_range, |b| {
//!     let value = b.array_load(input, i);
//!     let two = b.constant_u32(2);
//!     let doubled = b.mul(value, two);
//!     b.array_store(output, i, doubled);
//! });
//!
//! let executor = Executor::new()?;
//! let mut executable = executor.new_executable_from_program(b.finish())?;
//! let data = executor.new_resource()?;
//! let result = executor.new_resource()?;
//! data.set_data_array_uint32(&[1, 2, 3])?;
//! executable.bind("input", Io::Input, &data)?;
//! executable.bind("output", Io::Output, &result)?;
//! executable.run()?;
//!
//! assert_eq!(result.get_data_array_uint32()?.as_slice(), &[2, 4, 6]);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use kiln_backends::isa::{LabelId, Op, ScalarValue, StorageType, TokenType};
use kiln_backends::{DataType, Program, TokenId};

/// A declared program token and its type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    id: TokenId,
    ty: TokenType,
}

impl Token {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn token_type(&self) -> TokenType {
        self.ty
    }

    /// Scalar or element type
    pub fn data_type(&self) -> DataType {
        // Builder tokens are never Null
        self.ty.data_type().unwrap_or(DataType::U32)
    }
}

/// Incremental [`Program`] construction
#[derive(Debug)]
pub struct ProgramBuilder {
    program: Program,
    /// Blocks under construction; the first is the top level
    scopes: Vec<Vec<Op>>,
    next_token: u32,
    next_label: u32,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            program: Program::new(),
            scopes: vec![Vec::new()],
            next_token: 0,
            // Label 0 is the block every worker starts in
            next_label: 1,
        }
    }

    fn declare(&mut self, ty: TokenType) -> Token {
        let id = TokenId(self.next_token);
        self.next_token += 1;
        self.program.symbol.insert(id, ty);
        Token { id, ty }
    }

    fn label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    fn emit(&mut self, op: Op) {
        if let Some(block) = self.scopes.last_mut() {
            block.push(op);
        }
    }

    fn block(&mut self, fill: impl FnOnce(&mut Self)) -> Vec<Op> {
        self.scopes.push(Vec::new());
        fill(self);
        self.scopes.pop().unwrap_or_default()
    }

    fn value(&mut self, ty: DataType) -> Token {
        self.declare(TokenType::Constant(ty))
    }

    // ============================================================================================
    // Constants
    // ============================================================================================

    pub fn constant(&mut self, value: ScalarValue) -> Token {
        let token = self.value(value.data_type());
        self.emit(Op::Constant(token.id, value));
        token
    }

    pub fn constant_u32(&mut self, value: u32) -> Token {
        self.constant(ScalarValue::U32(value))
    }

    pub fn constant_i32(&mut self, value: i32) -> Token {
        self.constant(ScalarValue::I32(value))
    }

    pub fn constant_f32(&mut self, value: f32) -> Token {
        self.constant(ScalarValue::F32(value))
    }

    pub fn constant_bool(&mut self, value: bool) -> Token {
        self.constant(ScalarValue::Bool(value))
    }

    // ============================================================================================
    // Parameters and storage
    // ============================================================================================

    /// Scalar input parameter; read it with [`load`](Self::load)
    pub fn input(&mut self, name: &str, ty: DataType) -> Token {
        let token = self.declare(TokenType::Variable(ty));
        self.program.input.insert(name.to_string(), token.id);
        token
    }

    pub fn input_array(&mut self, name: &str, ty: DataType) -> Token {
        let token = self.declare(TokenType::Array(ty));
        self.program.input.insert(name.to_string(), token.id);
        self.program.storage.insert(token.id, StorageType::SharedArray(ty, 0));
        token
    }

    /// Scalar output parameter; write it with [`store`](Self::store)
    pub fn output(&mut self, name: &str, ty: DataType) -> Token {
        let token = self.declare(TokenType::Variable(ty));
        self.program.output.insert(name.to_string(), token.id);
        token
    }

    /// Output array of `size` elements shared by all workers
    pub fn output_array(&mut self, name: &str, ty: DataType, size: Token) -> Token {
        let token = self.declare(TokenType::Array(ty));
        self.program.output.insert(name.to_string(), token.id);
        self.program.storage.insert(token.id, StorageType::SharedArray(ty, 0));
        self.emit(Op::ArrayNew(token.id, size.id, ty, 0, true));
        token
    }

    /// Bind an existing token as an output too (in-place parameters)
    pub fn mark_output(&mut self, name: &str, token: Token) {
        self.program.output.insert(name.to_string(), token.id);
    }

    /// Worker-private mutable scalar
    pub fn variable(&mut self, ty: DataType) -> Token {
        let token = self.declare(TokenType::Variable(ty));
        self.program.storage.insert(token.id, StorageType::Variable(ty));
        token
    }

    /// Worker-private array of `size` zeroed elements
    pub fn private_array(&mut self, ty: DataType, size: Token) -> Token {
        let token = self.declare(TokenType::Array(ty));
        self.program.storage.insert(token.id, StorageType::PrivateArray(ty, 0));
        self.emit(Op::ArrayNew(token.id, size.id, ty, 0, false));
        token
    }

    // ============================================================================================
    // Memory
    // ============================================================================================

    pub fn load(&mut self, variable: Token) -> Token {
        let token = self.value(variable.data_type());
        self.emit(Op::Load(token.id, variable.id));
        token
    }

    pub fn store(&mut self, variable: Token, value: Token) {
        self.emit(Op::Store(variable.id, value.id));
    }

    pub fn worker_id(&mut self) -> Token {
        let token = self.value(DataType::U32);
        self.emit(Op::WorkerId(token.id));
        token
    }

    pub fn num_workers(&mut self) -> Token {
        let token = self.value(DataType::U32);
        self.emit(Op::NumWorkers(token.id));
        token
    }

    pub fn array_len(&mut self, array: Token) -> Token {
        let token = self.value(DataType::U32);
        self.emit(Op::ArrayLen(token.id, array.id));
        token
    }

    pub fn array_load(&mut self, array: Token, index: Token) -> Token {
        let token = self.value(array.data_type());
        self.emit(Op::ArrayLoad(token.id, array.id, index.id));
        token
    }

    pub fn array_store(&mut self, array: Token, index: Token, value: Token) {
        self.emit(Op::ArrayStore(array.id, index.id, value.id));
    }

    // ============================================================================================
    // Arithmetic and logic
    // ============================================================================================

    fn binary(&mut self, op: fn(TokenId, TokenId, TokenId) -> Op, a: Token, b: Token) -> Token {
        let token = self.value(a.data_type());
        self.emit(op(token.id, a.id, b.id));
        token
    }

    fn unary(&mut self, op: fn(TokenId, TokenId) -> Op, ty: DataType, a: Token) -> Token {
        let token = self.value(ty);
        self.emit(op(token.id, a.id));
        token
    }

    fn compare(&mut self, op: fn(TokenId, TokenId, TokenId) -> Op, a: Token, b: Token) -> Token {
        let token = self.value(DataType::Bool);
        self.emit(op(token.id, a.id, b.id));
        token
    }

    pub fn add(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::Add, a, b)
    }

    pub fn sub(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::Sub, a, b)
    }

    pub fn mul(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::Mul, a, b)
    }

    pub fn div(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::Div, a, b)
    }

    pub fn rem(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::Rem, a, b)
    }

    pub fn bit_and(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::BitAnd, a, b)
    }

    pub fn bit_or(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::BitOr, a, b)
    }

    pub fn bit_xor(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::BitXor, a, b)
    }

    /// `a << b`; the result has the type of `a`
    pub fn shl(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::Shl, a, b)
    }

    pub fn shr(&mut self, a: Token, b: Token) -> Token {
        self.binary(Op::Shr, a, b)
    }

    pub fn neg(&mut self, a: Token) -> Token {
        self.unary(Op::Neg, a.data_type(), a)
    }

    pub fn not(&mut self, a: Token) -> Token {
        self.unary(Op::Not, a.data_type(), a)
    }

    pub fn eq(&mut self, a: Token, b: Token) -> Token {
        self.compare(Op::Eq, a, b)
    }

    pub fn ne(&mut self, a: Token, b: Token) -> Token {
        self.compare(Op::Ne, a, b)
    }

    pub fn lt(&mut self, a: Token, b: Token) -> Token {
        self.compare(Op::Lt, a, b)
    }

    pub fn le(&mut self, a: Token, b: Token) -> Token {
        self.compare(Op::Le, a, b)
    }

    pub fn gt(&mut self, a: Token, b: Token) -> Token {
        self.compare(Op::Gt, a, b)
    }

    pub fn ge(&mut self, a: Token, b: Token) -> Token {
        self.compare(Op::Ge, a, b)
    }

    // ============================================================================================
    // Conversions
    // ============================================================================================

    pub fn u32_from_f32(&mut self, a: Token) -> Token {
        self.unary(Op::U32fromF32, DataType::U32, a)
    }

    pub fn i32_from_f32(&mut self, a: Token) -> Token {
        self.unary(Op::I32fromF32, DataType::I32, a)
    }

    pub fn f32_from_u32(&mut self, a: Token) -> Token {
        self.unary(Op::F32fromU32, DataType::F32, a)
    }

    pub fn f32_from_i32(&mut self, a: Token) -> Token {
        self.unary(Op::F32fromI32, DataType::F32, a)
    }

    pub fn i32_from_u32(&mut self, a: Token) -> Token {
        self.unary(Op::I32fromU32, DataType::I32, a)
    }

    pub fn u32_from_i32(&mut self, a: Token) -> Token {
        self.unary(Op::U32fromI32, DataType::U32, a)
    }

    // ============================================================================================
    // Control flow
    // ============================================================================================

    /// Run `body` when `cond` holds
    pub fn if_then(&mut self, cond: Token, body: impl FnOnce(&mut Self)) {
        let label = self.label();
        let ops = self.block(body);
        let end = self.label();
        self.emit(Op::If(Vec::new(), cond.id, label, ops, end));
    }

    /// Two-way branch, returning the labels of the then and else blocks
    ///
    /// The labels select values with [`phi`](Self::phi) after the branch.
    pub fn if_then_else(
        &mut self,
        cond: Token,
        then_body: impl FnOnce(&mut Self),
        else_body: impl FnOnce(&mut Self),
    ) -> (LabelId, LabelId) {
        let then_label = self.label();
        let then_ops = self.block(then_body);
        let else_label = self.label();
        let else_ops = self.block(else_body);
        let end = self.label();
        self.emit(Op::IfElse(Vec::new(), cond.id, then_label, then_ops, else_label, else_ops, end));
        (then_label, else_label)
    }

    /// Pick `a` if `label_a` was the last block entered, otherwise `b`
    pub fn phi(&mut self, a: Token, label_a: LabelId, b: Token, label_b: LabelId) -> Token {
        let token = self.value(a.data_type());
        self.emit(Op::Phi(token.id, a.id, label_a, b.id, label_b));
        token
    }

    /// Loop while the token produced by `cond` holds
    ///
    /// `cond` is re-evaluated before every iteration.
    pub fn while_loop(&mut self, cond: impl FnOnce(&mut Self) -> Token, body: impl FnOnce(&mut Self)) {
        let cond_label = self.label();
        let mut cond_token = None;
        let cond_ops = self.block(|b| cond_token = Some(cond(b)));
        let body_label = self.label();
        let body_ops = self.block(body);
        let end = self.label();
        let cond_id = cond_token.map(|token| token.id).unwrap_or_default();
        self.emit(Op::While(cond_label, cond_ops, cond_id, body_label, body_ops, end));
    }

    pub fn memory_barrier(&mut self) {
        self.emit(Op::MemoryBarrier);
    }

    pub fn control_barrier(&mut self) {
        self.emit(Op::ControlBarrier);
    }

    // ============================================================================================
    // Output
    // ============================================================================================

    pub fn finish(mut self) -> Program {
        self.program.operation = self.scopes.swap_remove(0);
        self.program
    }

    /// Program source text accepted by [`Executor::new_executable`](crate::Executor::new_executable)
    pub fn to_json(&self) -> Result<String> {
        let mut program = self.program.clone();
        program.operation = self.scopes.first().cloned().unwrap_or_default();
        program.to_json().map_err(|err| Error::Backend(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Executor, Io};
    use kiln_backends::compile;

    #[test]
    fn test_tokens_are_numbered_in_order() {
        let mut b = ProgramBuilder::new();
        let x = b.input("x", DataType::F32);
        let one = b.constant_f32(1.0);
        let sum = b.add(x, one);

        assert_eq!(x.id(), TokenId(0));
        assert_eq!(one.id(), TokenId(1));
        assert_eq!(sum.id(), TokenId(2));
        assert_eq!(sum.token_type(), TokenType::Constant(DataType::F32));
    }

    #[test]
    fn test_comparisons_produce_bool() {
        let mut b = ProgramBuilder::new();
        let a = b.constant_i32(-1);
        let c = b.constant_i32(1);
        assert_eq!(b.lt(a, c).data_type(), DataType::Bool);
        assert_eq!(b.f32_from_i32(a).data_type(), DataType::F32);
    }

    #[test]
    fn test_nested_blocks() {
        let mut b = ProgramBuilder::new();
        let t = b.constant_bool(true);
        b.if_then(t, |b| {
            b.control_barrier();
            b.memory_barrier();
        });
        let program = b.finish();

        assert_eq!(program.operation.len(), 2);
        assert_eq!(program.operation_count(), 4);
        assert!(program.uses_barriers());
    }

    #[test]
    fn test_to_json_compiles() {
        let mut b = ProgramBuilder::new();
        let count = b.output("count", DataType::U32);
        let n = b.num_workers();
        b.store(count, n);

        let compiled = compile(&b.to_json().unwrap()).unwrap();
        assert_eq!(compiled.parameters().len(), 1);
        assert!(compiled.parameter("count", Io::Output).is_some());
    }

    #[test]
    fn test_while_loop_sums() {
        // total = 0 + 1 + ... + (limit - 1)
        let mut b = ProgramBuilder::new();
        let limit = b.input("limit", DataType::U32);
        let total = b.output("total", DataType::U32);
        let i = b.variable(DataType::U32);
        let zero = b.constant_u32(0);
        let one = b.constant_u32(1);
        b.store(i, zero);
        b.store(total, zero);
        b.while_loop(
            |b| {
                let current = b.load(i);
                let n = b.load(limit);
                b.lt(current, n)
            },
            |b| {
                let current = b.load(i);
                let acc = b.load(total);
                let acc = b.add(acc, current);
                b.store(total, acc);
                let next = b.add(current, one);
                b.store(i, next);
            },
        );

        let executor = Executor::new().unwrap();
        let mut executable = executor.new_executable_from_program(b.finish()).unwrap();
        let limit_res = executor.new_resource().unwrap();
        let total_res = executor.new_resource().unwrap();
        limit_res.set_uint32(5).unwrap();
        executable.bind("limit", Io::Input, &limit_res).unwrap();
        executable.bind("total", Io::Output, &total_res).unwrap();
        executable.run().unwrap();

        assert_eq!(total_res.get_uint32().unwrap(), 10);
    }

    #[test]
    fn test_phi_after_branch() {
        let mut b = ProgramBuilder::new();
        let x = b.input("x", DataType::I32);
        let sign = b.output("sign", DataType::I32);
        let value = b.load(x);
        let zero = b.constant_i32(0);
        let negative = b.lt(value, zero);

        let mut minus = None;
        let mut plus = None;
        let (then_label, else_label) = b.if_then_else(
            negative,
            |b| minus = Some(b.constant_i32(-1)),
            |b| plus = Some(b.constant_i32(1)),
        );
        let picked = b.phi(minus.unwrap(), then_label, plus.unwrap(), else_label);
        b.store(sign, picked);

        let executor = Executor::new().unwrap();
        let mut executable = executor.new_executable_from_program(b.finish()).unwrap();
        let input = executor.new_resource().unwrap();
        let output = executor.new_resource().unwrap();
        executable.bind("x", Io::Input, &input).unwrap();
        executable.bind("sign", Io::Output, &output).unwrap();

        input.set_int32(-7).unwrap();
        executable.run().unwrap();
        assert_eq!(output.get_int32().unwrap(), -1);

        input.set_int32(7).unwrap();
        executable.run().unwrap();
        assert_eq!(output.get_int32().unwrap(), 1);
    }
}
