//! Per-lane program interpreter
//!
//! Each active lane walks the structured operation tree with its own private
//! token slots. Parameter tokens live in [`SharedTokens`] and are visible to
//! every lane of the dispatch.

use super::ops::{self, BinaryOp, CompareOp, Conversion, ShiftOp, UnaryOp};
use crate::error::{BackendError, Result};
use crate::isa::{LabelId, Op, Program, ScalarValue, TokenId, TokenValue, VectorValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Token slots shared by all lanes of a dispatch
pub(crate) type SharedTokens = HashMap<TokenId, Mutex<TokenValue>>;

/// Cooperative dispatch deadline
///
/// Checked at loop back-edges and before each block of lanes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
    timeout: Duration,
}

impl Deadline {
    pub(crate) fn new(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|timeout| Instant::now() + timeout),
            timeout: timeout.unwrap_or_default(),
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        match self.at {
            Some(at) if Instant::now() >= at => Err(BackendError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

/// Interpreter state of one lane
pub(crate) struct Lane<'a> {
    program: &'a Program,
    shared: &'a SharedTokens,
    deadline: &'a Deadline,
    private: HashMap<TokenId, TokenValue>,
    worker_id: u32,
    num_workers: u32,
    /// (previous, current) block labels; `Phi` selects on the previous one
    labels: (LabelId, LabelId),
    operations: u64,
}

impl<'a> Lane<'a> {
    pub(crate) fn new(
        program: &'a Program,
        shared: &'a SharedTokens,
        deadline: &'a Deadline,
        worker_id: u32,
        num_workers: u32,
    ) -> Self {
        Self {
            program,
            shared,
            deadline,
            private: HashMap::new(),
            worker_id,
            num_workers,
            labels: (LabelId::default(), LabelId::default()),
            operations: 0,
        }
    }

    /// Run the whole program, returning the number of operations executed
    pub(crate) fn run(mut self) -> Result<u64> {
        let program = self.program;
        self.execute_block(&program.operation)?;
        Ok(self.operations)
    }

    fn enter(&mut self, label: LabelId) {
        self.labels = (self.labels.1, label);
    }

    fn execute_block(&mut self, ops: &[Op]) -> Result<()> {
        for op in ops {
            self.operations += 1;
            self.execute(op)?;
        }
        Ok(())
    }

    // ============================================================================================
    // Token access
    // ============================================================================================

    fn scalar(&self, token: TokenId) -> Result<ScalarValue> {
        match self.shared.get(&token) {
            Some(slot) => expect_scalar(token, &slot.lock()),
            None => match self.private.get(&token) {
                Some(value) => expect_scalar(token, value),
                None => Err(BackendError::Uninitialized(token.to_string())),
            },
        }
    }

    fn u32(&self, token: TokenId) -> Result<u32> {
        match self.scalar(token)? {
            ScalarValue::U32(value) => Ok(value),
            other => Err(BackendError::type_mismatch("u32", other.data_type())),
        }
    }

    fn condition(&self, token: TokenId) -> Result<bool> {
        match self.scalar(token)? {
            ScalarValue::Bool(value) => Ok(value),
            other => Err(BackendError::type_mismatch("bool", other.data_type())),
        }
    }

    fn write(&mut self, token: TokenId, value: ScalarValue) {
        match self.shared.get(&token) {
            Some(slot) => *slot.lock() = TokenValue::Scalar(value),
            None => {
                self.private.insert(token, TokenValue::Scalar(value));
            }
        }
    }

    fn with_array<R>(&mut self, token: TokenId, f: impl FnOnce(&mut VectorValue) -> Result<R>) -> Result<R> {
        match self.shared.get(&token) {
            Some(slot) => {
                let mut guard = slot.lock();
                expect_vector(token, &mut guard).and_then(f)
            }
            None => match self.private.get_mut(&token) {
                Some(value) => expect_vector(token, value).and_then(f),
                None => Err(BackendError::Uninitialized(token.to_string())),
            },
        }
    }

    fn array_new(&mut self, token: TokenId, len: usize, values: impl FnOnce() -> VectorValue) {
        match self.shared.get(&token) {
            Some(slot) => {
                let mut guard = slot.lock();
                let fresh = values();
                let keep = matches!(&*guard, TokenValue::Vector(existing) if existing.data_type() == fresh.data_type());
                if !keep {
                    tracing::trace!(token = %token, len, "shared_array_allocated");
                    *guard = TokenValue::Vector(fresh);
                }
            }
            None => {
                self.private.insert(token, TokenValue::Vector(values()));
            }
        }
    }

    // ============================================================================================
    // Operations
    // ============================================================================================

    fn execute(&mut self, op: &Op) -> Result<()> {
        match *op {
            Op::Block(ref ops) => self.execute_block(ops)?,
            Op::If(ref cond_ops, cond, label, ref body, end) => {
                self.execute_block(cond_ops)?;
                if self.condition(cond)? {
                    self.enter(label);
                    self.execute_block(body)?;
                }
                self.enter(end);
            }
            Op::IfElse(ref cond_ops, cond, then_label, ref then_body, else_label, ref else_body, end) => {
                self.execute_block(cond_ops)?;
                if self.condition(cond)? {
                    self.enter(then_label);
                    self.execute_block(then_body)?;
                } else {
                    self.enter(else_label);
                    self.execute_block(else_body)?;
                }
                self.enter(end);
            }
            Op::While(cond_label, ref cond_ops, cond, body_label, ref body, end) => {
                loop {
                    self.enter(cond_label);
                    self.execute_block(cond_ops)?;
                    if !self.condition(cond)? {
                        break;
                    }
                    self.enter(body_label);
                    self.execute_block(body)?;
                    self.deadline.check()?;
                }
                self.enter(end);
            }
            Op::Phi(r, a, label_a, b, label_b) => {
                let previous = self.labels.0;
                let source = if previous == label_a {
                    a
                } else if previous == label_b {
                    b
                } else {
                    return Err(BackendError::execution_error(format!(
                        "Phi {}: previous block {} is neither {} nor {}",
                        r, previous, label_a, label_b
                    )));
                };
                let value = self.scalar(source)?;
                self.write(r, value);
            }
            // Lanes of barrier programs run one after another, so every
            // earlier lane has already passed the barrier.
            Op::MemoryBarrier | Op::ControlBarrier => {}

            Op::WorkerId(r) => self.write(r, ScalarValue::U32(self.worker_id)),
            Op::NumWorkers(r) => self.write(r, ScalarValue::U32(self.num_workers)),

            Op::Load(r, a) | Op::Store(r, a) => {
                let value = self.scalar(a)?;
                self.write(r, value);
            }
            Op::Constant(r, value) => self.write(r, value),
            Op::ArrayNew(r, size, ty, _, _) => {
                let len = self.u32(size)? as usize;
                self.array_new(r, len, || VectorValue::zeroed(ty, len));
            }
            Op::ArrayLen(r, a) => {
                let len = self.with_array(a, |values| Ok(values.len()))?;
                let len = u32::try_from(len)
                    .map_err(|_| BackendError::execution_error(format!("array {} is longer than u32::MAX", a)))?;
                self.write(r, ScalarValue::U32(len));
            }
            Op::ArrayLoad(r, a, i) => {
                let index = self.u32(i)?;
                let value = self.with_array(a, |values| {
                    values.get(index as usize).ok_or_else(|| BackendError::IndexOutOfBounds {
                        token: a.to_string(),
                        index,
                        len: values.len(),
                    })
                })?;
                self.write(r, value);
            }
            Op::ArrayStore(a, i, v) => {
                let index = self.u32(i)?;
                let value = self.scalar(v)?;
                self.with_array(a, |values| {
                    if values.set(index as usize, value) {
                        Ok(())
                    } else if index as usize >= values.len() {
                        Err(BackendError::IndexOutOfBounds {
                            token: a.to_string(),
                            index,
                            len: values.len(),
                        })
                    } else {
                        Err(BackendError::type_mismatch(values.data_type(), value.data_type()))
                    }
                })?;
            }

            Op::U32fromF32(r, a) => self.convert(r, a, Conversion::U32fromF32)?,
            Op::I32fromF32(r, a) => self.convert(r, a, Conversion::I32fromF32)?,
            Op::F32fromU32(r, a) => self.convert(r, a, Conversion::F32fromU32)?,
            Op::F32fromI32(r, a) => self.convert(r, a, Conversion::F32fromI32)?,
            Op::I32fromU32(r, a) => self.convert(r, a, Conversion::I32fromU32)?,
            Op::U32fromI32(r, a) => self.convert(r, a, Conversion::U32fromI32)?,

            Op::Add(r, a, b) => self.binary(r, a, b, BinaryOp::Add)?,
            Op::Sub(r, a, b) => self.binary(r, a, b, BinaryOp::Sub)?,
            Op::Mul(r, a, b) => self.binary(r, a, b, BinaryOp::Mul)?,
            Op::Div(r, a, b) => self.binary(r, a, b, BinaryOp::Div)?,
            Op::Rem(r, a, b) => self.binary(r, a, b, BinaryOp::Rem)?,
            Op::BitAnd(r, a, b) => self.binary(r, a, b, BinaryOp::BitAnd)?,
            Op::BitOr(r, a, b) => self.binary(r, a, b, BinaryOp::BitOr)?,
            Op::BitXor(r, a, b) => self.binary(r, a, b, BinaryOp::BitXor)?,
            Op::Neg(r, a) => self.unary(r, a, UnaryOp::Neg)?,
            Op::Not(r, a) => self.unary(r, a, UnaryOp::Not)?,
            Op::Shl(r, a, b) => self.shift(r, a, b, ShiftOp::Shl)?,
            Op::Shr(r, a, b) => self.shift(r, a, b, ShiftOp::Shr)?,

            Op::Eq(r, a, b) => self.compare(r, a, b, CompareOp::Eq)?,
            Op::Ne(r, a, b) => self.compare(r, a, b, CompareOp::Ne)?,
            Op::Lt(r, a, b) => self.compare(r, a, b, CompareOp::Lt)?,
            Op::Le(r, a, b) => self.compare(r, a, b, CompareOp::Le)?,
            Op::Gt(r, a, b) => self.compare(r, a, b, CompareOp::Gt)?,
            Op::Ge(r, a, b) => self.compare(r, a, b, CompareOp::Ge)?,
        }
        Ok(())
    }

    fn convert(&mut self, r: TokenId, a: TokenId, conversion: Conversion) -> Result<()> {
        let value = ops::convert(conversion, self.scalar(a)?)?;
        self.write(r, value);
        Ok(())
    }

    fn binary(&mut self, r: TokenId, a: TokenId, b: TokenId, op: BinaryOp) -> Result<()> {
        let value = ops::binary(op, self.scalar(a)?, self.scalar(b)?)?;
        self.write(r, value);
        Ok(())
    }

    fn unary(&mut self, r: TokenId, a: TokenId, op: UnaryOp) -> Result<()> {
        let value = ops::unary(op, self.scalar(a)?)?;
        self.write(r, value);
        Ok(())
    }

    fn shift(&mut self, r: TokenId, a: TokenId, b: TokenId, op: ShiftOp) -> Result<()> {
        let value = ops::shift(op, self.scalar(a)?, self.scalar(b)?)?;
        self.write(r, value);
        Ok(())
    }

    fn compare(&mut self, r: TokenId, a: TokenId, b: TokenId, op: CompareOp) -> Result<()> {
        let value = ops::compare(op, self.scalar(a)?, self.scalar(b)?)?;
        self.write(r, value);
        Ok(())
    }
}

fn expect_scalar(token: TokenId, value: &TokenValue) -> Result<ScalarValue> {
    match value {
        TokenValue::Scalar(value) => Ok(*value),
        TokenValue::Vector(values) => Err(BackendError::type_mismatch(
            format!("scalar at {}", token),
            format!("array of {}", values.data_type()),
        )),
        TokenValue::Null => Err(BackendError::Uninitialized(token.to_string())),
    }
}

fn expect_vector(token: TokenId, value: &mut TokenValue) -> Result<&mut VectorValue> {
    match value {
        TokenValue::Vector(values) => Ok(values),
        TokenValue::Scalar(value) => Err(BackendError::type_mismatch(
            format!("array at {}", token),
            value.data_type(),
        )),
        TokenValue::Null => Err(BackendError::Uninitialized(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::DataType;

    fn run_single(source: &str, shared: &SharedTokens) -> Result<u64> {
        let program = Program::from_json(source).unwrap();
        let deadline = Deadline::new(None);
        Lane::new(&program, shared, &deadline, 0, 1).run()
    }

    #[test]
    fn test_sum_loop() {
        // acc = 0; i = 0; while i < 5 { acc += i; i += 1 }
        let source = r#"{
            "symbol": {
                "0": {"Variable": "U32"}, "1": {"Variable": "U32"},
                "2": {"Constant": "U32"}, "3": {"Constant": "U32"},
                "4": {"Constant": "Bool"}, "5": {"Constant": "U32"}
            },
            "operation": [
                {"Constant": [2, {"U32": 0}]},
                {"Store": [0, 2]},
                {"Store": [1, 2]},
                {"Constant": [3, {"U32": 5}]},
                {"Constant": [5, {"U32": 1}]},
                {"While": [0, [{"Lt": [4, 1, 3]}], 4, 1, [
                    {"Add": [0, 0, 1]},
                    {"Add": [1, 1, 5]}
                ], 2]}
            ],
            "output": {"acc": 0}
        }"#;

        let mut shared = SharedTokens::new();
        shared.insert(TokenId(0), Mutex::new(TokenValue::Null));
        run_single(source, &shared).unwrap();
        assert_eq!(*shared[&TokenId(0)].lock(), TokenValue::Scalar(ScalarValue::U32(10)));
    }

    #[test]
    fn test_phi_selects_taken_branch() {
        let source = r#"{
            "symbol": {
                "0": {"Constant": "Bool"}, "1": {"Constant": "I32"},
                "2": {"Constant": "I32"}, "3": {"Variable": "I32"}
            },
            "operation": [
                {"Constant": [0, {"Bool": false}]},
                {"IfElse": [[], 0,
                    1, [{"Constant": [1, {"I32": 10}]}],
                    2, [{"Constant": [2, {"I32": -10}]}],
                    3]},
                {"Phi": [3, 1, 1, 2, 2]}
            ],
            "output": {"picked": 3}
        }"#;

        let mut shared = SharedTokens::new();
        shared.insert(TokenId(3), Mutex::new(TokenValue::Null));
        run_single(source, &shared).unwrap();
        assert_eq!(*shared[&TokenId(3)].lock(), TokenValue::Scalar(ScalarValue::I32(-10)));
    }

    #[test]
    fn test_out_of_bounds_store_fails() {
        let source = r#"{
            "symbol": {"0": {"Array": "F32"}, "1": {"Constant": "U32"}, "2": {"Constant": "F32"}},
            "operation": [
                {"Constant": [1, {"U32": 2}]},
                {"ArrayNew": [0, 1, "F32", 0, false]},
                {"Constant": [2, {"F32": 1.0}]},
                {"ArrayStore": [0, 1, 2]}
            ]
        }"#;

        let err = run_single(source, &SharedTokens::new()).unwrap_err();
        assert!(matches!(err, BackendError::IndexOutOfBounds { index: 2, len: 2, .. }));
    }

    #[test]
    fn test_shared_array_new_keeps_bound_storage() {
        let source = r#"{
            "symbol": {"0": {"Array": "U32"}, "1": {"Constant": "U32"}},
            "operation": [
                {"Constant": [1, {"U32": 8}]},
                {"ArrayNew": [0, 1, "U32", 0, true]}
            ]
        }"#;

        let mut shared = SharedTokens::new();
        shared.insert(TokenId(0), Mutex::new(TokenValue::Vector(VectorValue::U32(vec![1, 2]))));
        run_single(source, &shared).unwrap();
        assert_eq!(*shared[&TokenId(0)].lock(), TokenValue::Vector(VectorValue::U32(vec![1, 2])));

        shared.insert(TokenId(0), Mutex::new(TokenValue::Null));
        run_single(source, &shared).unwrap();
        assert_eq!(
            *shared[&TokenId(0)].lock(),
            TokenValue::Vector(VectorValue::zeroed(DataType::U32, 8))
        );
    }

    #[test]
    fn test_uninitialized_read_fails() {
        let source = r#"{
            "symbol": {"0": {"Variable": "U32"}, "1": {"Variable": "U32"}},
            "operation": [{"Load": [0, 1]}]
        }"#;
        let err = run_single(source, &SharedTokens::new()).unwrap_err();
        assert!(matches!(err, BackendError::Uninitialized(ref token) if token == "%1"));
    }

    #[test]
    fn test_operation_count_includes_loop_iterations() {
        let source = r#"{
            "symbol": {"0": {"Constant": "Bool"}},
            "operation": [
                {"Constant": [0, {"Bool": true}]},
                {"If": [[], 0, 1, ["MemoryBarrier", "ControlBarrier"], 2]}
            ]
        }"#;
        assert_eq!(run_single(source, &SharedTokens::new()).unwrap(), 4);
    }

    #[test]
    fn test_deadline_expires() {
        let deadline = Deadline::new(Some(Duration::ZERO));
        assert!(matches!(deadline.check(), Err(BackendError::Timeout { timeout_ms: 0 })));
        assert!(Deadline::new(None).check().is_ok());
    }
}
