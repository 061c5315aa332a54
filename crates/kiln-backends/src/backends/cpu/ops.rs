//! Scalar operation semantics
//!
//! Integer arithmetic wraps, shift amounts are masked to the operand width,
//! and float-to-integer conversions saturate. Integer division or remainder
//! by zero is an error rather than a panic.

use crate::error::{BackendError, Result};
use crate::isa::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::Div => "Div",
            BinaryOp::Rem => "Rem",
            BinaryOp::BitAnd => "BitAnd",
            BinaryOp::BitOr => "BitOr",
            BinaryOp::BitXor => "BitXor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShiftOp {
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    U32fromF32,
    I32fromF32,
    F32fromU32,
    F32fromI32,
    I32fromU32,
    U32fromI32,
}

macro_rules! integer_binary {
    ($op:expr, $x:expr, $y:expr, $variant:ident) => {{
        let (x, y) = ($x, $y);
        match $op {
            BinaryOp::Add => Ok(ScalarValue::$variant(x.wrapping_add(y))),
            BinaryOp::Sub => Ok(ScalarValue::$variant(x.wrapping_sub(y))),
            BinaryOp::Mul => Ok(ScalarValue::$variant(x.wrapping_mul(y))),
            BinaryOp::Div if y == 0 => Err(BackendError::DivisionByZero($op.name().to_string())),
            BinaryOp::Rem if y == 0 => Err(BackendError::DivisionByZero($op.name().to_string())),
            BinaryOp::Div => Ok(ScalarValue::$variant(x.wrapping_div(y))),
            BinaryOp::Rem => Ok(ScalarValue::$variant(x.wrapping_rem(y))),
            BinaryOp::BitAnd => Ok(ScalarValue::$variant(x & y)),
            BinaryOp::BitOr => Ok(ScalarValue::$variant(x | y)),
            BinaryOp::BitXor => Ok(ScalarValue::$variant(x ^ y)),
        }
    }};
}

/// Evaluate a two-operand arithmetic or bitwise operation
pub(crate) fn binary(op: BinaryOp, a: ScalarValue, b: ScalarValue) -> Result<ScalarValue> {
    match (a, b) {
        (ScalarValue::U32(x), ScalarValue::U32(y)) => integer_binary!(op, x, y, U32),
        (ScalarValue::I32(x), ScalarValue::I32(y)) => integer_binary!(op, x, y, I32),
        (ScalarValue::F32(x), ScalarValue::F32(y)) => match op {
            BinaryOp::Add => Ok(ScalarValue::F32(x + y)),
            BinaryOp::Sub => Ok(ScalarValue::F32(x - y)),
            BinaryOp::Mul => Ok(ScalarValue::F32(x * y)),
            BinaryOp::Div => Ok(ScalarValue::F32(x / y)),
            BinaryOp::Rem => Ok(ScalarValue::F32(x % y)),
            _ => Err(BackendError::unsupported(format!("{} on f32", op.name()))),
        },
        (ScalarValue::Bool(x), ScalarValue::Bool(y)) => match op {
            BinaryOp::BitAnd => Ok(ScalarValue::Bool(x & y)),
            BinaryOp::BitOr => Ok(ScalarValue::Bool(x | y)),
            BinaryOp::BitXor => Ok(ScalarValue::Bool(x ^ y)),
            _ => Err(BackendError::unsupported(format!("{} on bool", op.name()))),
        },
        (a, b) => Err(BackendError::type_mismatch(a.data_type(), b.data_type())),
    }
}

/// Shift `a` by `b`; the amount is masked to 0..32
pub(crate) fn shift(op: ShiftOp, a: ScalarValue, b: ScalarValue) -> Result<ScalarValue> {
    let amount = match b {
        ScalarValue::U32(amount) => amount,
        ScalarValue::I32(amount) => amount as u32,
        other => return Err(BackendError::type_mismatch("integer shift amount", other.data_type())),
    };
    match (op, a) {
        (ShiftOp::Shl, ScalarValue::U32(x)) => Ok(ScalarValue::U32(x.wrapping_shl(amount))),
        (ShiftOp::Shr, ScalarValue::U32(x)) => Ok(ScalarValue::U32(x.wrapping_shr(amount))),
        (ShiftOp::Shl, ScalarValue::I32(x)) => Ok(ScalarValue::I32(x.wrapping_shl(amount))),
        (ShiftOp::Shr, ScalarValue::I32(x)) => Ok(ScalarValue::I32(x.wrapping_shr(amount))),
        (_, other) => Err(BackendError::type_mismatch("integer", other.data_type())),
    }
}

fn ordered<T: PartialOrd>(op: CompareOp, x: T, y: T) -> bool {
    match op {
        CompareOp::Eq => x == y,
        CompareOp::Ne => x != y,
        CompareOp::Lt => x < y,
        CompareOp::Le => x <= y,
        CompareOp::Gt => x > y,
        CompareOp::Ge => x >= y,
    }
}

/// Compare two values of the same type
pub(crate) fn compare(op: CompareOp, a: ScalarValue, b: ScalarValue) -> Result<ScalarValue> {
    let result = match (a, b) {
        (ScalarValue::U32(x), ScalarValue::U32(y)) => ordered(op, x, y),
        (ScalarValue::I32(x), ScalarValue::I32(y)) => ordered(op, x, y),
        (ScalarValue::F32(x), ScalarValue::F32(y)) => ordered(op, x, y),
        (ScalarValue::Bool(x), ScalarValue::Bool(y)) => ordered(op, x, y),
        (a, b) => return Err(BackendError::type_mismatch(a.data_type(), b.data_type())),
    };
    Ok(ScalarValue::Bool(result))
}

pub(crate) fn unary(op: UnaryOp, a: ScalarValue) -> Result<ScalarValue> {
    match (op, a) {
        (UnaryOp::Neg, ScalarValue::I32(x)) => Ok(ScalarValue::I32(x.wrapping_neg())),
        (UnaryOp::Neg, ScalarValue::F32(x)) => Ok(ScalarValue::F32(-x)),
        (UnaryOp::Not, ScalarValue::Bool(x)) => Ok(ScalarValue::Bool(!x)),
        (UnaryOp::Not, ScalarValue::I32(x)) => Ok(ScalarValue::I32(!x)),
        (UnaryOp::Not, ScalarValue::U32(x)) => Ok(ScalarValue::U32(!x)),
        (op, other) => Err(BackendError::unsupported(format!("{:?} on {}", op, other.data_type()))),
    }
}

pub(crate) fn convert(conversion: Conversion, a: ScalarValue) -> Result<ScalarValue> {
    match (conversion, a) {
        (Conversion::U32fromF32, ScalarValue::F32(x)) => Ok(ScalarValue::U32(x as u32)),
        (Conversion::I32fromF32, ScalarValue::F32(x)) => Ok(ScalarValue::I32(x as i32)),
        (Conversion::F32fromU32, ScalarValue::U32(x)) => Ok(ScalarValue::F32(x as f32)),
        (Conversion::F32fromI32, ScalarValue::I32(x)) => Ok(ScalarValue::F32(x as f32)),
        (Conversion::I32fromU32, ScalarValue::U32(x)) => Ok(ScalarValue::I32(x as i32)),
        (Conversion::U32fromI32, ScalarValue::I32(x)) => Ok(ScalarValue::U32(x as u32)),
        (conversion, other) => Err(BackendError::type_mismatch(format!("{:?} operand", conversion), other.data_type())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_eq!(
            binary(BinaryOp::Add, ScalarValue::U32(u32::MAX), ScalarValue::U32(2)).unwrap(),
            ScalarValue::U32(1)
        );
        assert_eq!(
            binary(BinaryOp::Sub, ScalarValue::I32(i32::MIN), ScalarValue::I32(1)).unwrap(),
            ScalarValue::I32(i32::MAX)
        );
        assert_eq!(
            binary(BinaryOp::Div, ScalarValue::I32(i32::MIN), ScalarValue::I32(-1)).unwrap(),
            ScalarValue::I32(i32::MIN)
        );
    }

    #[test]
    fn test_integer_division_by_zero() {
        let err = binary(BinaryOp::Div, ScalarValue::U32(1), ScalarValue::U32(0)).unwrap_err();
        assert!(matches!(err, BackendError::DivisionByZero(ref op) if op == "Div"));

        let err = binary(BinaryOp::Rem, ScalarValue::I32(1), ScalarValue::I32(0)).unwrap_err();
        assert!(matches!(err, BackendError::DivisionByZero(ref op) if op == "Rem"));
    }

    #[test]
    fn test_float_division_by_zero_is_infinite() {
        let value = binary(BinaryOp::Div, ScalarValue::F32(1.0), ScalarValue::F32(0.0)).unwrap();
        assert_eq!(value, ScalarValue::F32(f32::INFINITY));
    }

    #[test]
    fn test_mismatched_operands() {
        assert!(binary(BinaryOp::Add, ScalarValue::U32(1), ScalarValue::F32(1.0)).is_err());
        assert!(compare(CompareOp::Eq, ScalarValue::U32(1), ScalarValue::I32(1)).is_err());
    }

    #[test]
    fn test_shifts_mask_amount() {
        assert_eq!(
            shift(ShiftOp::Shl, ScalarValue::U32(1), ScalarValue::U32(33)).unwrap(),
            ScalarValue::U32(2)
        );
        assert_eq!(
            shift(ShiftOp::Shr, ScalarValue::I32(-8), ScalarValue::I32(1)).unwrap(),
            ScalarValue::I32(-4)
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            compare(CompareOp::Lt, ScalarValue::I32(-1), ScalarValue::I32(0)).unwrap(),
            ScalarValue::Bool(true)
        );
        assert_eq!(
            compare(CompareOp::Ge, ScalarValue::F32(1.5), ScalarValue::F32(2.0)).unwrap(),
            ScalarValue::Bool(false)
        );
        assert_eq!(
            compare(CompareOp::Ne, ScalarValue::Bool(true), ScalarValue::Bool(false)).unwrap(),
            ScalarValue::Bool(true)
        );
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Neg, ScalarValue::I32(5)).unwrap(), ScalarValue::I32(-5));
        assert_eq!(unary(UnaryOp::Not, ScalarValue::U32(0)).unwrap(), ScalarValue::U32(u32::MAX));
        assert!(unary(UnaryOp::Neg, ScalarValue::U32(1)).is_err());
    }

    #[test]
    fn test_conversions_saturate() {
        assert_eq!(
            convert(Conversion::U32fromF32, ScalarValue::F32(-3.5)).unwrap(),
            ScalarValue::U32(0)
        );
        assert_eq!(
            convert(Conversion::I32fromF32, ScalarValue::F32(1e20)).unwrap(),
            ScalarValue::I32(i32::MAX)
        );
        assert_eq!(
            convert(Conversion::U32fromI32, ScalarValue::I32(-1)).unwrap(),
            ScalarValue::U32(u32::MAX)
        );
        assert!(convert(Conversion::F32fromU32, ScalarValue::I32(1)).is_err());
    }
}
