//! Data types and runtime values of the program IR
//!
//! [`DataType`] is the scalar type of an IR token, [`ElementKind`] the
//! narrower set of element types a resource can hold. Runtime values are
//! [`ScalarValue`], [`VectorValue`], and the token slot [`TokenValue`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar data type of an IR token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    I32,
    U32,
    F32,
}

impl DataType {
    /// Element kind a resource would use for this type (`None` for `Bool`)
    pub const fn element_kind(self) -> Option<ElementKind> {
        match self {
            DataType::Bool => None,
            DataType::I32 => Some(ElementKind::I32),
            DataType::U32 => Some(ElementKind::U32),
            DataType::F32 => Some(ElementKind::F32),
        }
    }

    /// Check if this is an integer type
    pub const fn is_integer(self) -> bool {
        matches!(self, DataType::I32 | DataType::U32)
    }

    /// Check if this type supports arithmetic
    pub const fn is_numeric(self) -> bool {
        !matches!(self, DataType::Bool)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::I32 => "i32",
            DataType::U32 => "u32",
            DataType::F32 => "f32",
        };
        write!(f, "{}", name)
    }
}

/// Element kind of a resource: unsigned, signed, or floating-point 32-bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    U32,
    I32,
    F32,
}

impl ElementKind {
    /// IR data type carrying this kind
    pub const fn data_type(self) -> DataType {
        match self {
            ElementKind::U32 => DataType::U32,
            ElementKind::I32 => DataType::I32,
            ElementKind::F32 => DataType::F32,
        }
    }

    /// Size of one element in bytes
    pub const fn size_bytes(self) -> usize {
        4
    }

    /// Name used in messages and the C ABI (`uint32`, `int32`, `float32`)
    pub const fn name(self) -> &'static str {
        match self {
            ElementKind::U32 => "uint32",
            ElementKind::I32 => "int32",
            ElementKind::F32 => "float32",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a value: a single scalar or a variable-length array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Array,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => f.write_str("scalar"),
            Shape::Array => f.write_str("array"),
        }
    }
}

/// Direction of a program parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Io {
    Input,
    Output,
}

impl fmt::Display for Io {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Io::Input => f.write_str("input"),
            Io::Output => f.write_str("output"),
        }
    }
}

/// Declared type of an IR token
///
/// `Constant` and `Variable` are scalars, `Array` and `ArrayPointer` arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    Constant(DataType),
    Variable(DataType),
    ArrayPointer(DataType),
    Array(DataType),
    Null,
}

impl TokenType {
    /// Element type, `None` for `Null`
    pub const fn data_type(self) -> Option<DataType> {
        match self {
            TokenType::Constant(ty) | TokenType::Variable(ty) | TokenType::ArrayPointer(ty) | TokenType::Array(ty) => {
                Some(ty)
            }
            TokenType::Null => None,
        }
    }

    /// Shape, `None` for `Null`
    pub const fn shape(self) -> Option<Shape> {
        match self {
            TokenType::Constant(_) | TokenType::Variable(_) => Some(Shape::Scalar),
            TokenType::ArrayPointer(_) | TokenType::Array(_) => Some(Shape::Array),
            TokenType::Null => None,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Constant(ty) => write!(f, "constant {}", ty),
            TokenType::Variable(ty) => write!(f, "variable {}", ty),
            TokenType::ArrayPointer(ty) => write!(f, "array pointer {}", ty),
            TokenType::Array(ty) => write!(f, "array {}", ty),
            TokenType::Null => f.write_str("null"),
        }
    }
}

/// A scalar runtime value
///
/// Serialized externally tagged, e.g. `{"U32": 5}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
}

impl ScalarValue {
    /// Type of this value
    pub const fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Bool(_) => DataType::Bool,
            ScalarValue::I32(_) => DataType::I32,
            ScalarValue::U32(_) => DataType::U32,
            ScalarValue::F32(_) => DataType::F32,
        }
    }

    /// Native-endian encoding; `Bool` is a 32-bit 0/1 word
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            ScalarValue::Bool(v) => (v as u32).to_ne_bytes(),
            ScalarValue::I32(v) => v.to_ne_bytes(),
            ScalarValue::U32(v) => v.to_ne_bytes(),
            ScalarValue::F32(v) => v.to_ne_bytes(),
        }
    }

    /// Decode a value of `kind` from exactly four bytes
    pub fn from_bytes(kind: ElementKind, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != kind.size_bytes() {
            return None;
        }
        Some(match kind {
            ElementKind::U32 => ScalarValue::U32(bytemuck::pod_read_unaligned(bytes)),
            ElementKind::I32 => ScalarValue::I32(bytemuck::pod_read_unaligned(bytes)),
            ElementKind::F32 => ScalarValue::F32(bytemuck::pod_read_unaligned(bytes)),
        })
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::I32(v) => write!(f, "{}i32", v),
            ScalarValue::U32(v) => write!(f, "{}u32", v),
            ScalarValue::F32(v) => write!(f, "{}f32", v),
        }
    }
}

/// An array runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum VectorValue {
    Bool(Vec<bool>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl VectorValue {
    /// Zero-filled array of `len` elements
    pub fn zeroed(ty: DataType, len: usize) -> Self {
        match ty {
            DataType::Bool => VectorValue::Bool(vec![false; len]),
            DataType::I32 => VectorValue::I32(vec![0; len]),
            DataType::U32 => VectorValue::U32(vec![0; len]),
            DataType::F32 => VectorValue::F32(vec![0.0; len]),
        }
    }

    /// Element type
    pub const fn data_type(&self) -> DataType {
        match self {
            VectorValue::Bool(_) => DataType::Bool,
            VectorValue::I32(_) => DataType::I32,
            VectorValue::U32(_) => DataType::U32,
            VectorValue::F32(_) => DataType::F32,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            VectorValue::Bool(v) => v.len(),
            VectorValue::I32(v) => v.len(),
            VectorValue::U32(v) => v.len(),
            VectorValue::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<ScalarValue> {
        match self {
            VectorValue::Bool(v) => v.get(index).copied().map(ScalarValue::Bool),
            VectorValue::I32(v) => v.get(index).copied().map(ScalarValue::I32),
            VectorValue::U32(v) => v.get(index).copied().map(ScalarValue::U32),
            VectorValue::F32(v) => v.get(index).copied().map(ScalarValue::F32),
        }
    }

    /// Overwrite the element at `index`
    ///
    /// Returns `false` without writing when `index` is out of bounds or
    /// `value` has a different type.
    pub fn set(&mut self, index: usize, value: ScalarValue) -> bool {
        match (self, value) {
            (VectorValue::Bool(v), ScalarValue::Bool(x)) => v.get_mut(index).map(|slot| *slot = x).is_some(),
            (VectorValue::I32(v), ScalarValue::I32(x)) => v.get_mut(index).map(|slot| *slot = x).is_some(),
            (VectorValue::U32(v), ScalarValue::U32(x)) => v.get_mut(index).map(|slot| *slot = x).is_some(),
            (VectorValue::F32(v), ScalarValue::F32(x)) => v.get_mut(index).map(|slot| *slot = x).is_some(),
            _ => false,
        }
    }

    /// Native-endian encoding of all elements
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            VectorValue::Bool(v) => v.iter().flat_map(|b| (*b as u32).to_ne_bytes()).collect(),
            VectorValue::I32(v) => bytemuck::cast_slice(v).to_vec(),
            VectorValue::U32(v) => bytemuck::cast_slice(v).to_vec(),
            VectorValue::F32(v) => bytemuck::cast_slice(v).to_vec(),
        }
    }

    /// Decode an array of `kind` from a byte buffer whose length is a
    /// multiple of the element size
    pub fn from_bytes(kind: ElementKind, bytes: &[u8]) -> Option<Self> {
        if bytes.len() % kind.size_bytes() != 0 {
            return None;
        }
        let words = bytes.chunks_exact(kind.size_bytes());
        Some(match kind {
            ElementKind::U32 => VectorValue::U32(words.map(bytemuck::pod_read_unaligned::<u32>).collect()),
            ElementKind::I32 => VectorValue::I32(words.map(bytemuck::pod_read_unaligned::<i32>).collect()),
            ElementKind::F32 => VectorValue::F32(words.map(bytemuck::pod_read_unaligned::<f32>).collect()),
        })
    }
}

/// Contents of a token slot during execution
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TokenValue {
    Scalar(ScalarValue),
    Vector(VectorValue),
    #[default]
    Null,
}

impl TokenValue {
    /// Decode a device buffer holding a value of `kind` and `shape`
    pub fn from_bytes(kind: ElementKind, shape: Shape, bytes: &[u8]) -> Option<Self> {
        match shape {
            Shape::Scalar => ScalarValue::from_bytes(kind, bytes).map(TokenValue::Scalar),
            Shape::Array => VectorValue::from_bytes(kind, bytes).map(TokenValue::Vector),
        }
    }

    /// Encode for a device buffer, `None` for `Null`
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            TokenValue::Scalar(value) => Some(value.to_bytes().to_vec()),
            TokenValue::Vector(values) => Some(values.to_bytes()),
            TokenValue::Null => None,
        }
    }

    /// Declared-type view of this value (`Variable`/`Array`)
    pub fn token_type(&self) -> TokenType {
        match self {
            TokenValue::Scalar(value) => TokenType::Variable(value.data_type()),
            TokenValue::Vector(values) => TokenType::Array(values.data_type()),
            TokenValue::Null => TokenType::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_kind_mapping() {
        assert_eq!(DataType::U32.element_kind(), Some(ElementKind::U32));
        assert_eq!(DataType::Bool.element_kind(), None);
        assert_eq!(ElementKind::F32.data_type(), DataType::F32);
        assert_eq!(ElementKind::I32.to_string(), "int32");
    }

    #[test]
    fn test_token_type_shape() {
        assert_eq!(TokenType::Constant(DataType::U32).shape(), Some(Shape::Scalar));
        assert_eq!(TokenType::ArrayPointer(DataType::F32).shape(), Some(Shape::Array));
        assert_eq!(TokenType::Null.shape(), None);
        assert_eq!(TokenType::Array(DataType::I32).to_string(), "array i32");
    }

    #[test]
    fn test_scalar_json_format() {
        let value: ScalarValue = serde_json::from_str(r#"{"U32": 5}"#).unwrap();
        assert_eq!(value, ScalarValue::U32(5));

        let value: ScalarValue = serde_json::from_str(r#"{"F32": -1.5}"#).unwrap();
        assert_eq!(value, ScalarValue::F32(-1.5));
    }

    #[test]
    fn test_scalar_bytes() {
        let bytes = ScalarValue::I32(-7).to_bytes();
        assert_eq!(ScalarValue::from_bytes(ElementKind::I32, &bytes), Some(ScalarValue::I32(-7)));
        assert_eq!(ScalarValue::from_bytes(ElementKind::I32, &bytes[..3]), None);
    }

    #[test]
    fn test_vector_set_checks_bounds_and_type() {
        let mut values = VectorValue::zeroed(DataType::U32, 2);
        assert!(values.set(1, ScalarValue::U32(9)));
        assert!(!values.set(2, ScalarValue::U32(9)));
        assert!(!values.set(0, ScalarValue::F32(1.0)));
        assert_eq!(values.get(1), Some(ScalarValue::U32(9)));
        assert_eq!(values.get(2), None);
    }

    #[test]
    fn test_vector_from_unaligned_bytes() {
        let mut bytes = vec![0u8];
        bytes.extend(VectorValue::F32(vec![1.5, -2.0]).to_bytes());
        let decoded = VectorValue::from_bytes(ElementKind::F32, &bytes[1..]).unwrap();
        assert_eq!(decoded, VectorValue::F32(vec![1.5, -2.0]));
        assert!(VectorValue::from_bytes(ElementKind::F32, &bytes[..3]).is_none());
    }

    #[test]
    fn test_token_value_defaults_to_null() {
        let value = TokenValue::default();
        assert_eq!(value, TokenValue::Null);
        assert_eq!(value.to_bytes(), None);
        assert_eq!(value.token_type(), TokenType::Null);
    }
}
