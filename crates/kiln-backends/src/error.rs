//! Error types for backend operations

use std::fmt;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while managing device memory or running a dispatch
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Invalid buffer handle
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(u64),

    /// Buffer access out of bounds
    #[error("buffer access out of bounds: size {size} > buffer size {buffer_size}")]
    BufferOutOfBounds { size: usize, buffer_size: usize },

    /// A binding does not match the program's parameter declaration
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Array index outside the array
    #[error("index {index} out of bounds for array {token} of length {len}")]
    IndexOutOfBounds { token: String, index: u32, len: usize },

    /// Integer division or remainder by zero
    #[error("integer division by zero in {0}")]
    DivisionByZero(String),

    /// Token read before any value was written to it
    #[error("token {0} read before it was written")]
    Uninitialized(String),

    /// Program error
    #[error("program error: {0}")]
    ProgramError(#[from] crate::isa::ProgramError),

    /// Dispatch exceeded its deadline
    #[error("dispatch exceeded its {timeout_ms} ms deadline")]
    Timeout { timeout_ms: u64 },

    /// Execution error
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// Device could not be initialized
    #[error("device initialization failed: {0}")]
    DeviceInit(String),

    /// Unsupported operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl BackendError {
    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an execution error
    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Whether the failure happened inside a running dispatch
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            Self::IndexOutOfBounds { .. }
                | Self::DivisionByZero(_)
                | Self::Uninitialized(_)
                | Self::Timeout { .. }
                | Self::ExecutionError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_constructors() {
        let err = BackendError::type_mismatch("u32", "f32");
        assert_eq!(err.to_string(), "type mismatch: expected u32, got f32");

        let err = BackendError::execution_error("boom");
        assert!(err.is_execution_failure());

        let err = BackendError::unsupported("metal");
        assert!(!err.is_execution_failure());
    }

    #[test]
    fn test_timeout_message() {
        let err = BackendError::Timeout { timeout_ms: 250 };
        assert_eq!(err.to_string(), "dispatch exceeded its 250 ms deadline");
        assert!(err.is_execution_failure());
    }
}
