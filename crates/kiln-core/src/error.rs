//! Error types for kiln-core operations

use kiln_backends::{BackendError, CompileError, Diagnostic, Io};

/// Result type for kiln-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kiln-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured device could not be created
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Program source was rejected by the compiler
    #[error("Compilation failed: {}", render_diagnostics(.diagnostics))]
    Compilation { diagnostics: Vec<Diagnostic> },

    /// A declared parameter has no resource bound in its direction
    #[error("Parameter `{name}` is not bound as {io}")]
    UnboundParameter { name: String, io: Io },

    /// Element kind differs from what the accessor or parameter expects
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Scalar/array shape differs, or the resource holds no data
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// The dispatch failed on the device
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The owning executor has been destroyed
    #[error("{0} belongs to a destroyed executor")]
    Destroyed(&'static str),

    /// The resource bound to a parameter has been destroyed
    #[error("Resource bound to {io} `{name}` has been destroyed")]
    DanglingBinding { name: String, io: Io },

    /// The resource was created by a different executor
    #[error("Resource {resource} belongs to another executor")]
    ForeignResource { resource: u64 },

    /// Device failure outside a dispatch
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl Error {
    pub(crate) fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn shape_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Map a failed dispatch; program-level failures become `Execution`
    pub(crate) fn from_dispatch(err: BackendError) -> Self {
        if err.is_execution_failure() {
            Error::Execution(err.to_string())
        } else {
            Error::Backend(err)
        }
    }

    /// Compiler diagnostics, empty for every other error
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Error::Compilation { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Error::Compilation {
            diagnostics: err.diagnostics,
        }
    }
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
