//! Status codes and the thread-local last error
//!
//! Every C entry point runs through [`guard`]: it clears the calling
//! thread's last error, catches panics, and turns any failure into a
//! [`KilnStatus`] plus a message readable with `kiln_last_error_message()`.

use kiln_core::Error as CoreError;
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Result code returned by every fallible C function
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KilnStatus {
    Ok = 0,
    DeviceUnavailable = 1,
    CompilationError = 2,
    UnboundParameter = 3,
    TypeMismatch = 4,
    ShapeMismatch = 5,
    ExecutionError = 6,
    InvalidHandle = 7,
    InvalidArgument = 8,
    InvalidState = 9,
    InternalError = 10,
}

/// Failures raised at the C boundary
#[derive(Debug, thiserror::Error)]
pub(crate) enum FfiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid {kind} handle {handle}")]
    InvalidHandle { kind: &'static str, handle: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FfiError {
    pub(crate) fn invalid_handle(kind: &'static str, handle: u64) -> Self {
        FfiError::InvalidHandle { kind, handle }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        FfiError::InvalidArgument(msg.into())
    }

    pub(crate) fn status(&self) -> KilnStatus {
        match self {
            FfiError::Core(err) => match err {
                CoreError::DeviceUnavailable(_) => KilnStatus::DeviceUnavailable,
                CoreError::Compilation { .. } => KilnStatus::CompilationError,
                CoreError::UnboundParameter { .. } => KilnStatus::UnboundParameter,
                CoreError::TypeMismatch { .. } => KilnStatus::TypeMismatch,
                CoreError::ShapeMismatch { .. } => KilnStatus::ShapeMismatch,
                CoreError::Execution(_) => KilnStatus::ExecutionError,
                CoreError::Destroyed(_) => KilnStatus::InvalidHandle,
                CoreError::DanglingBinding { .. } => KilnStatus::InvalidState,
                CoreError::ForeignResource { .. } => KilnStatus::InvalidArgument,
                CoreError::Backend(_) => KilnStatus::InternalError,
            },
            FfiError::InvalidHandle { .. } => KilnStatus::InvalidHandle,
            FfiError::InvalidArgument(_) => KilnStatus::InvalidArgument,
            FfiError::InvalidState(_) => KilnStatus::InvalidState,
            FfiError::Internal(_) => KilnStatus::InternalError,
        }
    }
}

pub(crate) type FfiResult<T> = std::result::Result<T, FfiError>;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: String) {
    // Interior NULs would truncate the message on the C side
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| {
        slot.borrow_mut().take();
    });
}

/// Message of the calling thread's last failure, if any
pub fn last_error_message() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|s| s.to_string_lossy().into_owned()))
}

/// Run one C entry point
pub(crate) fn guard(function: &'static str, body: impl FnOnce() -> FfiResult<()>) -> KilnStatus {
    clear_last_error();
    let outcome = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(FfiError::Internal(format!("panic in {}: {}", function, message)))
    });

    match outcome {
        Ok(()) => KilnStatus::Ok,
        Err(err) => {
            let status = err.status();
            tracing::debug!(function = function, status = ?status, error = %err, "ffi_call_failed");
            set_last_error(err.to_string());
            status
        }
    }
}

/// Message describing the calling thread's last failed call
///
/// Returns NULL when the last call succeeded. The string stays valid until
/// the next kiln call on the same thread.
#[no_mangle]
pub extern "C" fn kiln_last_error_message() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(ptr::null(), |s| s.as_ptr()))
}

impl KilnStatus {
    const ALL: [KilnStatus; 11] = [
        KilnStatus::Ok,
        KilnStatus::DeviceUnavailable,
        KilnStatus::CompilationError,
        KilnStatus::UnboundParameter,
        KilnStatus::TypeMismatch,
        KilnStatus::ShapeMismatch,
        KilnStatus::ExecutionError,
        KilnStatus::InvalidHandle,
        KilnStatus::InvalidArgument,
        KilnStatus::InvalidState,
        KilnStatus::InternalError,
    ];

    /// Status with numeric value `code`, if there is one
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| *status as i32 == code)
    }

    fn c_name(self) -> &'static [u8] {
        match self {
            KilnStatus::Ok => b"KILN_OK\0",
            KilnStatus::DeviceUnavailable => b"KILN_DEVICE_UNAVAILABLE\0",
            KilnStatus::CompilationError => b"KILN_COMPILATION_ERROR\0",
            KilnStatus::UnboundParameter => b"KILN_UNBOUND_PARAMETER\0",
            KilnStatus::TypeMismatch => b"KILN_TYPE_MISMATCH\0",
            KilnStatus::ShapeMismatch => b"KILN_SHAPE_MISMATCH\0",
            KilnStatus::ExecutionError => b"KILN_EXECUTION_ERROR\0",
            KilnStatus::InvalidHandle => b"KILN_INVALID_HANDLE\0",
            KilnStatus::InvalidArgument => b"KILN_INVALID_ARGUMENT\0",
            KilnStatus::InvalidState => b"KILN_INVALID_STATE\0",
            KilnStatus::InternalError => b"KILN_INTERNAL_ERROR\0",
        }
    }
}

/// Static name of a status code (`"KILN_OK"`, ...)
///
/// Takes the raw code so any integer from C is accepted; codes that are not
/// a `kiln_status_t` value yield `"KILN_UNKNOWN"`.
#[no_mangle]
pub extern "C" fn kiln_status_name(status: i32) -> *const c_char {
    let name = KilnStatus::from_code(status).map_or(&b"KILN_UNKNOWN\0"[..], KilnStatus::c_name);
    name.as_ptr() as *const c_char
}
