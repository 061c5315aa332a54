//! # Kiln FFI
//!
//! C ABI over `kiln-core`. Every object crosses the boundary as an opaque
//! `uint64_t` handle:
//!
//! - **Executor** - owns a device and everything created from it
//! - **Executable** - a compiled program plus its parameter bindings
//! - **Resource** - a host-visible data container
//!
//! Every fallible function returns a [`KilnStatus`]; the message of the most
//! recent failure on the calling thread is available from
//! `kiln_last_error_message()`. Panics never unwind into C; they are reported
//! as `KILN_INTERNAL_ERROR`.
//!
//! Destroying an executor destroys its executables and resources. Using a
//! destroyed handle returns `KILN_INVALID_HANDLE`.
//!
//! The matching C header is `include/kiln.h` (see [`header::generate_header`]).

mod data_array;
mod executable;
mod executor;
mod handles;
pub mod header;
mod resource;
mod status;
mod utils;

use std::os::raw::c_char;

pub use data_array::{
    kiln_data_array_float32_free, kiln_data_array_int32_free, kiln_data_array_uint32_free, KilnDataArrayFloat32,
    KilnDataArrayInt32, KilnDataArrayUint32,
};
pub use executable::{
    kiln_executable_bind, kiln_executable_destroy, kiln_executable_new, kiln_executable_run, kiln_executable_unbind,
};
pub use executor::{kiln_executor_destroy, kiln_executor_new};
pub use handles::{clear_all_registries, live_handle_counts};
pub use resource::{
    kiln_resource_clear, kiln_resource_destroy, kiln_resource_get_data_array_float32,
    kiln_resource_get_data_array_int32, kiln_resource_get_data_array_uint32, kiln_resource_get_float32,
    kiln_resource_get_int32, kiln_resource_get_uint32, kiln_resource_new, kiln_resource_set_data_array_float32,
    kiln_resource_set_data_array_int32, kiln_resource_set_data_array_uint32, kiln_resource_set_float32,
    kiln_resource_set_int32, kiln_resource_set_uint32,
};
pub use status::{kiln_last_error_message, kiln_status_name, last_error_message, KilnStatus};
pub use utils::{KILN_INPUT, KILN_OUTPUT};

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Library version as a static NUL-terminated string
#[no_mangle]
pub extern "C" fn kiln_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

/// Install the global tracing subscriber configured from the `KILN_TRACING_*` variables
///
/// Returns `KILN_INVALID_STATE` when a subscriber is already installed.
#[no_mangle]
pub extern "C" fn kiln_init_tracing() -> KilnStatus {
    status::guard("kiln_init_tracing", || {
        kiln_tracing::init_global_tracing(&kiln_tracing::TracingConfig::from_env())
            .map_err(|err| status::FfiError::InvalidState(err.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_version_matches_package() {
        let version = unsafe { CStr::from_ptr(kiln_version()) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }
}
