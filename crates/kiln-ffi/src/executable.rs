//! Executable functions for the C ABI

use crate::handles::{self, ExecutableState};
use crate::status::{guard, FfiError, KilnStatus};
use crate::utils::{io_arg, out_arg, str_arg};
use std::os::raw::c_char;
use std::sync::Arc;

/// Compile `source` into an executable of `executor`
///
/// On a compilation failure a handle is still written to `out` and
/// `KILN_COMPILATION_ERROR` is returned; that handle only accepts
/// `kiln_executable_destroy`. The diagnostics are available from
/// `kiln_last_error_message()`.
///
/// # Safety
///
/// `source` must be a NUL-terminated string; `out` must be NULL or valid for
/// writing one handle.
#[no_mangle]
pub unsafe extern "C" fn kiln_executable_new(executor: u64, source: *const c_char, out: *mut u64) -> KilnStatus {
    guard("kiln_executable_new", || {
        let out = out_arg(out)?;
        // SAFETY: forwarded from the caller
        let source = unsafe { str_arg(source, "source") }?;
        let owner = handles::executor(executor)?;

        match owner.new_executable(source) {
            Ok(executable) => {
                let state = ExecutableState::Ready(Arc::new(parking_lot::Mutex::new(executable)));
                let handle = handles::insert_executable(executor, state);
                tracing::debug!(handle = handle, executor = executor, "Executable created");
                // SAFETY: checked non-null above
                unsafe { out.write(handle) };
                Ok(())
            }
            Err(err @ kiln_core::Error::Compilation { .. }) => {
                let handle = handles::insert_executable(executor, ExecutableState::Invalid);
                tracing::debug!(handle = handle, diagnostics = err.diagnostics().len(), "Executable invalid");
                // SAFETY: checked non-null above
                unsafe { out.write(handle) };
                Err(FfiError::from(err))
            }
            Err(err) => Err(err.into()),
        }
    })
}

/// Destroy an executable; valid for invalid (failed) executables too
#[no_mangle]
pub extern "C" fn kiln_executable_destroy(executable: u64) -> KilnStatus {
    guard("kiln_executable_destroy", || handles::remove_executable(executable))
}

/// Bind `resource` to parameter `name` in direction `io`
///
/// Rebinding the same (name, direction) replaces the previous resource.
///
/// # Safety
///
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn kiln_executable_bind(
    executable: u64,
    name: *const c_char,
    io: u32,
    resource: u64,
) -> KilnStatus {
    guard("kiln_executable_bind", || {
        // SAFETY: forwarded from the caller
        let name = unsafe { str_arg(name, "name") }?;
        let io = io_arg(io)?;
        let target = handles::executable(executable)?;
        let resource = handles::resource(resource)?;
        target.lock().bind(name, io, &resource)?;
        Ok(())
    })
}

/// Remove the binding for (`name`, `io`); unbinding an unbound key succeeds
///
/// # Safety
///
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn kiln_executable_unbind(executable: u64, name: *const c_char, io: u32) -> KilnStatus {
    guard("kiln_executable_unbind", || {
        // SAFETY: forwarded from the caller
        let name = unsafe { str_arg(name, "name") }?;
        let io = io_arg(io)?;
        handles::executable(executable)?.lock().unbind(name, io)?;
        Ok(())
    })
}

/// Run the executable and block until the dispatch has completed
#[no_mangle]
pub extern "C" fn kiln_executable_run(executable: u64) -> KilnStatus {
    guard("kiln_executable_run", || {
        let target = handles::executable(executable)?;
        let report = target.lock().run()?;
        tracing::debug!(
            handle = executable,
            workers = report.workers,
            duration_us = report.duration_us,
            "Executable run"
        );
        Ok(())
    })
}
