//! Executor management functions for the C ABI

use crate::handles;
use crate::status::{guard, KilnStatus};
use crate::utils::out_arg;
use kiln_core::{Executor, ExecutorConfig};

/// Create an executor on the default (CPU) device
///
/// The device is configured from the `KILN_*` environment variables.
///
/// # Safety
///
/// `out` must be NULL or valid for writing one handle.
#[no_mangle]
pub unsafe extern "C" fn kiln_executor_new(out: *mut u64) -> KilnStatus {
    guard("kiln_executor_new", || {
        let out = out_arg(out)?;
        let executor = Executor::with_config(ExecutorConfig::from_env())?;
        let handle = handles::insert_executor(executor);
        tracing::info!(handle = handle, "Executor created");
        // SAFETY: checked non-null above
        unsafe { out.write(handle) };
        Ok(())
    })
}

/// Destroy an executor together with every executable and resource it created
#[no_mangle]
pub extern "C" fn kiln_executor_destroy(executor: u64) -> KilnStatus {
    guard("kiln_executor_destroy", || {
        let (executables, resources) = handles::remove_executor(executor)?;
        tracing::info!(
            handle = executor,
            executables = executables,
            resources = resources,
            "Executor destroyed"
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_executor_lifecycle() {
        let mut handle = 0;
        assert_eq!(unsafe { kiln_executor_new(&mut handle) }, KilnStatus::Ok);
        assert_ne!(handle, 0);

        assert_eq!(kiln_executor_destroy(handle), KilnStatus::Ok);
        assert_eq!(kiln_executor_destroy(handle), KilnStatus::InvalidHandle);
    }

    #[test]
    #[serial]
    fn test_null_out_pointer() {
        assert_eq!(
            unsafe { kiln_executor_new(std::ptr::null_mut()) },
            KilnStatus::InvalidArgument
        );
    }
}
