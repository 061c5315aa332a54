//! Argument conversion helpers for the C entry points

use crate::status::{FfiError, FfiResult};
use kiln_core::Io;
use std::ffi::CStr;
use std::os::raw::c_char;

/// Binding direction `KILN_INPUT`
pub const KILN_INPUT: u32 = 0;
/// Binding direction `KILN_OUTPUT`
pub const KILN_OUTPUT: u32 = 1;

/// Borrow a NUL-terminated UTF-8 argument
///
/// # Safety
///
/// `ptr` must be NULL or point to a NUL-terminated string that outlives the
/// returned reference.
pub(crate) unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::invalid_argument(format!("{} is null", what)));
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiError::invalid_argument(format!("{} is not valid UTF-8", what)))
}

pub(crate) fn io_arg(io: u32) -> FfiResult<Io> {
    match io {
        KILN_INPUT => Ok(Io::Input),
        KILN_OUTPUT => Ok(Io::Output),
        other => Err(FfiError::invalid_argument(format!(
            "direction {} is neither KILN_INPUT (0) nor KILN_OUTPUT (1)",
            other
        ))),
    }
}

/// Borrow `n` elements from a C array
///
/// # Safety
///
/// When `n > 0`, `data` must point to `n` readable elements.
pub(crate) unsafe fn slice_arg<'a, T>(data: *const T, n: usize) -> FfiResult<&'a [T]> {
    if n == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(FfiError::invalid_argument(format!("data is null but n_elements is {}", n)));
    }
    // SAFETY: non-null with `n` elements per the caller's contract
    Ok(unsafe { std::slice::from_raw_parts(data, n) })
}

/// Check an out pointer before any work is done
pub(crate) fn out_arg<T>(out: *mut T) -> FfiResult<*mut T> {
    if out.is_null() {
        Err(FfiError::invalid_argument("out pointer is null"))
    } else {
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_arg() {
        assert_eq!(io_arg(KILN_INPUT).unwrap(), Io::Input);
        assert_eq!(io_arg(KILN_OUTPUT).unwrap(), Io::Output);
        assert!(matches!(io_arg(2), Err(FfiError::InvalidArgument(_))));
    }

    #[test]
    fn test_str_arg() {
        let name = b"input\0";
        assert_eq!(unsafe { str_arg(name.as_ptr() as *const c_char, "name") }.unwrap(), "input");
        assert!(unsafe { str_arg(std::ptr::null(), "name") }.is_err());

        let invalid = b"\xff\xfe\0";
        assert!(unsafe { str_arg(invalid.as_ptr() as *const c_char, "name") }.is_err());
    }

    #[test]
    fn test_slice_arg() {
        let values = [1u32, 2, 3];
        assert_eq!(unsafe { slice_arg(values.as_ptr(), 3) }.unwrap(), &[1, 2, 3]);
        assert!(unsafe { slice_arg::<u32>(std::ptr::null(), 0) }.unwrap().is_empty());
        assert!(unsafe { slice_arg::<u32>(std::ptr::null(), 1) }.is_err());
    }
}
