//! Host snapshots of array resources handed to C callers
//!
//! Snapshots are `malloc`-allocated so C code owns them outright; each kind
//! has its own `kiln_data_array_<kind>_free`.

use crate::status::{FfiError, FfiResult};
use std::mem;
use std::ptr;

macro_rules! data_array {
    ($name:ident, $elem:ty, $free:ident) => {
        /// Array snapshot: `size` elements at `data` (NULL when `size` is 0)
        #[repr(C)]
        #[derive(Debug)]
        pub struct $name {
            pub size: u32,
            pub data: *mut $elem,
        }

        impl $name {
            /// Copy `values` into a freshly `malloc`ed snapshot
            pub(crate) fn allocate(values: &[$elem]) -> FfiResult<*mut Self> {
                let size = u32::try_from(values.len())
                    .map_err(|_| FfiError::invalid_argument(format!("array of {} elements exceeds u32", values.len())))?;

                let data = if values.is_empty() {
                    ptr::null_mut()
                } else {
                    let bytes = mem::size_of_val(values);
                    // SAFETY: malloc with a non-zero size; checked for NULL below
                    let data = unsafe { libc::malloc(bytes) } as *mut $elem;
                    if data.is_null() {
                        return Err(FfiError::Internal(format!("failed to allocate {} bytes", bytes)));
                    }
                    // SAFETY: `data` holds `values.len()` elements and does not overlap `values`
                    unsafe { ptr::copy_nonoverlapping(values.as_ptr(), data, values.len()) };
                    data
                };

                // SAFETY: malloc of the struct size; checked for NULL below
                let array = unsafe { libc::malloc(mem::size_of::<Self>()) } as *mut Self;
                if array.is_null() {
                    // SAFETY: `data` is NULL or came from malloc above
                    unsafe { libc::free(data as *mut libc::c_void) };
                    return Err(FfiError::Internal("failed to allocate data array".to_string()));
                }
                // SAFETY: `array` is valid for writes of one `Self`
                unsafe { array.write(Self { size, data }) };
                Ok(array)
            }

            /// View the elements (test and debugging helper)
            ///
            /// # Safety
            ///
            /// `self` must have been produced by [`allocate`](Self::allocate)
            /// and not freed.
            pub unsafe fn as_slice(&self) -> &[$elem] {
                if self.data.is_null() {
                    &[]
                } else {
                    // SAFETY: guaranteed by the caller
                    unsafe { std::slice::from_raw_parts(self.data, self.size as usize) }
                }
            }
        }

        /// Release a snapshot returned by a `kiln_resource_get_data_array_*` call
        ///
        /// # Safety
        ///
        /// `array` must be NULL or a snapshot of this kind that has not been
        /// freed yet.
        #[no_mangle]
        pub unsafe extern "C" fn $free(array: *mut $name) {
            if array.is_null() {
                return;
            }
            // SAFETY: both pointers came from malloc in `allocate`
            unsafe {
                libc::free((*array).data as *mut libc::c_void);
                libc::free(array as *mut libc::c_void);
            }
        }
    };
}

data_array!(KilnDataArrayUint32, u32, kiln_data_array_uint32_free);
data_array!(KilnDataArrayInt32, i32, kiln_data_array_int32_free);
data_array!(KilnDataArrayFloat32, f32, kiln_data_array_float32_free);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_copies_values() {
        let array = KilnDataArrayInt32::allocate(&[-1, 0, 7]).unwrap();
        unsafe {
            assert_eq!((*array).size, 3);
            assert_eq!((*array).as_slice(), &[-1, 0, 7]);
            kiln_data_array_int32_free(array);
        }
    }

    #[test]
    fn test_empty_array_has_null_data() {
        let array = KilnDataArrayFloat32::allocate(&[]).unwrap();
        unsafe {
            assert_eq!((*array).size, 0);
            assert!((*array).data.is_null());
            assert!((*array).as_slice().is_empty());
            kiln_data_array_float32_free(array);
        }
    }

    #[test]
    fn test_free_null_is_noop() {
        unsafe { kiln_data_array_uint32_free(ptr::null_mut()) };
    }
}
