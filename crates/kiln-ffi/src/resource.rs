//! Resource functions for the C ABI
//!
//! Scalar getters write through an out pointer; array getters hand back a
//! `malloc`ed snapshot owned by the caller.

use crate::data_array::{KilnDataArrayFloat32, KilnDataArrayInt32, KilnDataArrayUint32};
use crate::handles;
use crate::status::{guard, KilnStatus};
use crate::utils::{out_arg, slice_arg};

/// Create an empty resource owned by `executor`
///
/// # Safety
///
/// `out` must be NULL or valid for writing one handle.
#[no_mangle]
pub unsafe extern "C" fn kiln_resource_new(executor: u64, out: *mut u64) -> KilnStatus {
    guard("kiln_resource_new", || {
        let out = out_arg(out)?;
        let resource = handles::executor(executor)?.new_resource()?;
        let handle = handles::insert_resource(executor, resource);
        tracing::trace!(handle = handle, executor = executor, "Resource created");
        // SAFETY: checked non-null above
        unsafe { out.write(handle) };
        Ok(())
    })
}

/// Destroy a resource; executables still binding it fail their next run
#[no_mangle]
pub extern "C" fn kiln_resource_destroy(resource: u64) -> KilnStatus {
    guard("kiln_resource_destroy", || handles::remove_resource(resource))
}

/// Reset a resource to empty, forgetting its kind and shape
#[no_mangle]
pub extern "C" fn kiln_resource_clear(resource: u64) -> KilnStatus {
    guard("kiln_resource_clear", || {
        handles::resource(resource)?.clear()?;
        Ok(())
    })
}

macro_rules! scalar_accessors {
    ($elem:ty, $set_fn:ident, $get_fn:ident, $set:ident, $get:ident) => {
        #[doc = concat!("Store a `", stringify!($elem), "` scalar")]
        #[no_mangle]
        pub extern "C" fn $set_fn(resource: u64, value: $elem) -> KilnStatus {
            guard(stringify!($set_fn), || {
                handles::resource(resource)?.$set(value)?;
                Ok(())
            })
        }

        #[doc = concat!("Read a `", stringify!($elem), "` scalar into `out`")]
        ///
        /// # Safety
        ///
        /// `out` must be NULL or valid for writing one element.
        #[no_mangle]
        pub unsafe extern "C" fn $get_fn(resource: u64, out: *mut $elem) -> KilnStatus {
            guard(stringify!($get_fn), || {
                let out = out_arg(out)?;
                let value = handles::resource(resource)?.$get()?;
                // SAFETY: checked non-null above
                unsafe { out.write(value) };
                Ok(())
            })
        }
    };
}

macro_rules! array_accessors {
    ($elem:ty, $array:ty, $set_fn:ident, $get_fn:ident, $set:ident, $get:ident) => {
        #[doc = concat!("Copy `n_elements` `", stringify!($elem), "` values into the resource")]
        ///
        /// Replaces prior contents and shape; the kind must match.
        ///
        /// # Safety
        ///
        /// When `n_elements > 0`, `data` must point to that many elements.
        #[no_mangle]
        pub unsafe extern "C" fn $set_fn(resource: u64, data: *const $elem, n_elements: usize) -> KilnStatus {
            guard(stringify!($set_fn), || {
                // SAFETY: forwarded from the caller
                let values = unsafe { slice_arg(data, n_elements) }?;
                handles::resource(resource)?.$set(values)?;
                Ok(())
            })
        }

        #[doc = concat!("Snapshot the `", stringify!($elem), "` array into a new allocation")]
        ///
        /// Release the snapshot with the matching `kiln_data_array_*_free`.
        ///
        /// # Safety
        ///
        /// `out` must be NULL or valid for writing one pointer.
        #[no_mangle]
        pub unsafe extern "C" fn $get_fn(resource: u64, out: *mut *mut $array) -> KilnStatus {
            guard(stringify!($get_fn), || {
                let out = out_arg(out)?;
                let values = handles::resource(resource)?.$get()?;
                let array = <$array>::allocate(&values)?;
                // SAFETY: checked non-null above
                unsafe { out.write(array) };
                Ok(())
            })
        }
    };
}

scalar_accessors!(u32, kiln_resource_set_uint32, kiln_resource_get_uint32, set_uint32, get_uint32);
scalar_accessors!(i32, kiln_resource_set_int32, kiln_resource_get_int32, set_int32, get_int32);
scalar_accessors!(f32, kiln_resource_set_float32, kiln_resource_get_float32, set_float32, get_float32);

array_accessors!(
    u32,
    KilnDataArrayUint32,
    kiln_resource_set_data_array_uint32,
    kiln_resource_get_data_array_uint32,
    set_data_array_uint32,
    get_data_array_uint32
);
array_accessors!(
    i32,
    KilnDataArrayInt32,
    kiln_resource_set_data_array_int32,
    kiln_resource_get_data_array_int32,
    set_data_array_int32,
    get_data_array_int32
);
array_accessors!(
    f32,
    KilnDataArrayFloat32,
    kiln_resource_set_data_array_float32,
    kiln_resource_get_data_array_float32,
    set_data_array_float32,
    get_data_array_float32
);
