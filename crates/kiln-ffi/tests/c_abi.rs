//! End-to-end tests driving the library only through its C entry points

use kiln_ffi::*;
use serial_test::serial;
use std::ffi::{CStr, CString};
use std::ptr;

const DOUBLE_SOURCE: &str = r#"{
    "symbol": {
        "0": {"Array": "U32"}, "1": {"Array": "U32"},
        "2": {"Constant": "U32"}, "3": {"Constant": "U32"}, "4": {"Constant": "Bool"},
        "5": {"Constant": "U32"}, "6": {"Constant": "U32"}, "7": {"Constant": "U32"}
    },
    "operation": [
        {"WorkerId": 2},
        {"ArrayLen": [3, 0]},
        {"ArrayNew": [1, 3, "U32", 0, true]},
        {"Lt": [4, 2, 3]},
        {"If": [[], 4, 0, [
            {"ArrayLoad": [5, 0, 2]},
            {"Constant": [6, {"U32": 2}]},
            {"Mul": [7, 5, 6]},
            {"ArrayStore": [1, 2, 7]}
        ], 1]}
    ],
    "input": {"input": 0},
    "output": {"output": 1}
}"#;

fn c(text: &str) -> CString {
    CString::new(text).unwrap()
}

fn last_error() -> String {
    let message = kiln_last_error_message();
    assert!(!message.is_null(), "expected an error message");
    unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
}

fn new_executor() -> u64 {
    let mut handle = 0;
    assert_eq!(unsafe { kiln_executor_new(&mut handle) }, KilnStatus::Ok);
    handle
}

fn new_resource(executor: u64) -> u64 {
    let mut handle = 0;
    assert_eq!(unsafe { kiln_resource_new(executor, &mut handle) }, KilnStatus::Ok);
    handle
}

fn new_doubler(executor: u64) -> u64 {
    let source = c(DOUBLE_SOURCE);
    let mut handle = 0;
    assert_eq!(
        unsafe { kiln_executable_new(executor, source.as_ptr(), &mut handle) },
        KilnStatus::Ok
    );
    handle
}

fn bind(executable: u64, name: &str, io: u32, resource: u64) -> KilnStatus {
    let name = c(name);
    unsafe { kiln_executable_bind(executable, name.as_ptr(), io, resource) }
}

#[test]
#[serial]
fn test_double_through_c_abi() {
    clear_all_registries();
    let executor = new_executor();
    let executable = new_doubler(executor);
    let input = new_resource(executor);
    let output = new_resource(executor);

    let values = [1u32, 2, 3, 4];
    assert_eq!(
        unsafe { kiln_resource_set_data_array_uint32(input, values.as_ptr(), values.len()) },
        KilnStatus::Ok
    );
    assert_eq!(bind(executable, "input", KILN_INPUT, input), KilnStatus::Ok);
    assert_eq!(bind(executable, "output", KILN_OUTPUT, output), KilnStatus::Ok);
    assert_eq!(kiln_executable_run(executable), KilnStatus::Ok);
    assert!(kiln_last_error_message().is_null());

    let mut array = ptr::null_mut();
    assert_eq!(
        unsafe { kiln_resource_get_data_array_uint32(output, &mut array) },
        KilnStatus::Ok
    );
    unsafe {
        assert_eq!((*array).size, 4);
        assert_eq!((*array).as_slice(), &[2, 4, 6, 8]);
        kiln_data_array_uint32_free(array);
    }

    assert_eq!(kiln_executor_destroy(executor), KilnStatus::Ok);
    assert_eq!(live_handle_counts(), (0, 0, 0));
}

#[test]
#[serial]
fn test_scalar_accessors() {
    clear_all_registries();
    let executor = new_executor();
    let resource = new_resource(executor);

    assert_eq!(kiln_resource_set_float32(resource, 2.5), KilnStatus::Ok);
    let mut value = 0.0f32;
    assert_eq!(unsafe { kiln_resource_get_float32(resource, &mut value) }, KilnStatus::Ok);
    assert_eq!(value, 2.5);

    let mut wrong = 0i32;
    assert_eq!(
        unsafe { kiln_resource_get_int32(resource, &mut wrong) },
        KilnStatus::TypeMismatch
    );
    assert_eq!(wrong, 0);

    assert_eq!(kiln_resource_clear(resource), KilnStatus::Ok);
    assert_eq!(
        unsafe { kiln_resource_get_float32(resource, &mut value) },
        KilnStatus::ShapeMismatch
    );
    kiln_executor_destroy(executor);
}

#[test]
#[serial]
fn test_compilation_failure_leaves_invalid_executable() {
    clear_all_registries();
    let executor = new_executor();
    let source = c(r#"{"symbol": {}, "operation": [{"Load": [0, 1]}]}"#);
    let mut handle = 0;

    let status = unsafe { kiln_executable_new(executor, source.as_ptr(), &mut handle) };
    assert_eq!(status, KilnStatus::CompilationError);
    assert_ne!(handle, 0);
    assert!(last_error().contains("Compilation failed"));

    assert_eq!(kiln_executable_run(handle), KilnStatus::InvalidState);
    assert_eq!(bind(handle, "input", KILN_INPUT, new_resource(executor)), KilnStatus::InvalidState);
    assert_eq!(kiln_executable_destroy(handle), KilnStatus::Ok);
    kiln_executor_destroy(executor);
}

#[test]
#[serial]
fn test_unbound_parameter_reported() {
    clear_all_registries();
    let executor = new_executor();
    let executable = new_doubler(executor);
    let input = new_resource(executor);
    assert_eq!(
        unsafe { kiln_resource_set_data_array_uint32(input, [1u32].as_ptr(), 1) },
        KilnStatus::Ok
    );
    assert_eq!(bind(executable, "input", KILN_INPUT, input), KilnStatus::Ok);

    assert_eq!(kiln_executable_run(executable), KilnStatus::UnboundParameter);
    assert!(last_error().contains("output"));
    kiln_executor_destroy(executor);
}

#[test]
#[serial]
fn test_type_mismatch_at_run() {
    clear_all_registries();
    let executor = new_executor();
    let executable = new_doubler(executor);
    let input = new_resource(executor);
    let output = new_resource(executor);

    let values = [1i32, 2];
    assert_eq!(
        unsafe { kiln_resource_set_data_array_int32(input, values.as_ptr(), values.len()) },
        KilnStatus::Ok
    );
    assert_eq!(bind(executable, "input", KILN_INPUT, input), KilnStatus::Ok);
    assert_eq!(bind(executable, "output", KILN_OUTPUT, output), KilnStatus::Ok);

    assert_eq!(kiln_executable_run(executable), KilnStatus::TypeMismatch);
    assert!(last_error().contains("Type mismatch"));

    let mut array = ptr::null_mut();
    assert_eq!(
        unsafe { kiln_resource_get_data_array_int32(input, &mut array) },
        KilnStatus::Ok
    );
    unsafe {
        assert_eq!((*array).as_slice(), &[1, 2]);
        kiln_data_array_int32_free(array);
    }
    kiln_executor_destroy(executor);
}

#[test]
#[serial]
fn test_use_after_destroy() {
    clear_all_registries();
    let executor = new_executor();
    let resource = new_resource(executor);

    assert_eq!(kiln_resource_destroy(resource), KilnStatus::Ok);
    assert_eq!(kiln_resource_set_uint32(resource, 1), KilnStatus::InvalidHandle);
    assert!(last_error().contains("invalid resource handle"));
    assert_eq!(kiln_resource_destroy(resource), KilnStatus::InvalidHandle);
    kiln_executor_destroy(executor);
}

#[test]
#[serial]
fn test_destroying_bound_resource_fails_next_run() {
    clear_all_registries();
    let executor = new_executor();
    let executable = new_doubler(executor);
    let input = new_resource(executor);
    let output = new_resource(executor);
    assert_eq!(
        unsafe { kiln_resource_set_data_array_uint32(input, [3u32].as_ptr(), 1) },
        KilnStatus::Ok
    );
    assert_eq!(bind(executable, "input", KILN_INPUT, input), KilnStatus::Ok);
    assert_eq!(bind(executable, "output", KILN_OUTPUT, output), KilnStatus::Ok);

    assert_eq!(kiln_resource_destroy(input), KilnStatus::Ok);
    assert_eq!(kiln_executable_run(executable), KilnStatus::InvalidState);
    kiln_executor_destroy(executor);
}

#[test]
#[serial]
fn test_executor_destroy_purges_children() {
    clear_all_registries();
    let executor = new_executor();
    let executable = new_doubler(executor);
    let resource = new_resource(executor);
    let other = new_executor();
    let survivor = new_resource(other);
    assert_eq!(live_handle_counts(), (2, 1, 2));

    assert_eq!(kiln_executor_destroy(executor), KilnStatus::Ok);
    assert_eq!(live_handle_counts(), (1, 0, 1));
    assert_eq!(kiln_executable_run(executable), KilnStatus::InvalidHandle);
    assert_eq!(kiln_resource_clear(resource), KilnStatus::InvalidHandle);
    assert_eq!(kiln_resource_set_int32(survivor, 5), KilnStatus::Ok);
    kiln_executor_destroy(other);
}

#[test]
#[serial]
fn test_foreign_resource_rejected() {
    clear_all_registries();
    let first = new_executor();
    let second = new_executor();
    let executable = new_doubler(first);
    let foreign = new_resource(second);

    assert_eq!(bind(executable, "input", KILN_INPUT, foreign), KilnStatus::InvalidArgument);
    kiln_executor_destroy(first);
    kiln_executor_destroy(second);
}

#[test]
#[serial]
fn test_invalid_arguments() {
    clear_all_registries();
    let executor = new_executor();
    let executable = new_doubler(executor);
    let resource = new_resource(executor);

    assert_eq!(bind(executable, "input", 7, resource), KilnStatus::InvalidArgument);
    assert!(last_error().contains("direction 7"));
    assert_eq!(
        unsafe { kiln_executable_bind(executable, ptr::null(), KILN_INPUT, resource) },
        KilnStatus::InvalidArgument
    );
    assert_eq!(
        unsafe { kiln_resource_set_data_array_float32(resource, ptr::null(), 3) },
        KilnStatus::InvalidArgument
    );
    assert_eq!(
        unsafe { kiln_resource_get_uint32(resource, ptr::null_mut()) },
        KilnStatus::InvalidArgument
    );
    kiln_executor_destroy(executor);
}

#[test]
#[serial]
fn test_status_names() {
    let name = |code: i32| unsafe { CStr::from_ptr(kiln_status_name(code)) }.to_str().unwrap();
    assert_eq!(name(KilnStatus::ExecutionError as i32), "KILN_EXECUTION_ERROR");
    assert_eq!(name(KilnStatus::Ok as i32), "KILN_OK");
    assert_eq!(name(KilnStatus::InternalError as i32), "KILN_INTERNAL_ERROR");
    assert_eq!(name(11), "KILN_UNKNOWN");
    assert_eq!(name(-1), "KILN_UNKNOWN");
}
