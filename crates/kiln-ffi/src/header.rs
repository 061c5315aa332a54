//! C header for the kiln ABI
//!
//! `include/kiln.h` is checked in; a test keeps it identical to
//! [`generate_header`].

/// Full text of `kiln.h`
pub fn generate_header() -> String {
    let header = r#"#ifndef KILN_H
#define KILN_H
#include <stddef.h>
#include <stdint.h>
#ifdef __cplusplus
extern "C" {
#endif

typedef uint64_t kiln_executor_t;
typedef uint64_t kiln_executable_t;
typedef uint64_t kiln_resource_t;

typedef enum {
    KILN_OK = 0,
    KILN_DEVICE_UNAVAILABLE = 1,
    KILN_COMPILATION_ERROR = 2,
    KILN_UNBOUND_PARAMETER = 3,
    KILN_TYPE_MISMATCH = 4,
    KILN_SHAPE_MISMATCH = 5,
    KILN_EXECUTION_ERROR = 6,
    KILN_INVALID_HANDLE = 7,
    KILN_INVALID_ARGUMENT = 8,
    KILN_INVALID_STATE = 9,
    KILN_INTERNAL_ERROR = 10
} kiln_status_t;

#define KILN_INPUT 0u
#define KILN_OUTPUT 1u

typedef struct { uint32_t size; uint32_t* data; } kiln_data_array_uint32_t;
typedef struct { uint32_t size; int32_t* data; } kiln_data_array_int32_t;
typedef struct { uint32_t size; float* data; } kiln_data_array_float32_t;

const char* kiln_version(void);
kiln_status_t kiln_init_tracing(void);
const char* kiln_last_error_message(void);
const char* kiln_status_name(int32_t status);

kiln_status_t kiln_executor_new(kiln_executor_t* out);
kiln_status_t kiln_executor_destroy(kiln_executor_t executor);

kiln_status_t kiln_executable_new(kiln_executor_t executor, const char* source, kiln_executable_t* out);
kiln_status_t kiln_executable_destroy(kiln_executable_t executable);
kiln_status_t kiln_executable_bind(kiln_executable_t executable, const char* name, uint32_t io, kiln_resource_t resource);
kiln_status_t kiln_executable_unbind(kiln_executable_t executable, const char* name, uint32_t io);
kiln_status_t kiln_executable_run(kiln_executable_t executable);

kiln_status_t kiln_resource_new(kiln_executor_t executor, kiln_resource_t* out);
kiln_status_t kiln_resource_destroy(kiln_resource_t resource);
kiln_status_t kiln_resource_clear(kiln_resource_t resource);

kiln_status_t kiln_resource_set_uint32(kiln_resource_t resource, uint32_t value);
kiln_status_t kiln_resource_set_int32(kiln_resource_t resource, int32_t value);
kiln_status_t kiln_resource_set_float32(kiln_resource_t resource, float value);
kiln_status_t kiln_resource_get_uint32(kiln_resource_t resource, uint32_t* out);
kiln_status_t kiln_resource_get_int32(kiln_resource_t resource, int32_t* out);
kiln_status_t kiln_resource_get_float32(kiln_resource_t resource, float* out);

kiln_status_t kiln_resource_set_data_array_uint32(kiln_resource_t resource, const uint32_t* data, size_t n_elements);
kiln_status_t kiln_resource_set_data_array_int32(kiln_resource_t resource, const int32_t* data, size_t n_elements);
kiln_status_t kiln_resource_set_data_array_float32(kiln_resource_t resource, const float* data, size_t n_elements);
kiln_status_t kiln_resource_get_data_array_uint32(kiln_resource_t resource, kiln_data_array_uint32_t** out);
kiln_status_t kiln_resource_get_data_array_int32(kiln_resource_t resource, kiln_data_array_int32_t** out);
kiln_status_t kiln_resource_get_data_array_float32(kiln_resource_t resource, kiln_data_array_float32_t** out);

void kiln_data_array_uint32_free(kiln_data_array_uint32_t* array);
void kiln_data_array_int32_free(kiln_data_array_int32_t* array);
void kiln_data_array_float32_free(kiln_data_array_float32_t* array);

#ifdef __cplusplus
} // extern "C"
#endif
#endif
"#;
    header.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_in_header_is_current() {
        assert_eq!(generate_header(), include_str!("../include/kiln.h"));
    }

    #[test]
    fn test_header_declares_every_entry_point() {
        let header = generate_header();
        for symbol in [
            "kiln_executor_new",
            "kiln_executable_run",
            "kiln_resource_get_data_array_float32",
            "kiln_data_array_int32_free",
            "kiln_last_error_message",
            "KILN_OUTPUT",
        ] {
            assert!(header.contains(symbol), "missing {}", symbol);
        }
    }
}
