//! Handle-based object management for the C ABI
//!
//! Executors, executables, and resources live in global registries keyed by
//! opaque non-zero `u64` handles. Looking an object up clones its `Arc` and
//! releases the registry lock before the object is used, so a long `run`
//! never blocks unrelated calls.
//!
//! ## Thread Safety
//!
//! Registries are `Arc<Mutex<HashMap>>`; when several are held they are
//! locked in the order executors, executables, resources. Handle generation
//! uses an atomic counter shared by all three kinds.

use crate::status::{FfiError, FfiResult};
use kiln_core::{Executable, Executor, Resource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

// Global handle counter for unique handle generation
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Executable slot: compiled, or the terminal state of a failed compilation
pub(crate) enum ExecutableState {
    Ready(Arc<parking_lot::Mutex<Executable>>),
    Invalid,
}

pub(crate) struct ExecutableEntry {
    pub(crate) owner: u64,
    pub(crate) state: ExecutableState,
}

pub(crate) struct ResourceEntry {
    pub(crate) owner: u64,
    pub(crate) resource: Arc<Resource>,
}

type Registry<T> = Arc<Mutex<HashMap<u64, T>>>;

lazy_static::lazy_static! {
    /// Registry of all live executors
    pub(crate) static ref EXECUTOR_REGISTRY: Registry<Arc<Executor>> = Arc::new(Mutex::new(HashMap::new()));

    /// Registry of all live executables, valid or not
    pub(crate) static ref EXECUTABLE_REGISTRY: Registry<ExecutableEntry> = Arc::new(Mutex::new(HashMap::new()));

    /// Registry of all live resources
    pub(crate) static ref RESOURCE_REGISTRY: Registry<ResourceEntry> = Arc::new(Mutex::new(HashMap::new()));
}

/// Generate a unique handle; 0 is reserved for "no object"
pub(crate) fn generate_handle() -> u64 {
    HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Lock a registry, recovering the data if a panic poisoned the mutex
pub(crate) fn lock_registry<T>(mutex: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Registry mutex was poisoned, recovering data");
            poisoned.into_inner()
        }
    }
}

pub(crate) fn executor(handle: u64) -> FfiResult<Arc<Executor>> {
    lock_registry(&EXECUTOR_REGISTRY)
        .get(&handle)
        .cloned()
        .ok_or_else(|| FfiError::invalid_handle("executor", handle))
}

/// The compiled executable behind `handle`
///
/// # Errors
///
/// `InvalidState` if the handle holds a failed compilation.
pub(crate) fn executable(handle: u64) -> FfiResult<Arc<parking_lot::Mutex<Executable>>> {
    match lock_registry(&EXECUTABLE_REGISTRY).get(&handle) {
        Some(ExecutableEntry {
            state: ExecutableState::Ready(executable),
            ..
        }) => Ok(Arc::clone(executable)),
        Some(ExecutableEntry {
            state: ExecutableState::Invalid,
            ..
        }) => Err(FfiError::InvalidState(format!(
            "executable {} failed to compile; only destroy is allowed",
            handle
        ))),
        None => Err(FfiError::invalid_handle("executable", handle)),
    }
}

pub(crate) fn resource(handle: u64) -> FfiResult<Arc<Resource>> {
    lock_registry(&RESOURCE_REGISTRY)
        .get(&handle)
        .map(|entry| Arc::clone(&entry.resource))
        .ok_or_else(|| FfiError::invalid_handle("resource", handle))
}

pub(crate) fn insert_executor(executor: Executor) -> u64 {
    let handle = generate_handle();
    lock_registry(&EXECUTOR_REGISTRY).insert(handle, Arc::new(executor));
    handle
}

pub(crate) fn insert_executable(owner: u64, state: ExecutableState) -> u64 {
    let handle = generate_handle();
    lock_registry(&EXECUTABLE_REGISTRY).insert(handle, ExecutableEntry { owner, state });
    handle
}

pub(crate) fn insert_resource(owner: u64, resource: Resource) -> u64 {
    let handle = generate_handle();
    lock_registry(&RESOURCE_REGISTRY).insert(
        handle,
        ResourceEntry {
            owner,
            resource: Arc::new(resource),
        },
    );
    handle
}

/// Remove an executor and every object created from it
///
/// Returns the number of executables and resources released with it.
pub(crate) fn remove_executor(handle: u64) -> FfiResult<(usize, usize)> {
    let mut executors = lock_registry(&EXECUTOR_REGISTRY);
    let executor = executors
        .remove(&handle)
        .ok_or_else(|| FfiError::invalid_handle("executor", handle))?;

    let mut executables = lock_registry(&EXECUTABLE_REGISTRY);
    let before = executables.len();
    executables.retain(|_, entry| entry.owner != handle);
    let executables_removed = before - executables.len();
    drop(executables);

    let mut resources = lock_registry(&RESOURCE_REGISTRY);
    let before = resources.len();
    resources.retain(|_, entry| entry.owner != handle);
    let resources_removed = before - resources.len();
    drop(resources);

    drop(executors);
    drop(executor);
    Ok((executables_removed, resources_removed))
}

pub(crate) fn remove_executable(handle: u64) -> FfiResult<()> {
    lock_registry(&EXECUTABLE_REGISTRY)
        .remove(&handle)
        .map(drop)
        .ok_or_else(|| FfiError::invalid_handle("executable", handle))
}

pub(crate) fn remove_resource(handle: u64) -> FfiResult<()> {
    lock_registry(&RESOURCE_REGISTRY)
        .remove(&handle)
        .map(drop)
        .ok_or_else(|| FfiError::invalid_handle("resource", handle))
}

/// Number of live (executors, executables, resources)
pub fn live_handle_counts() -> (usize, usize, usize) {
    (
        lock_registry(&EXECUTOR_REGISTRY).len(),
        lock_registry(&EXECUTABLE_REGISTRY).len(),
        lock_registry(&RESOURCE_REGISTRY).len(),
    )
}

/// Clear all registries (for testing/debugging)
///
/// # Warning
///
/// This will invalidate all existing handles. Use only for testing.
pub fn clear_all_registries() {
    lock_registry(&EXECUTABLE_REGISTRY).clear();
    lock_registry(&RESOURCE_REGISTRY).clear();
    lock_registry(&EXECUTOR_REGISTRY).clear();
    tracing::info!("All registries cleared");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_handle_generation() {
        let h1 = generate_handle();
        let h2 = generate_handle();

        assert!(h1 > 0);
        assert!(h2 > h1);
    }

    #[test]
    #[serial]
    fn test_remove_executor_purges_children() {
        clear_all_registries();
        let executor = Executor::new().unwrap();
        let resource = executor.new_resource().unwrap();
        let handle = insert_executor(executor);
        insert_resource(handle, resource);
        insert_executable(handle, ExecutableState::Invalid);
        assert_eq!(live_handle_counts(), (1, 1, 1));

        assert_eq!(remove_executor(handle).unwrap(), (1, 1));
        assert_eq!(live_handle_counts(), (0, 0, 0));
        assert!(matches!(remove_executor(handle), Err(FfiError::InvalidHandle { .. })));
    }

    #[test]
    #[serial]
    fn test_invalid_executable_only_allows_destroy() {
        clear_all_registries();
        let handle = insert_executable(1, ExecutableState::Invalid);

        assert!(matches!(executable(handle), Err(FfiError::InvalidState(_))));
        assert!(remove_executable(handle).is_ok());
        assert!(matches!(executable(handle), Err(FfiError::InvalidHandle { .. })));
    }

    #[test]
    #[serial]
    fn test_unknown_handles() {
        clear_all_registries();
        assert!(matches!(executor(0), Err(FfiError::InvalidHandle { kind: "executor", handle: 0 })));
        assert!(matches!(resource(77), Err(FfiError::InvalidHandle { kind: "resource", .. })));
        assert!(remove_resource(77).is_err());
    }
}
