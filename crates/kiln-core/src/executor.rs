//! Executor: the device context
//!
//! The `Executor` owns a `kiln-backends::Backend`, the storage of every
//! resource it created, a program cache, and a single dispatch queue.
//!
//! ## Architecture
//!
//! ```text
//! kiln-core::Executor ──owns──> Device
//!                                ├── Backend (CpuBackend)
//!                                ├── resource storage (shadow + device buffer)
//!                                ├── DispatchQueue (one run at a time)
//!                                └── ProgramCache
//! Resource / Executable ──weak──> Device
//! ```
//!
//! Resources and executables hold weak references: once the executor is
//! destroyed, its storage is released and every surviving handle reports
//! [`Error::Destroyed`].

use crate::config::ExecutorConfig;
use crate::dispatch::DispatchQueue;
use crate::error::{Error, Result};
use crate::executable::Executable;
use crate::instrumentation::AggregateStatistics;
use crate::resource::{Resource, ResourceId, Storage};
use kiln_backends::isa::compile_program;
use kiln_backends::{Backend, CpuBackend, CpuBackendConfig, Program, ProgramCache};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by an executor and the handles it created
pub(crate) struct Device {
    pub(crate) id: u64,
    pub(crate) backend: RwLock<Box<dyn Backend + Send + Sync>>,
    pub(crate) resources: Mutex<HashMap<ResourceId, Storage>>,
    pub(crate) queue: Mutex<DispatchQueue>,
    pub(crate) config: ExecutorConfig,
    programs: ProgramCache,
    next_resource: AtomicU64,
}

impl Device {
    /// Drop a resource's storage and free its device buffer
    pub(crate) fn release_resource(&self, id: ResourceId) {
        let Some(mut storage) = self.resources.lock().remove(&id) else {
            return;
        };
        if let Err(err) = storage.release(&mut **self.backend.write()) {
            tracing::warn!(resource = %id, error = %err, "resource_release_failed");
        }
        tracing::trace!(executor = self.id, resource = %id, "resource_destroyed");
    }
}

fn create_backend(config: &ExecutorConfig) -> Result<Box<dyn Backend + Send + Sync>> {
    match config.backend.as_str() {
        "cpu" => {
            let cpu_config = CpuBackendConfig {
                parallel: config.parallel,
                worker_threads: config.worker_threads,
            };
            let backend = CpuBackend::with_config(&cpu_config).map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
            Ok(Box::new(backend))
        }
        other => Err(Error::DeviceUnavailable(format!("unknown backend `{}`", other))),
    }
}

/// Device context: factory and owner of executables and resources
///
/// # Example
///
/// ```
/// use kiln_core::{Executor, Io};
///
/// # fn main() -> kiln_core::Result<()> {
/// let executor = Executor::new()?;
///
/// // count = NumWorkers
/// let mut executable = executor.new_executable(r#"{
///     "symbol": {"0": {"Variable": "U32"}},
///     "operation": [{"NumWorkers": 0}],
///     "output": {"count": 0}
/// }"#)?;
///
/// let count = executor.new_resource()?;
/// executable.bind("count", Io::Output, &count)?;
/// executable.run()?;
///
/// assert_eq!(count.get_uint32()?, 1);
/// # Ok(())
/// # }
/// ```
pub struct Executor {
    device: Arc<Device>,
}

impl Executor {
    /// Create an executor with the default configuration (CPU device)
    #[tracing::instrument]
    pub fn new() -> Result<Self> {
        Self::with_config(ExecutorConfig::default())
    }

    /// Create an executor with an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the backend name is unknown or the
    /// device cannot be initialized.
    #[tracing::instrument(skip(config), fields(backend = %config.backend))]
    pub fn with_config(config: ExecutorConfig) -> Result<Self> {
        let start = Instant::now();
        let backend = create_backend(&config)?;
        let id = NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed);

        let duration_us = start.elapsed().as_micros() as u64;
        tracing::debug!(
            duration_us = duration_us,
            executor = id,
            backend = backend.name(),
            block_size = config.block_size,
            "executor_created"
        );

        Ok(Self {
            device: Arc::new(Device {
                id,
                backend: RwLock::new(backend),
                resources: Mutex::new(HashMap::new()),
                queue: Mutex::new(DispatchQueue::default()),
                config,
                programs: ProgramCache::new(),
                next_resource: AtomicU64::new(1),
            }),
        })
    }

    /// Compile `source` into an executable
    ///
    /// Identical sources share one compiled program.
    ///
    /// # Errors
    ///
    /// Returns `Compilation` with every diagnostic the compiler found.
    #[tracing::instrument(skip(self, source), fields(executor = self.device.id, source_bytes = source.len()))]
    pub fn new_executable(&self, source: &str) -> Result<Executable> {
        let start = Instant::now();
        let program = self.device.programs.get_or_compile(source)?;

        tracing::debug!(
            duration_us = start.elapsed().as_micros() as u64,
            parameters = program.parameters().len(),
            operations = program.operation_count(),
            "executable_created"
        );
        Ok(Executable::new(program, self.device.id, &self.device))
    }

    /// Create an executable from an already built program
    #[tracing::instrument(skip(self, program), fields(executor = self.device.id))]
    pub fn new_executable_from_program(&self, program: Program) -> Result<Executable> {
        let program = compile_program(program)?;
        Ok(Executable::new(Arc::new(program), self.device.id, &self.device))
    }

    /// Create an empty resource
    #[tracing::instrument(skip(self), fields(executor = self.device.id))]
    pub fn new_resource(&self) -> Result<Resource> {
        let id = ResourceId(self.device.next_resource.fetch_add(1, Ordering::Relaxed));
        self.device.resources.lock().insert(id, Storage::new());
        tracing::trace!(resource = %id, "resource_created");
        Ok(Resource::new(id, self.device.id, &self.device))
    }

    /// Release the device, its queue, and all storage
    ///
    /// Resources and executables created by this executor fail every later
    /// operation with [`Error::Destroyed`].
    pub fn destroy(self) {}

    pub fn id(&self) -> u64 {
        self.device.id
    }

    pub fn backend_name(&self) -> &'static str {
        self.device.backend.read().name()
    }

    /// Number of live resources
    pub fn resource_count(&self) -> usize {
        self.device.resources.lock().len()
    }

    /// Number of distinct compiled sources
    pub fn cached_programs(&self) -> usize {
        self.device.programs.len()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.device.config
    }

    /// Statistics of all successful runs on this executor
    pub fn statistics(&self) -> AggregateStatistics {
        self.device.queue.lock().statistics().clone()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.device.id)
            .field("backend", &self.backend_name())
            .finish()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let resources = self.device.resources.lock().len();
        tracing::debug!(executor = self.device.id, resources = resources, "executor_destroyed");
    }
}
