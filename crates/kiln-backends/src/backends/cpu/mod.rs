//! CPU backend implementation
//!
//! Reference implementation of the Backend trait. Programs are interpreted
//! lane by lane; blocks of lanes run in parallel on a rayon pool unless the
//! program uses barriers.
//!
//! # Architecture
//!
//! ```text
//! CpuBackend
//! ├── MemoryManager  - Heap buffers keyed by handle
//! ├── CpuExecutor    - Parameter load, dispatch, output write-back
//! ├── Lane           - Structured IR interpreter (one per active lane)
//! └── Parallel       - Rayon-based block execution
//! ```
//!
//! # Usage
//!
//! ```rust
//! use kiln_backends::isa::compile;
//! use kiln_backends::{Backend, CpuBackend, LaunchConfig, ParameterBinding};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::new();
//! let program = compile(r#"{
//!     "symbol": {"0": {"Variable": "U32"}},
//!     "operation": [{"NumWorkers": 0}],
//!     "output": {"count": 0}
//! }"#)?;
//!
//! let buffer = backend.allocate_buffer(0)?;
//! let bindings = [ParameterBinding::new(&program.parameters()[0], buffer)];
//! backend.execute_program(&program, &bindings, &LaunchConfig::linear(8, 4))?;
//!
//! let mut count = [0u32];
//! backend.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut count))?;
//! assert_eq!(count[0], 8);
//! # Ok(())
//! # }
//! ```

mod executor_impl;
mod interpreter;
pub(crate) mod memory;
mod ops;

use crate::backend::{Backend, BufferHandle, ExecutionReport, LaunchConfig, ParameterBinding};
use crate::error::{BackendError, Result};
use crate::isa::CompiledProgram;
use executor_impl::CpuExecutor;
use memory::MemoryManager;
use parking_lot::RwLock;
use std::sync::Arc;

/// Construction options for [`CpuBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuBackendConfig {
    /// Run blocks of lanes in parallel
    pub parallel: bool,
    /// Dedicated worker threads; `None` shares rayon's global pool
    pub worker_threads: Option<usize>,
}

impl Default for CpuBackendConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            worker_threads: None,
        }
    }
}

/// CPU backend for executing kiln programs
#[derive(Clone)]
pub struct CpuBackend {
    /// Memory manager (device buffers)
    memory: Arc<RwLock<MemoryManager>>,
    pool: Option<Arc<rayon::ThreadPool>>,
    parallel: bool,
}

impl CpuBackend {
    /// Create a new CPU backend on rayon's global pool
    ///
    /// # Example
    ///
    /// ```rust
    /// use kiln_backends::CpuBackend;
    ///
    /// let backend = CpuBackend::new();
    /// ```
    pub fn new() -> Self {
        Self {
            memory: Arc::new(RwLock::new(MemoryManager::new())),
            pool: None,
            parallel: true,
        }
    }

    /// Create a CPU backend with explicit options
    ///
    /// # Errors
    ///
    /// Returns `DeviceInit` if a dedicated thread pool cannot be built.
    pub fn with_config(config: &CpuBackendConfig) -> Result<Self> {
        let pool = match config.worker_threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("kiln-cpu-{}", index))
                    .build()
                    .map_err(|err| BackendError::DeviceInit(err.to_string()))?;
                Some(Arc::new(pool))
            }
            None => None,
        };

        tracing::debug!(
            parallel = config.parallel,
            worker_threads = ?config.worker_threads,
            "cpu_backend_created"
        );

        Ok(Self {
            memory: Arc::new(RwLock::new(MemoryManager::new())),
            pool,
            parallel: config.parallel,
        })
    }

    /// Total bytes held by live buffers
    pub fn allocated_bytes(&self) -> usize {
        self.memory.read().total_bytes()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn execute_program(
        &mut self,
        program: &CompiledProgram,
        bindings: &[ParameterBinding],
        config: &LaunchConfig,
    ) -> Result<ExecutionReport> {
        let executor = CpuExecutor::new(Arc::clone(&self.memory), self.pool.clone(), self.parallel);
        executor.execute(program, bindings, config)
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        self.memory.write().allocate_buffer(size)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.memory.write().free_buffer(handle)
    }

    fn resize_buffer(&mut self, handle: BufferHandle, size: usize) -> Result<()> {
        self.memory.write().resize_buffer(handle, size)
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.write().copy_to_buffer(handle, data)
    }

    fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.memory.read().copy_from_buffer(handle, data)
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.memory.read().buffer_size(handle)
    }

    fn buffer_count(&self) -> usize {
        self.memory.read().buffer_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{compile, Io};
    use std::time::Duration;

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

    fn bind(backend: &mut CpuBackend, program: &CompiledProgram, input: &[u32]) -> (BufferHandle, BufferHandle, Vec<ParameterBinding>) {
        let input_buffer = backend.allocate_buffer(input.len() * 4).unwrap();
        backend.copy_to_buffer(input_buffer, bytemuck::cast_slice(input)).unwrap();
        let output_buffer = backend.allocate_buffer(0).unwrap();

        let bindings = vec![
            ParameterBinding::new(program.parameter("input", Io::Input).unwrap(), input_buffer),
            ParameterBinding::new(program.parameter("output", Io::Output).unwrap(), output_buffer),
        ];
        (input_buffer, output_buffer, bindings)
    }

    fn read_u32(backend: &CpuBackend, handle: BufferHandle) -> Vec<u32> {
        let mut values = vec![0u32; backend.buffer_size(handle).unwrap() / 4];
        backend.copy_from_buffer(handle, bytemuck::cast_slice_mut(&mut values)).unwrap();
        values
    }

    #[test]
    fn test_cpu_backend_creation() {
        let backend = CpuBackend::new();
        assert_eq!(backend.name(), "cpu");
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn test_cpu_backend_buffer_copy() {
        let mut backend = CpuBackend::new();
        let buffer = backend.allocate_buffer(16).unwrap();
        let data = [1.0f32, 2.0, 3.0, 4.0];
        backend.copy_to_buffer(buffer, bytemuck::cast_slice(&data)).unwrap();

        let mut result = [0.0f32; 4];
        backend.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut result)).unwrap();
        assert_eq!(result, data);
        assert_eq!(backend.allocated_bytes(), 16);

        backend.free_buffer(buffer).unwrap();
        assert!(backend.buffer_size(buffer).is_err());
    }

    #[test]
    fn test_double_program_parallel() {
        let mut backend = CpuBackend::new();
        let program = compile(DOUBLE_SOURCE).unwrap();
        let input: Vec<u32> = (0..100).collect();
        let (_, output, bindings) = bind(&mut backend, &program, &input);

        let report = backend
            .execute_program(&program, &bindings, &LaunchConfig::linear(100, 16))
            .unwrap();

        assert_eq!(report.workers, 100);
        assert!(report.operations >= 100 * 5);
        let expected: Vec<u32> = input.iter().map(|x| x * 2).collect();
        assert_eq!(read_u32(&backend, output), expected);
    }

    #[test]
    fn test_double_program_sequential_pool() {
        let config = CpuBackendConfig {
            parallel: false,
            worker_threads: Some(2),
        };
        let mut backend = CpuBackend::with_config(&config).unwrap();
        let program = compile(DOUBLE_SOURCE).unwrap();
        let (_, output, bindings) = bind(&mut backend, &program, &[1, 2, 3, 4]);

        backend
            .execute_program(&program, &bindings, &LaunchConfig::linear(4, 3))
            .unwrap();
        assert_eq!(read_u32(&backend, output), vec![2, 4, 6, 8]);
    }

    #[test]
    fn test_failed_dispatch_leaves_outputs_untouched() {
        let mut backend = CpuBackend::new();
        let program = compile(DOUBLE_SOURCE).unwrap();
        let (_, output, bindings) = bind(&mut backend, &program, &[1, 2]);
        backend.resize_buffer(output, 4).unwrap();
        backend.copy_to_buffer(output, bytemuck::cast_slice(&[77u32])).unwrap();

        // Timeout of zero fails before any lane runs
        let config = LaunchConfig::linear(2, 1).with_timeout(Duration::ZERO);
        let err = backend.execute_program(&program, &bindings, &config).unwrap_err();

        assert!(matches!(err, BackendError::Timeout { .. }));
        assert_eq!(read_u32(&backend, output), vec![77]);
    }

    #[test]
    fn test_unwritten_output_is_an_error() {
        let mut backend = CpuBackend::new();
        let program = compile(
            r#"{"symbol": {"0": {"Variable": "F32"}}, "operation": [], "output": {"never": 0}}"#,
        )
        .unwrap();
        let buffer = backend.allocate_buffer(0).unwrap();
        let bindings = [ParameterBinding::new(&program.parameters()[0], buffer)];

        let err = backend
            .execute_program(&program, &bindings, &LaunchConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("never written"));
    }

    #[test]
    fn test_missing_binding_is_an_error() {
        let mut backend = CpuBackend::new();
        let program = compile(DOUBLE_SOURCE).unwrap();
        let err = backend
            .execute_program(&program, &[], &LaunchConfig::default())
            .unwrap_err();
        assert!(err.is_execution_failure());
    }

    #[test]
    fn test_malformed_input_buffer_is_rejected() {
        let mut backend = CpuBackend::new();
        let program = compile(DOUBLE_SOURCE).unwrap();
        let (input, _, bindings) = bind(&mut backend, &program, &[1]);
        backend.resize_buffer(input, 3).unwrap();

        let err = backend
            .execute_program(&program, &bindings, &LaunchConfig::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::TypeMismatch { .. }));
    }
}
