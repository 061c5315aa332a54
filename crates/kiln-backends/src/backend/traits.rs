//! Backend trait for program execution
//!
//! This trait is the boundary between the kiln object model and a device.
//! A backend owns device memory (addressed by [`BufferHandle`]) and runs
//! compiled programs against buffers bound to program parameters.

use super::types::{BufferHandle, ExecutionReport, LaunchConfig, ParameterBinding};
use crate::error::Result;
use crate::isa::CompiledProgram;

/// Backend trait for program execution
///
/// # Memory Model
///
/// Buffers are untyped byte storage. Input parameters are read from their
/// buffers when a dispatch starts; output parameters are written back only
/// after the whole dispatch succeeds, and each output buffer is resized to
/// the produced value. A failed dispatch leaves every buffer untouched.
///
/// # Usage
///
/// ```rust
/// use kiln_backends::{Backend, CpuBackend};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut backend = CpuBackend::new();
///
/// let buffer = backend.allocate_buffer(16)?;
/// let data = vec![1.0f32, 2.0, 3.0, 4.0];
/// backend.copy_to_buffer(buffer, bytemuck::cast_slice(&data))?;
///
/// let mut results = vec![0.0f32; 4];
/// backend.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut results))?;
/// assert_eq!(results, data);
///
/// backend.free_buffer(buffer)?;
/// # Ok(())
/// # }
/// ```
pub trait Backend {
    /// Short device name used in logs (`"cpu"`)
    fn name(&self) -> &'static str;

    // ============================================================================================
    // Program Execution
    // ============================================================================================

    /// Run `program` once per active lane of `config`
    ///
    /// Blocks until every lane has finished. `bindings` must cover every
    /// parameter the program declares.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A binding refers to an unknown buffer or is missing
    /// - An input buffer does not decode as the declared kind/shape
    /// - A lane fails (out-of-bounds index, division by zero, ...)
    /// - The dispatch exceeds `config.timeout`
    fn execute_program(
        &mut self,
        program: &CompiledProgram,
        bindings: &[ParameterBinding],
        config: &LaunchConfig,
    ) -> Result<ExecutionReport>;

    // ============================================================================================
    // Buffer Management
    // ============================================================================================

    /// Allocate a zero-filled buffer of the given size in bytes
    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle>;

    /// Free a previously allocated buffer
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer handle is invalid.
    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()>;

    /// Change a buffer's size, zero-filling any new bytes
    fn resize_buffer(&mut self, handle: BufferHandle, size: usize) -> Result<()>;

    /// Copy data from host to the start of a buffer
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer handle is invalid
    /// - Data size exceeds buffer size
    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()>;

    /// Copy data from the start of a buffer to host
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer handle is invalid
    /// - Destination is larger than the buffer
    fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()>;

    /// Get the size of a buffer in bytes
    fn buffer_size(&self, handle: BufferHandle) -> Result<usize>;

    /// Number of live buffers
    fn buffer_count(&self) -> usize;
}
