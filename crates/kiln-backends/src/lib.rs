//! Program IR, compiler, and device backends for kiln
//!
//! This crate provides:
//! - **Program IR**: token-based compute programs described as JSON
//! - **Compiler**: whole-program type checking with collected diagnostics
//! - **Backend Trait**: pluggable device interface (buffers + dispatch)
//! - **CPU Backend**: reference device interpreting the IR with rayon
//! - **Program Cache**: compiled programs shared by source text
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Program source (JSON)           │
//! └─────────────────────┬───────────────────────┘
//!                       │ isa::compile
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │     CompiledProgram (signature + IR)         │
//! └─────────────────────┬───────────────────────┘
//!                       │ Backend::execute_program
//!                       ▼
//!               ┌───────────────┐
//!               │  CpuBackend   │
//!               └───────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use kiln_backends::{compile, Backend, CpuBackend, Io, LaunchConfig, ParameterBinding};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::new();
//!
//! // out = in + 1.5
//! let program = compile(r#"{
//!     "symbol": {
//!         "0": {"Variable": "F32"}, "1": {"Variable": "F32"},
//!         "2": {"Constant": "F32"}, "3": {"Constant": "F32"}, "4": {"Constant": "F32"}
//!     },
//!     "operation": [
//!         {"Load": [2, 0]},
//!         {"Constant": [3, {"F32": 1.5}]},
//!         {"Add": [4, 2, 3]},
//!         {"Store": [1, 4]}
//!     ],
//!     "input": {"in": 0},
//!     "output": {"out": 1}
//! }"#)?;
//!
//! let input = backend.allocate_buffer(4)?;
//! backend.copy_to_buffer(input, bytemuck::bytes_of(&2.0f32))?;
//! let output = backend.allocate_buffer(0)?;
//!
//! let bindings = [
//!     ParameterBinding::new(program.parameter("in", Io::Input).unwrap(), input),
//!     ParameterBinding::new(program.parameter("out", Io::Output).unwrap(), output),
//! ];
//! backend.execute_program(&program, &bindings, &LaunchConfig::default())?;
//!
//! let mut result = [0.0f32];
//! backend.copy_from_buffer(output, bytemuck::cast_slice_mut(&mut result))?;
//! assert_eq!(result[0], 3.5);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod error;
pub mod isa;
pub mod program_cache;

// Re-export commonly used types
pub use backend::{
    Backend, BlockDim, BufferHandle, ExecutionContext, ExecutionReport, GridDim, LaunchConfig, ParameterBinding,
};
pub use backends::{CpuBackend, CpuBackendConfig};
pub use error::{BackendError, Result};
pub use isa::{
    compile, CompileError, CompiledProgram, DataType, Diagnostic, ElementKind, Io, Parameter, Program, ProgramError,
    Shape, TokenId,
};
pub use program_cache::ProgramCache;
