//! # kiln-core - Compute Execution Object Model
//!
//! Host-side objects for running compute programs on a device:
//!
//! - [`Executor`]: a device context with one dispatch queue. Factory and
//!   owner of everything below.
//! - [`Executable`]: a compiled program plus a table binding its named
//!   INPUT/OUTPUT parameters to resources.
//! - [`Resource`]: typed storage holding one `u32`/`i32`/`f32` scalar or a
//!   variable-length array of them.
//!
//! ## Architecture
//!
//! ```text
//! source (JSON IR) ──compile──> CompiledProgram ──┐
//!                                                 ├── Executable::run
//! Resource (host shadow) ──upload when dirty──────┘        │
//!                                                          ▼
//!                                    kiln-backends::Backend::execute_program
//!                                                          │
//! Resource getters <──download when device-authoritative───┘
//! ```
//!
//! Runs are synchronous: `run` validates every binding, uploads dirty
//! inputs, dispatches one worker per element of the largest bound array,
//! and returns once the device has finished.
//!
//! ## Example
//!
//! ```
//! use kiln_core::{Executor, Io};
//!
//! # fn main() -> kiln_core::Result<()> {
//! let executor = Executor::new()?;
//!
//! // output[i] = input[i] * 2
//! let mut executable = executor.new_executable(r#"{
//!     "symbol": {
//!         "0": {"Array": "F32"}, "1": {"Array": "F32"},
//!         "2": {"Constant": "U32"}, "3": {"Constant": "U32"}, "4": {"Constant": "Bool"},
//!         "5": {"Constant": "F32"}, "6": {"Constant": "F32"}, "7": {"Constant": "F32"}
//!     },
//!     "operation": [
//!         {"WorkerId": 2},
//!         {"ArrayLen": [3, 0]},
//!         {"ArrayNew": [1, 3, "F32", 0, true]},
//!         {"Lt": [4, 2, 3]},
//!         {"If": [[], 4, 0, [
//!             {"ArrayLoad": [5, 0, 2]},
//!             {"Constant": [6, {"F32": 2.0}]},
//!             {"Mul": [7, 5, 6]},
//!             {"ArrayStore": [1, 2, 7]}
//!         ], 1]}
//!     ],
//!     "input": {"input": 0},
//!     "output": {"output": 1}
//! }"#)?;
//!
//! let input = executor.new_resource()?;
//! let output = executor.new_resource()?;
//! input.set_data_array_float32(&[1.0, 2.0, 3.0, 4.0])?;
//!
//! executable.bind("input", Io::Input, &input)?;
//! executable.bind("output", Io::Output, &output)?;
//! executable.run()?;
//!
//! assert_eq!(output.get_data_array_float32()?.as_slice(), &[2.0, 4.0, 6.0, 8.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`builder`] - Build programs in Rust instead of JSON
//! - [`config`] - Executor configuration (`KILN_*` environment variables)
//! - [`dispatch`] - Dispatch-size policy
//! - [`instrumentation`] - Per-run reports and aggregate statistics

pub mod binding;
pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executable;
pub mod executor;
pub mod instrumentation;
pub mod resource;

// Re-export primary types
pub use binding::BindingTable;
pub use config::ExecutorConfig;
pub use error::{Error, Result};
pub use executable::Executable;
pub use executor::Executor;
pub use instrumentation::{AggregateStatistics, RunReport};
pub use resource::{DataArray, Element, Resource, ResourceData, ResourceId};

pub use kiln_backends::{DataType, Diagnostic, ElementKind, Io, Parameter, Program, Shape};
