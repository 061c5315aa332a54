//! Backend trait and types for program execution

mod traits;
mod types;

pub use traits::Backend;
pub use types::{BlockDim, BufferHandle, ExecutionContext, ExecutionReport, GridDim, LaunchConfig, ParameterBinding};
