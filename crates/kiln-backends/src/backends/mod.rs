//! Backend implementations for different execution targets
//!
//! - `cpu` - CPU backend (reference implementation, interprets the IR)

pub mod cpu;

pub use cpu::{CpuBackend, CpuBackendConfig};
