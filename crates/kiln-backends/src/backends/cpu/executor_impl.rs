//! Dispatch driver for the CPU backend
//!
//! Loads parameter buffers into shared token slots, runs every active lane,
//! and writes outputs back only when the whole dispatch succeeded.

use super::interpreter::{Deadline, Lane, SharedTokens};
use super::memory::MemoryManager;
use crate::backend::{ExecutionContext, ExecutionReport, LaunchConfig, ParameterBinding};
use crate::error::{BackendError, Result};
use crate::isa::{CompiledProgram, Io, Parameter, TokenValue};
use kiln_tracing::perf_span;
use kiln_tracing::performance::{record_dispatch, record_transfer, Transfer};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// CPU executor implementation
pub struct CpuExecutor {
    /// Shared memory manager
    memory: Arc<RwLock<MemoryManager>>,
    pool: Option<Arc<rayon::ThreadPool>>,
    parallel: bool,
}

impl CpuExecutor {
    /// Create a new CPU executor
    pub fn new(memory: Arc<RwLock<MemoryManager>>, pool: Option<Arc<rayon::ThreadPool>>, parallel: bool) -> Self {
        Self { memory, pool, parallel }
    }

    pub fn execute(
        &self,
        compiled: &CompiledProgram,
        bindings: &[ParameterBinding],
        config: &LaunchConfig,
    ) -> Result<ExecutionReport> {
        let start = Instant::now();
        let _span = perf_span!(
            "cpu_execute_program",
            operations = compiled.operation_count(),
            grid_size = config.grid.x,
            block_size = config.block.x
        );

        let shared = self.load_parameters(compiled, bindings)?;
        let deadline = Deadline::new(config.timeout);
        let operations = AtomicU64::new(0);
        let program = compiled.program();
        let total_blocks = config.total_blocks() as usize;
        let lanes = config.block.total_lanes();
        let work_size = config.work_size;

        let run_block = |block_idx: usize| -> Result<()> {
            deadline.check()?;
            for lane_idx in 0..lanes {
                let context = ExecutionContext::new(block_idx as u32, lane_idx, config.block);
                let worker_id = context.global_lane_index();
                if worker_id >= u64::from(work_size) {
                    break;
                }
                let executed = Lane::new(program, &shared, &deadline, worker_id as u32, work_size).run()?;
                operations.fetch_add(executed, Ordering::Relaxed);
            }
            Ok(())
        };

        if self.parallel && !compiled.uses_barriers() && total_blocks > 1 {
            match &self.pool {
                Some(pool) => pool.install(|| (0..total_blocks).into_par_iter().try_for_each(&run_block))?,
                None => (0..total_blocks).into_par_iter().try_for_each(&run_block)?,
            }
        } else {
            (0..total_blocks).try_for_each(&run_block)?;
        }

        self.store_outputs(compiled, bindings, &shared)?;

        let report = ExecutionReport {
            workers: u64::from(work_size),
            operations: operations.into_inner(),
            duration_us: start.elapsed().as_micros() as u64,
        };
        record_dispatch(report.workers, report.operations, report.duration_us);
        Ok(report)
    }

    fn binding_for<'b>(bindings: &'b [ParameterBinding], parameter: &Parameter) -> Result<&'b ParameterBinding> {
        let binding = bindings
            .iter()
            .find(|binding| binding.token == parameter.token && binding.io == parameter.io)
            .ok_or_else(|| BackendError::execution_error(format!("no buffer bound for {}", parameter)))?;

        if binding.kind != parameter.kind || binding.shape != parameter.shape {
            return Err(BackendError::type_mismatch(
                format!("{} {}", parameter.kind, parameter.shape),
                format!("{} {}", binding.kind, binding.shape),
            ));
        }
        Ok(binding)
    }

    /// Seed shared slots: inputs from their buffers, output-only tokens empty.
    ///
    /// Parameters are ordered inputs first, so a token that is both input
    /// and output keeps its input value.
    fn load_parameters(&self, compiled: &CompiledProgram, bindings: &[ParameterBinding]) -> Result<SharedTokens> {
        let transfer_start = Instant::now();
        let memory = self.memory.read();
        let mut shared = SharedTokens::new();
        let mut bytes_read = 0;

        for parameter in compiled.parameters() {
            let binding = Self::binding_for(bindings, parameter)?;
            let bytes = memory.buffer(binding.buffer)?;
            let value = match parameter.io {
                Io::Input => {
                    bytes_read += bytes.len();
                    TokenValue::from_bytes(parameter.kind, parameter.shape, bytes).ok_or_else(|| {
                        BackendError::type_mismatch(
                            format!("{} {}", parameter.kind, parameter.shape),
                            format!("{} byte buffer", bytes.len()),
                        )
                    })?
                }
                Io::Output => TokenValue::Null,
            };
            shared.entry(parameter.token).or_insert_with(|| Mutex::new(value));
        }

        record_transfer(bytes_read, Transfer::Load, transfer_start.elapsed().as_micros() as u64);
        Ok(shared)
    }

    /// Encode every output, then replace the bound buffers in one pass
    fn store_outputs(&self, compiled: &CompiledProgram, bindings: &[ParameterBinding], shared: &SharedTokens) -> Result<()> {
        let transfer_start = Instant::now();
        let mut staged = Vec::new();

        for parameter in compiled.outputs() {
            let binding = Self::binding_for(bindings, parameter)?;
            let slot = shared
                .get(&parameter.token)
                .ok_or_else(|| BackendError::execution_error(format!("{} has no slot", parameter)))?;
            let value = slot.lock();

            let produced = value.token_type();
            if produced.shape() != Some(parameter.shape) || produced.data_type() != Some(parameter.kind.data_type()) {
                return match *value {
                    TokenValue::Null => Err(BackendError::execution_error(format!(
                        "output `{}` was never written",
                        parameter.name
                    ))),
                    _ => Err(BackendError::type_mismatch(
                        format!("{} {}", parameter.kind, parameter.shape),
                        produced,
                    )),
                };
            }

            if let Some(bytes) = value.to_bytes() {
                staged.push((binding.buffer, bytes));
            }
        }

        let mut memory = self.memory.write();
        let mut bytes_written = 0;
        for (buffer, bytes) in staged {
            bytes_written += bytes.len();
            memory.replace_buffer(buffer, bytes)?;
        }
        record_transfer(bytes_written, Transfer::Store, transfer_start.elapsed().as_micros() as u64);
        Ok(())
    }
}
