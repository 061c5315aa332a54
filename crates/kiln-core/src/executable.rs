//! Compiled programs with their binding tables

use crate::binding::{self, BindingTable};
use crate::dispatch;
use crate::error::{Error, Result};
use crate::executor::Device;
use crate::instrumentation::RunReport;
use crate::resource::{Resource, ResourceId, Storage};
use kiln_backends::{CompiledProgram, Io, Parameter, ParameterBinding, Shape};
use kiln_tracing::performance::{record_transfer, Transfer};
use kiln_tracing::timed_block;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// A compiled program plus the resources bound to its parameters
///
/// Created by [`Executor::new_executable`](crate::Executor::new_executable).
/// Runs are synchronous: [`run`](Self::run) returns once the dispatch has
/// completed on the executor's queue.
pub struct Executable {
    program: Arc<CompiledProgram>,
    bindings: BindingTable,
    executor_id: u64,
    device: Weak<Device>,
}

impl Executable {
    pub(crate) fn new(program: Arc<CompiledProgram>, executor_id: u64, device: &Arc<Device>) -> Self {
        Self {
            program,
            bindings: BindingTable::new(),
            executor_id,
            device: Arc::downgrade(device),
        }
    }

    fn device(&self) -> Result<Arc<Device>> {
        self.device.upgrade().ok_or(Error::Destroyed("executable"))
    }

    /// Declared parameters, inputs first
    pub fn parameters(&self) -> &[Parameter] {
        self.program.parameters()
    }

    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Bind `resource` to parameter `name` in direction `io`
    ///
    /// Returns the resource previously bound to that key. Nothing is
    /// type-checked until [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// `ForeignResource` if the resource comes from another executor,
    /// `Destroyed` if the executor is gone.
    pub fn bind(&mut self, name: &str, io: Io, resource: &Resource) -> Result<Option<ResourceId>> {
        self.device()?;
        if resource.executor_id() != self.executor_id {
            return Err(Error::ForeignResource {
                resource: resource.id().id(),
            });
        }

        let previous = self.bindings.bind(name, io, resource.id());
        tracing::trace!(parameter = name, io = %io, resource = %resource.id(), "parameter_bound");
        Ok(previous)
    }

    /// Remove the binding for (`name`, `io`); a no-op returning `None` if unbound
    pub fn unbind(&mut self, name: &str, io: Io) -> Result<Option<ResourceId>> {
        self.device()?;
        Ok(self.bindings.unbind(name, io))
    }

    /// Validate bindings, upload dirty inputs, dispatch, and wait
    ///
    /// Validation failures happen before any transfer and leave every
    /// resource unchanged. A failed dispatch leaves outputs untouched and the
    /// executable usable.
    #[tracing::instrument(skip(self), fields(executor = self.executor_id, parameters = self.program.parameters().len()))]
    pub fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let device = self.device()?;
        let mut queue = device.queue.lock();
        let submission = queue.submit();

        let mut resources = device.resources.lock();
        let resolved = binding::resolve(&self.program, &self.bindings, &resources)?;

        let array_lengths: Vec<usize> = resolved
            .iter()
            .filter(|binding| binding.parameter.shape == Shape::Array)
            .filter_map(|binding| resources.get(&binding.resource).map(Storage::len))
            .collect();
        let dispatch_size = dispatch::dispatch_size(array_lengths, device.config.default_dispatch_size);
        let launch = dispatch::launch_config(dispatch_size, &device.config);

        let mut backend = device.backend.write();
        let ((parameter_bindings, bytes_uploaded), upload_us) = timed_block!("upload_inputs", {
            let mut bytes_uploaded = 0;
            let mut parameter_bindings = Vec::with_capacity(resolved.len());
            for binding in &resolved {
                let storage = resources.get_mut(&binding.resource).ok_or_else(|| Error::DanglingBinding {
                    name: binding.parameter.name.clone(),
                    io: binding.parameter.io,
                })?;
                if binding.parameter.io == Io::Input {
                    bytes_uploaded += storage.upload(&mut **backend)?;
                }
                let buffer = storage.ensure_buffer(&mut **backend)?;
                parameter_bindings.push(ParameterBinding::new(binding.parameter, buffer));
            }
            (parameter_bindings, bytes_uploaded)
        });
        if bytes_uploaded > 0 {
            record_transfer(bytes_uploaded, Transfer::Upload, upload_us);
        }

        let dispatch_start = Instant::now();
        let execution = backend
            .execute_program(&self.program, &parameter_bindings, &launch)
            .map_err(|err| {
                tracing::debug!(submission = submission, error = %err, "run_failed");
                Error::from_dispatch(err)
            })?;
        let dispatch_us = dispatch_start.elapsed().as_micros() as u64;

        for binding in resolved.iter().filter(|binding| binding.parameter.io == Io::Output) {
            if let Some(storage) = resources.get_mut(&binding.resource) {
                storage.mark_written(binding.parameter.shape, binding.parameter.kind, &**backend)?;
            }
        }

        let report = RunReport {
            workers: execution.workers,
            operations: execution.operations,
            bytes_uploaded,
            upload_us,
            dispatch_us,
            duration_us: start.elapsed().as_micros() as u64,
        };
        queue.complete(&report);
        report.log();
        Ok(report)
    }

    /// Release the compiled program; bound resources are untouched
    pub fn destroy(self) {}
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("executor", &self.executor_id)
            .field("parameters", &self.program.parameters().len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl Drop for Executable {
    fn drop(&mut self) {
        tracing::trace!(executor = self.executor_id, bindings = self.bindings.len(), "executable_destroyed");
    }
}
