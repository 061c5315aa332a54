//! Dispatch geometry, buffer handles, and per-dispatch bindings

use crate::isa::{ElementKind, Io, Parameter, Shape, TokenId};
use std::fmt;
use std::time::Duration;

/// Opaque id of a device buffer; only meaningful to the backend that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    pub const fn new(id: u64) -> Self {
        BufferHandle(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// Number of blocks in a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDim {
    pub x: u32,
}

impl GridDim {
    pub const fn linear(size: u32) -> Self {
        Self { x: size }
    }

    pub const fn total_blocks(&self) -> u64 {
        self.x as u64
    }
}

impl Default for GridDim {
    fn default() -> Self {
        Self { x: 1 }
    }
}

impl fmt::Display for GridDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.x)
    }
}

/// Number of lanes (workers) per block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDim {
    pub x: u32,
}

impl BlockDim {
    pub const fn linear(size: u32) -> Self {
        Self { x: size }
    }

    /// Lanes in one block
    pub const fn total_lanes(&self) -> u32 {
        self.x
    }
}

impl Default for BlockDim {
    fn default() -> Self {
        Self { x: 1 }
    }
}

impl fmt::Display for BlockDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.x)
    }
}

/// Launch configuration for a dispatch
///
/// The grid covers at least `work_size` lanes; lanes whose global index is
/// `>= work_size` stay idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Blocks in the dispatch
    pub grid: GridDim,

    /// Lanes per block
    pub block: BlockDim,

    /// Number of active lanes, reported to programs by `NumWorkers`
    pub work_size: u32,

    /// Cooperative deadline for the whole dispatch
    pub timeout: Option<Duration>,
}

impl LaunchConfig {
    /// Create a launch configuration where every lane of the grid is active
    pub const fn new(grid: GridDim, block: BlockDim) -> Self {
        Self {
            grid,
            block,
            work_size: grid.x.saturating_mul(block.x),
            timeout: None,
        }
    }

    /// Cover `total_elements` lanes with blocks of `block_size`
    ///
    /// A `block_size` of zero is treated as one.
    pub const fn linear(total_elements: u32, block_size: u32) -> Self {
        let block_size = if block_size == 0 { 1 } else { block_size };
        Self {
            grid: GridDim::linear(total_elements.div_ceil(block_size)),
            block: BlockDim::linear(block_size),
            work_size: total_elements,
            timeout: None,
        }
    }

    /// Attach a dispatch deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub const fn total_blocks(&self) -> u64 {
        self.grid.total_blocks()
    }

    /// Lanes across the grid, idle lanes included
    pub const fn total_lanes(&self) -> u64 {
        self.block.x as u64 * self.grid.x as u64
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::linear(1, 1)
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid={}, block={}, work_size={}", self.grid, self.block, self.work_size)
    }
}

/// Position of one lane in the grid
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    pub block_idx: u32,
    pub lane_idx: u32,
    pub block_dim: BlockDim,
}

impl ExecutionContext {
    pub const fn new(block_idx: u32, lane_idx: u32, block_dim: BlockDim) -> Self {
        Self {
            block_idx,
            lane_idx,
            block_dim,
        }
    }

    /// Index of the lane across the whole grid (the program's `WorkerId`)
    pub const fn global_lane_index(&self) -> u64 {
        self.block_idx as u64 * self.block_dim.x as u64 + self.lane_idx as u64
    }
}

/// A device buffer attached to one program parameter for a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterBinding {
    pub token: TokenId,
    pub io: Io,
    pub shape: Shape,
    pub kind: ElementKind,
    pub buffer: BufferHandle,
}

impl ParameterBinding {
    pub fn new(parameter: &Parameter, buffer: BufferHandle) -> Self {
        Self {
            token: parameter.token,
            io: parameter.io,
            shape: parameter.shape,
            kind: parameter.kind,
            buffer,
        }
    }
}

/// Summary of a completed dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Active lanes that ran the program
    pub workers: u64,
    /// Operations executed across all workers
    pub operations: u64,
    pub duration_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_handle_display() {
        let buffer = BufferHandle::new(7);
        assert_eq!(buffer.id(), 7);
        assert_eq!(format!("{}", buffer), "buf7");
    }

    #[test]
    fn test_launch_config_linear() {
        let config = LaunchConfig::linear(1000, 256);
        assert_eq!(config.grid.x, 4);
        assert_eq!(config.block.x, 256);
        assert_eq!(config.work_size, 1000);
        assert_eq!(config.total_lanes(), 1024);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_launch_config_zero_block_size() {
        let config = LaunchConfig::linear(3, 0);
        assert_eq!(config.block.x, 1);
        assert_eq!(config.grid.x, 3);
    }

    #[test]
    fn test_launch_config_new_and_timeout() {
        let config = LaunchConfig::new(GridDim::linear(2), BlockDim::linear(8)).with_timeout(Duration::from_millis(5));
        assert_eq!(config.work_size, 16);
        assert_eq!(config.total_blocks(), 2);
        assert_eq!(config.timeout, Some(Duration::from_millis(5)));
        assert_eq!(config.to_string(), "grid=(2), block=(8), work_size=16");
    }

    #[test]
    fn test_execution_context() {
        let ctx = ExecutionContext::new(3, 5, BlockDim::linear(64));
        assert_eq!(ctx.global_lane_index(), 3 * 64 + 5);
    }
}
