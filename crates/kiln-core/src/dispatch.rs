//! Dispatch sizing and the per-executor dispatch queue
//!
//! The dispatch size of a run is the largest element count among the array
//! resources bound to it, inputs and outputs alike, floored at one. A run
//! with no array bound uses [`ExecutorConfig::default_dispatch_size`].
//!
//! ```
//! use kiln_core::dispatch::dispatch_size;
//!
//! assert_eq!(dispatch_size([4, 16, 2], 1), 16);
//! assert_eq!(dispatch_size([0], 1), 1);
//! assert_eq!(dispatch_size(std::iter::empty(), 8), 8);
//! ```

use crate::config::ExecutorConfig;
use crate::instrumentation::{AggregateStatistics, RunReport};
use kiln_backends::LaunchConfig;

/// Number of workers for a run given the lengths of its bound arrays
pub fn dispatch_size(array_lengths: impl IntoIterator<Item = usize>, default_dispatch_size: u32) -> u32 {
    match array_lengths.into_iter().max() {
        Some(len) => u32::try_from(len).unwrap_or(u32::MAX).max(1),
        None => default_dispatch_size.max(1),
    }
}

/// Launch configuration covering `dispatch_size` workers
///
/// Lanes of the last block beyond `dispatch_size` stay idle.
pub fn launch_config(dispatch_size: u32, config: &ExecutorConfig) -> LaunchConfig {
    let launch = LaunchConfig::linear(dispatch_size, config.block_size);
    match config.dispatch_timeout {
        Some(timeout) => launch.with_timeout(timeout),
        None => launch,
    }
}

/// State guarded by the executor's single dispatch queue
///
/// Holding the queue lock for a whole run serializes runs of one executor.
#[derive(Debug, Default)]
pub(crate) struct DispatchQueue {
    submitted: u64,
    statistics: AggregateStatistics,
}

impl DispatchQueue {
    /// Sequence number for the next submission
    pub(crate) fn submit(&mut self) -> u64 {
        self.submitted += 1;
        self.submitted
    }

    pub(crate) fn complete(&mut self, report: &RunReport) {
        self.statistics.record(report);
    }

    pub(crate) fn statistics(&self) -> &AggregateStatistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_largest_array_wins() {
        assert_eq!(dispatch_size([4, 4], 1), 4);
        assert_eq!(dispatch_size([3, 100, 7], 1), 100);
    }

    #[test]
    fn test_empty_arrays_floor_at_one() {
        assert_eq!(dispatch_size([0, 0], 1), 1);
        assert_eq!(dispatch_size([0], 32), 1);
    }

    #[test]
    fn test_no_arrays_uses_default() {
        assert_eq!(dispatch_size(std::iter::empty(), 1), 1);
        assert_eq!(dispatch_size(std::iter::empty(), 64), 64);
        assert_eq!(dispatch_size(std::iter::empty(), 0), 1);
    }

    #[test]
    fn test_oversized_array_saturates() {
        assert_eq!(dispatch_size([usize::MAX], 1), u32::MAX);
    }

    #[test]
    fn test_launch_config_covers_dispatch() {
        let config = ExecutorConfig::default().with_block_size(4);
        let launch = launch_config(10, &config);

        assert_eq!(launch.work_size, 10);
        assert_eq!(launch.grid.x, 3);
        assert_eq!(launch.block.x, 4);
        assert_eq!(launch.total_lanes(), 12);
        assert!(launch.timeout.is_none());
    }

    #[test]
    fn test_launch_config_carries_timeout() {
        let config = ExecutorConfig::default().with_dispatch_timeout(Duration::from_millis(5));
        assert_eq!(launch_config(1, &config).timeout, Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_queue_counts_submissions() {
        let mut queue = DispatchQueue::default();
        assert_eq!(queue.submit(), 1);
        assert_eq!(queue.submit(), 2);
        queue.complete(&RunReport::default());
        assert_eq!(queue.submit(), 3);
        assert_eq!(queue.statistics().run_count, 1);
    }
}
