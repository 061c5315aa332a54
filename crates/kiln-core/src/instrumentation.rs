//! Run instrumentation
//!
//! Every successful [`Executable::run`](crate::Executable::run) returns a
//! [`RunReport`] and logs it as a `run_completed` event. Executors fold the
//! reports of their dispatch queue into [`AggregateStatistics`].
//!
//! ## Example
//!
//! ```
//! use kiln_core::instrumentation::{AggregateStatistics, RunReport};
//!
//! let report = RunReport {
//!     workers: 4,
//!     operations: 40,
//!     bytes_uploaded: 16,
//!     upload_us: 1,
//!     dispatch_us: 9,
//!     duration_us: 10,
//! };
//! assert_eq!(report.ops_per_second(), 4_000_000.0);
//!
//! let mut stats = AggregateStatistics::new();
//! stats.record(&report);
//! assert_eq!(stats.run_count, 1);
//! ```

// ============================================================================
// Run-Level Metrics
// ============================================================================

/// Summary of one completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Workers (active lanes) dispatched
    pub workers: u64,
    /// IR operations executed across all workers
    pub operations: u64,
    /// Host-to-device bytes transferred before the dispatch
    pub bytes_uploaded: usize,
    /// Time spent uploading dirty inputs (microseconds)
    pub upload_us: u64,
    /// Time spent in the device dispatch (microseconds)
    pub dispatch_us: u64,
    /// Validation, upload, and dispatch (microseconds)
    pub duration_us: u64,
}

impl RunReport {
    /// Calculate executed operations per second
    pub fn ops_per_second(&self) -> f64 {
        if self.duration_us == 0 {
            return 0.0;
        }
        (self.operations as f64 / self.duration_us as f64) * 1_000_000.0
    }

    /// Calculate upload bandwidth in GB/s
    pub fn upload_bandwidth_gbps(&self) -> f64 {
        if self.upload_us == 0 {
            return 0.0;
        }
        (self.bytes_uploaded as f64 / self.upload_us as f64) / 1000.0
    }

    /// Log the report via tracing
    pub fn log(&self) {
        tracing::debug!(
            workers = self.workers,
            operations = self.operations,
            bytes_uploaded = self.bytes_uploaded,
            upload_us = self.upload_us,
            dispatch_us = self.dispatch_us,
            duration_us = self.duration_us,
            ops_per_second = self.ops_per_second(),
            "run_completed"
        );
    }
}

// ============================================================================
// Aggregate Statistics
// ============================================================================

/// Aggregate statistics across the runs of one executor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateStatistics {
    /// Number of successful runs
    pub run_count: u64,
    /// Total workers dispatched
    pub total_workers: u64,
    /// Total IR operations executed
    pub total_operations: u64,
    /// Total bytes uploaded
    pub total_bytes_uploaded: usize,
    /// Total run time (microseconds)
    pub total_duration_us: u64,
}

impl AggregateStatistics {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run
    pub fn record(&mut self, report: &RunReport) {
        self.run_count += 1;
        self.total_workers += report.workers;
        self.total_operations += report.operations;
        self.total_bytes_uploaded += report.bytes_uploaded;
        self.total_duration_us += report.duration_us;
    }

    /// Calculate average operations per second
    pub fn avg_ops_per_second(&self) -> f64 {
        if self.total_duration_us == 0 {
            return 0.0;
        }
        (self.total_operations as f64 / self.total_duration_us as f64) * 1_000_000.0
    }

    /// Calculate average run duration in microseconds
    pub fn avg_duration_us(&self) -> f64 {
        if self.run_count == 0 {
            return 0.0;
        }
        self.total_duration_us as f64 / self.run_count as f64
    }

    /// Log aggregate statistics
    pub fn log(&self) {
        tracing::info!(
            run_count = self.run_count,
            total_workers = self.total_workers,
            total_operations = self.total_operations,
            total_bytes_uploaded = self.total_bytes_uploaded,
            total_duration_us = self.total_duration_us,
            avg_ops_per_second = self.avg_ops_per_second(),
            avg_duration_us = self.avg_duration_us(),
            "aggregate_statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(operations: u64, bytes_uploaded: usize, duration_us: u64) -> RunReport {
        RunReport {
            workers: 8,
            operations,
            bytes_uploaded,
            upload_us: 2,
            dispatch_us: duration_us.saturating_sub(2),
            duration_us,
        }
    }

    #[test]
    fn test_run_report_rates() {
        let report = report(1000, 4000, 100);
        // 1000 ops / 100 us = 10M ops/sec
        assert_eq!(report.ops_per_second(), 10_000_000.0);
        // 4000 bytes / 2 us = 2 GB/s
        assert_eq!(report.upload_bandwidth_gbps(), 2.0);
    }

    #[test]
    fn test_zero_duration_rates() {
        let report = RunReport::default();
        assert_eq!(report.ops_per_second(), 0.0);
        assert_eq!(report.upload_bandwidth_gbps(), 0.0);
        assert_eq!(AggregateStatistics::new().avg_duration_us(), 0.0);
    }

    #[test]
    fn test_aggregate_statistics() {
        let mut stats = AggregateStatistics::new();
        stats.record(&report(1000, 16, 100));
        stats.record(&report(2000, 0, 300));

        assert_eq!(stats.run_count, 2);
        assert_eq!(stats.total_workers, 16);
        assert_eq!(stats.total_operations, 3000);
        assert_eq!(stats.total_bytes_uploaded, 16);
        assert_eq!(stats.total_duration_us, 400);
        assert_eq!(stats.avg_duration_us(), 200.0);
        assert_eq!(stats.avg_ops_per_second(), 7_500_000.0);
    }
}
