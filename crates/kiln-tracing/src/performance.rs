//! Timing records for uploads and dispatches
//!
//! Everything here logs at `debug` and is switched off as a whole by
//! [`configure`]. `init_global_tracing` calls it with the installed config.
//!
//! ```
//! use kiln_tracing::performance::{record_transfer, PerformanceSpan, Transfer};
//!
//! let span = PerformanceSpan::new("upload_inputs", Some(100));
//! drop(span); // logged only if it took at least 100us
//!
//! record_transfer(4096, Transfer::Upload, 250);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;

static ENABLED: AtomicBool = AtomicBool::new(true);

// u64::MAX means unset
static THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Set the process-wide switch and default span threshold
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    ENABLED.store(enabled, Ordering::Relaxed);
    THRESHOLD_US.store(threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn default_threshold() -> Option<u64> {
    Some(THRESHOLD_US.load(Ordering::Relaxed)).filter(|&threshold| threshold != u64::MAX)
}

/// Data movement recorded by [`record_transfer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Host resource contents copied into a device buffer
    Upload,
    /// Device buffers decoded into program state before lanes start
    Load,
    /// Program outputs written back into device buffers
    Store,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transfer::Upload => "upload",
            Transfer::Load => "load",
            Transfer::Store => "store",
        })
    }
}

/// Guard that logs its lifetime on drop
///
/// Without an explicit threshold the one passed to [`configure`] applies;
/// with neither, every span is logged.
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    started: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, name, threshold_us)
    }

    /// Same as [`new`](Self::new) with the `perf` span created at `level`
    pub fn with_level(level: Level, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };

        Self {
            name,
            threshold_us: threshold_us.or_else(default_threshold),
            started: Instant::now(),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if is_enabled() && self.threshold_us.map_or(true, |threshold| elapsed_us >= threshold) {
            let _entered = self.span.enter();
            tracing::debug!(duration_us = elapsed_us, "performance_span_complete");
        }
    }
}

/// Log a transfer of `bytes` with its bandwidth in MiB/s
pub fn record_transfer(bytes: usize, transfer: Transfer, duration_us: u64) {
    if !is_enabled() {
        return;
    }
    tracing::debug!(
        transfer = %transfer,
        bytes = bytes,
        duration_us = duration_us,
        bandwidth_mibps = per_second(bytes as f64 / (1024.0 * 1024.0), duration_us),
        "data_transfer"
    );
}

/// Log a finished dispatch with its operation throughput
pub fn record_dispatch(workers: u64, operations: u64, duration_us: u64) {
    if !is_enabled() {
        return;
    }
    tracing::debug!(
        workers = workers,
        operations = operations,
        duration_us = duration_us,
        ops_per_sec = per_second(operations as f64, duration_us),
        "dispatch_complete"
    );
}

fn per_second(amount: f64, duration_us: u64) -> f64 {
    match duration_us {
        0 => 0.0,
        us => amount * 1_000_000.0 / us as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_span_keeps_name_and_threshold() {
        let span = PerformanceSpan::with_level(Level::INFO, "upload_inputs", Some(100));
        assert_eq!(span.name(), "upload_inputs");
        assert_eq!(span.threshold_us, Some(100));
    }

    #[test]
    fn test_span_elapsed() {
        let span = PerformanceSpan::new("sleep", None);
        thread::sleep(Duration::from_millis(5));
        assert!(span.elapsed_us() >= 5_000);
    }

    #[test]
    fn test_per_second() {
        assert_eq!(per_second(500.0, 0), 0.0);
        assert_eq!(per_second(500.0, 1_000), 500_000.0);
    }

    #[test]
    fn test_transfer_labels() {
        assert_eq!(Transfer::Upload.to_string(), "upload");
        assert_eq!(Transfer::Store.to_string(), "store");
    }

    #[test]
    fn test_records_accept_zero_durations() {
        record_transfer(0, Transfer::Load, 0);
        record_dispatch(1, 0, 0);
    }
}
