//! Timing macros

/// [`PerformanceSpan`](crate::performance::PerformanceSpan) guard named
/// `$name`; extra `field = value` pairs go on an enclosing `perf` span
///
/// ```
/// use kiln_tracing::perf_span;
///
/// let _span = perf_span!("cpu_execute_program", operations = 12);
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {
        $crate::performance::PerformanceSpan::new($name, None)
    };
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        let _fields = tracing::debug_span!("perf", name = $name, $($field = $value),+).entered();
        $crate::performance::PerformanceSpan::new($name, None)
    }};
}

/// Evaluate `$block` and yield `(value, elapsed_us)`
///
/// The block is inlined, so `?` and `return` inside it act on the
/// enclosing function.
///
/// ```
/// use kiln_tracing::timed_block;
///
/// let (total, _us) = timed_block!("sum", { (1..=10).sum::<u32>() });
/// assert_eq!(total, 55);
/// ```
#[macro_export]
macro_rules! timed_block {
    ($name:expr, $block:block) => {{
        let started = std::time::Instant::now();
        let value = $block;
        let elapsed_us = started.elapsed().as_micros() as u64;
        tracing::trace!(block = $name, duration_us = elapsed_us, "timed_block_complete");
        (value, elapsed_us)
    }};
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_perf_span_names() {
        assert_eq!(perf_span!("plain").name(), "plain");
        assert_eq!(perf_span!("with_fields", workers = 64, bytes = 256).name(), "with_fields");
    }

    #[test]
    fn test_timed_block_measures() {
        let (value, elapsed_us) = timed_block!("sleep", {
            thread::sleep(Duration::from_millis(2));
            "done"
        });
        assert_eq!(value, "done");
        assert!(elapsed_us >= 2_000);
    }

    fn halve(value: u32) -> Result<u32, String> {
        let (half, _) = timed_block!("halve", {
            if value % 2 == 1 {
                return Err(format!("{} is odd", value));
            }
            value / 2
        });
        Ok(half)
    }

    #[test]
    fn test_timed_block_early_return() {
        assert_eq!(halve(8), Ok(4));
        assert_eq!(halve(3), Err("3 is odd".to_string()));
    }
}
