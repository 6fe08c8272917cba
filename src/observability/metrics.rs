//! Metrics collection using metrics-rs.

use crate::flow::FlowError;
use metrics::{Counter, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const BUFFERS_PUSHED: &str = "padflow_buffers_pushed";
const BYTES_PUSHED: &str = "padflow_bytes_pushed";
const CHAIN_TIME_NS: &str = "padflow_chain_time_ns";
const FLOW_ERRORS: &str = "padflow_flow_errors";
const BUS_POSTED: &str = "padflow_bus_posted";
const BUS_DROPPED: &str = "padflow_bus_dropped";
const BUS_PENDING: &str = "padflow_bus_pending";
const TASKS_RUNNING: &str = "padflow_tasks_running";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before installing an exporter.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_PUSHED,
        Unit::Count,
        "Buffers pushed from a source pad to its peer"
    );
    metrics::describe_counter!(BYTES_PUSHED, Unit::Bytes, "Bytes pushed between pads");
    metrics::describe_histogram!(
        CHAIN_TIME_NS,
        Unit::Nanoseconds,
        "Time spent in the peer's chain function per push"
    );
    metrics::describe_counter!(
        FLOW_ERRORS,
        Unit::Count,
        "Flow errors returned by pushes and pulls, by kind"
    );
    metrics::describe_counter!(BUS_POSTED, Unit::Count, "Messages accepted by a bus");
    metrics::describe_counter!(
        BUS_DROPPED,
        Unit::Count,
        "Messages dropped by a flushing bus or a sync handler"
    );
    metrics::describe_gauge!(BUS_PENDING, Unit::Count, "Messages queued on a bus");
    metrics::describe_gauge!(TASKS_RUNNING, Unit::Count, "Task worker threads alive");
}

/// Record a flow error returned on a pad.
#[inline]
pub fn record_flow_error(element: &str, pad: &str, error: FlowError) {
    counter!(
        FLOW_ERRORS,
        "element" => element.to_string(),
        "pad" => pad.to_string(),
        "kind" => error.name()
    )
    .increment(1);
}

/// Record a message accepted by a bus.
#[inline]
pub fn record_bus_posted(bus: &str) {
    counter!(BUS_POSTED, "bus" => bus.to_string()).increment(1);
}

/// Record a message dropped by a bus.
#[inline]
pub fn record_bus_dropped(bus: &str, reason: &'static str) {
    counter!(BUS_DROPPED, "bus" => bus.to_string(), "reason" => reason).increment(1);
}

/// Record the number of queued bus messages.
#[inline]
pub fn record_bus_pending(bus: &str, pending: usize) {
    gauge!(BUS_PENDING, "bus" => bus.to_string()).set(pending as f64);
}

/// Record a task worker thread starting.
#[inline]
pub fn record_task_started() {
    gauge!(TASKS_RUNNING).increment(1.0);
}

/// Record a task worker thread exiting.
#[inline]
pub fn record_task_exited() {
    gauge!(TASKS_RUNNING).decrement(1.0);
}

/// Metrics for pushes out of one source pad.
///
/// Holds pre-labelled handles so the push path does not format labels.
#[derive(Clone)]
pub struct PadMetrics {
    element: String,
    pad: String,
    buffers: Counter,
    bytes: Counter,
    chain_time: Histogram,
}

impl PadMetrics {
    /// Create metrics for `element:pad`.
    pub fn new(element: &str, pad: &str) -> Self {
        Self {
            element: element.to_string(),
            pad: pad.to_string(),
            buffers: counter!(
                BUFFERS_PUSHED,
                "element" => element.to_string(),
                "pad" => pad.to_string()
            ),
            bytes: counter!(
                BYTES_PUSHED,
                "element" => element.to_string(),
                "pad" => pad.to_string()
            ),
            chain_time: histogram!(
                CHAIN_TIME_NS,
                "element" => element.to_string(),
                "pad" => pad.to_string()
            ),
        }
    }

    /// Record a pushed buffer.
    #[inline]
    pub fn record_push(&self, bytes: usize) {
        self.buffers.increment(1);
        self.bytes.increment(bytes as u64);
    }

    /// Record a flow error on this pad.
    #[inline]
    pub fn record_error(&self, error: FlowError) {
        record_flow_error(&self.element, &self.pad, error);
    }

    /// Start a timer that records chain time on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    fn record_time(&self, duration: Duration) {
        self.chain_time.record(duration.as_nanos() as f64);
    }
}

impl std::fmt::Debug for PadMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PadMetrics")
            .field("element", &self.element)
            .field("pad", &self.pad)
            .finish_non_exhaustive()
    }
}

/// Guard that records chain time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a PadMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_time(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_pad_metrics() {
        let metrics = PadMetrics::new("src", "src");
        metrics.record_push(128);
        metrics.record_error(FlowError::NotLinked);
        {
            let _timer = metrics.start_timer();
        }
        assert!(format!("{metrics:?}").contains("src"));
    }

    #[test]
    fn test_global_recording_functions() {
        // No recorder installed: these are no-ops and must not panic.
        record_flow_error("e", "p", FlowError::Error);
        record_bus_posted("bus");
        record_bus_dropped("bus", "flushing");
        record_bus_pending("bus", 3);
        record_task_started();
        record_task_exited();
    }
}
