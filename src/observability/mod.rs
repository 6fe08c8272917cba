//! Observability features: metrics and tracing.
//!
//! ## Metrics
//!
//! padflow exposes the following metrics through `metrics-rs`; install any
//! exporter (prometheus, statsd, ...) to collect them:
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `padflow_buffers_pushed` | Counter | Buffers pushed from a source pad |
//! | `padflow_bytes_pushed` | Counter | Bytes pushed from a source pad |
//! | `padflow_chain_time_ns` | Histogram | Time spent in the peer's chain |
//! | `padflow_flow_errors` | Counter | Flow errors by kind |
//! | `padflow_bus_posted` | Counter | Messages accepted by a bus |
//! | `padflow_bus_dropped` | Counter | Messages dropped by a bus |
//! | `padflow_bus_pending` | Gauge | Messages queued on a bus |
//! | `padflow_tasks_running` | Gauge | Task worker threads alive |
//!
//! ## Tracing
//!
//! State changes run inside an `element` span and task worker threads inside
//! a `task` span; see [`TracingConfig`].
//!
//! ## Example
//!
//! ```rust
//! use padflow::observability::init_metrics;
//!
//! // Describe metrics once at startup, before installing an exporter.
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{
    PadMetrics, init_metrics, record_bus_dropped, record_bus_pending, record_bus_posted,
    record_flow_error, record_task_exited, record_task_started,
};
pub use tracing_support::{
    TracingConfig, span_element, span_pad, span_pipeline, span_task, trace_eos,
    trace_state_change,
};
