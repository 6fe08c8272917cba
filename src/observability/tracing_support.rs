//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether state changes run inside an element span.
    pub state_spans: bool,
    /// Whether task worker threads run inside a task span.
    pub task_spans: bool,
    /// Whether every pushed buffer is logged at trace level.
    pub buffer_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            state_spans: true,
            task_spans: true,
            buffer_events: false,
        }
    }
}

impl TracingConfig {
    /// All spans and per-buffer events.
    pub fn all() -> Self {
        Self {
            state_spans: true,
            task_spans: true,
            buffer_events: true,
        }
    }

    /// Disable all spans and events.
    pub fn none() -> Self {
        Self {
            state_spans: false,
            task_spans: false,
            buffer_events: false,
        }
    }
}

/// Create a span for a pipeline.
#[inline]
pub fn span_pipeline(name: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name)
}

/// Create a span for work done by an element.
///
/// # Example
///
/// ```rust
/// use padflow::observability::span_element;
///
/// let span = span_element("demux", "ReadyToPaused");
/// let _guard = span.enter();
/// // State change work here...
/// ```
#[inline]
pub fn span_element(element: &str, operation: &str) -> Span {
    span!(
        Level::DEBUG,
        "element",
        element = %element,
        operation = %operation
    )
}

/// Create a span for streaming on one pad.
#[inline]
pub fn span_pad(element: &str, pad: &str) -> Span {
    span!(Level::DEBUG, "pad", element = %element, pad = %pad)
}

/// Create a span for a task worker thread.
#[inline]
pub fn span_task(task: &str) -> Span {
    span!(Level::DEBUG, "task", task = %task)
}

/// Log end-of-stream reaching a sink element.
#[inline]
pub fn trace_eos(element: &str) {
    tracing::info!(element = %element, "end of stream");
}

/// Log a committed state change.
#[inline]
pub fn trace_state_change(element: &str, from: &str, to: &str) {
    tracing::info!(element = %element, from = %from, to = %to, "state changed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_presets() {
        let config = TracingConfig::default();
        assert!(config.state_spans);
        assert!(config.task_spans);
        assert!(!config.buffer_events);

        assert!(TracingConfig::all().buffer_events);
        assert!(!TracingConfig::none().task_spans);
    }

    #[test]
    fn test_span_creation() {
        // No subscriber installed: spans are disabled but must not panic.
        let _span = span_pipeline("pipeline");
        let _span = span_element("src", "NullToReady");
        let _guard = span_pad("src", "src").entered();
        let _guard = span_task("src:src").entered();
        trace_eos("sink");
        trace_state_change("sink", "Ready", "Paused");
    }
}
