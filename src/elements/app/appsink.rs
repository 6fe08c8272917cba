//! AppSink element for extracting data to application code.
//!
//! Allows applications to pull buffers from a pipeline programmatically. In
//! push mode buffers arrive through the sink pad's chain; in pull mode the
//! sink pad runs a task reading consecutive ranges from upstream.

use crate::buffer::Buffer;
use crate::element::{Element, ElementImpl};
use crate::error::ActivationError;
use crate::event::{Event, Segment};
use crate::flow::{FlowError, FlowResult, FlowSuccess};
use crate::lock;
use crate::pad::{Pad, PadMode};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// A sink element that hands buffers to the application.
///
/// Buffers are queued internally and retrieved through an
/// [`AppSinkHandle`]. A full queue blocks the streaming thread unless
/// [`drop_on_full`](Self::drop_on_full) is set.
///
/// # Example
///
/// ```rust
/// use padflow::elements::AppSink;
///
/// let sink = AppSink::new().with_max_buffers(8);
/// let handle = sink.handle();
/// let element = sink.into_element("sink");
///
/// assert_eq!(handle.queue_len(), 0);
/// assert!(element.static_pad("sink").is_some());
/// ```
pub struct AppSink {
    inner: Arc<AppSinkInner>,
    pull_blocksize: Option<u32>,
}

struct AppSinkInner {
    state: Mutex<AppSinkState>,
    data_available: Condvar,
    space_available: Condvar,
}

struct AppSinkState {
    queue: VecDeque<Buffer>,
    max_buffers: usize,
    drop_on_full: bool,
    eos: bool,
    flushing: bool,
    segment: Option<Segment>,
    total_received: u64,
    total_pulled: u64,
    total_dropped: u64,
}

/// Statistics of an AppSink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppSinkStats {
    /// Buffers waiting in the queue.
    pub queued_buffers: usize,
    /// Buffers received from upstream.
    pub total_received: u64,
    /// Buffers taken by the application.
    pub total_pulled: u64,
    /// Buffers dropped on a full queue.
    pub total_dropped: u64,
    /// End-of-stream received.
    pub eos: bool,
}

/// Handle for pulling data from an AppSink.
///
/// This handle can be cloned and sent to other threads.
#[derive(Clone)]
pub struct AppSinkHandle {
    inner: Arc<AppSinkInner>,
}

impl AppSink {
    /// Default queue capacity.
    pub const DEFAULT_MAX_BUFFERS: usize = 64;

    /// Create a push-mode AppSink.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppSinkInner {
                state: Mutex::new(AppSinkState {
                    queue: VecDeque::new(),
                    max_buffers: Self::DEFAULT_MAX_BUFFERS,
                    drop_on_full: false,
                    eos: false,
                    flushing: false,
                    segment: None,
                    total_received: 0,
                    total_pulled: 0,
                    total_dropped: 0,
                }),
                data_available: Condvar::new(),
                space_available: Condvar::new(),
            }),
            pull_blocksize: None,
        }
    }

    /// Create a push-mode AppSink element with a sink pad named "sink".
    pub fn element(name: impl Into<String>) -> Element {
        Self::new().into_element(name)
    }

    /// Set the queue capacity.
    pub fn with_max_buffers(self, max_buffers: usize) -> Self {
        self.inner.state().max_buffers = max_buffers.max(1);
        self
    }

    /// Set whether to drop buffers when the queue is full.
    ///
    /// If false (default), the streaming thread blocks when full.
    pub fn drop_on_full(self, drop: bool) -> Self {
        self.inner.state().drop_on_full = drop;
        self
    }

    /// Pull from upstream in `blocksize` ranges instead of being pushed to.
    pub fn pull_mode(mut self, blocksize: u32) -> Self {
        self.pull_blocksize = Some(blocksize.max(1));
        self
    }

    /// Get a handle for pulling data from this sink.
    pub fn handle(&self) -> AppSinkHandle {
        AppSinkHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Wrap into an element with a sink pad named "sink".
    pub fn into_element(self, name: impl Into<String>) -> Element {
        let element = Element::new(name, self);
        // A fresh element has no pads, so adding one cannot fail.
        let _ = element.add_pad(Pad::sink());
        element
    }

    fn enqueue(&self, buffer: Buffer) -> FlowResult {
        let mut state = self.inner.state();
        loop {
            if state.flushing {
                return Err(FlowError::Flushing);
            }
            if state.queue.len() < state.max_buffers {
                break;
            }
            if state.drop_on_full {
                state.total_dropped += 1;
                trace!(dropped = state.total_dropped, "appsink queue full, dropping buffer");
                return Ok(FlowSuccess::Ok);
            }
            state = self
                .inner
                .space_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.queue.push_back(buffer);
        state.total_received += 1;
        self.inner.data_available.notify_one();
        Ok(FlowSuccess::Ok)
    }

    fn set_flushing(&self, flushing: bool) {
        let mut state = self.inner.state();
        state.flushing = flushing;
        if flushing {
            self.inner.data_available.notify_all();
            self.inner.space_available.notify_all();
        }
    }

    fn pull_loop(pad: &Pad, offset: &mut u64, blocksize: u32) -> FlowResult {
        let buffer = pad.pull_range(*offset, blocksize)?;
        if buffer.is_empty() {
            return Err(FlowError::Eos);
        }
        *offset += buffer.len() as u64;

        let element = pad.parent().ok_or(FlowError::Flushing)?;
        let sink = element.downcast_ref::<AppSink>().ok_or(FlowError::Error)?;
        sink.enqueue(buffer)
    }
}

impl Default for AppSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AppSinkInner {
    fn state(&self) -> MutexGuard<'_, AppSinkState> {
        lock(&self.state)
    }
}

impl ElementImpl for AppSink {
    fn chain(&self, _element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        self.enqueue(buffer)
    }

    fn event(&self, _element: &Element, pad: &Pad, event: Event) -> bool {
        match &event {
            Event::FlushStart => self.set_flushing(true),
            Event::FlushStop(_) => {
                let mut state = self.inner.state();
                state.queue.clear();
                state.eos = false;
                state.flushing = false;
                state.segment = None;
                self.inner.space_available.notify_all();
            }
            Event::Segment(segment) => self.inner.state().segment = Some(segment.clone()),
            Event::Eos => {
                self.inner.state().eos = true;
                self.inner.data_available.notify_all();
            }
            _ => {}
        }
        pad.event_default(event)
    }

    fn activate(&self, _element: &Element, pad: &Pad) -> Result<(), ActivationError> {
        match self.pull_blocksize {
            Some(_) => pad.activate(PadMode::Pull),
            None => pad.activate(PadMode::Push),
        }
    }

    fn activate_mode(
        &self,
        _element: &Element,
        pad: &Pad,
        mode: PadMode,
        active: bool,
    ) -> Result<(), ActivationError> {
        if !active {
            self.set_flushing(true);
            return Ok(());
        }

        {
            let mut state = self.inner.state();
            state.flushing = false;
            state.eos = false;
        }
        if mode == PadMode::Pull {
            let blocksize = self.pull_blocksize.unwrap_or(4096);
            let mut offset = 0u64;
            pad.create_task(move |pad, _ctx| Self::pull_loop(pad, &mut offset, blocksize))
                .map_err(|e| ActivationError::Failed(e.to_string()))?;
        }
        Ok(())
    }
}

impl AppSinkHandle {
    /// Take the next buffer, waiting for one.
    ///
    /// Returns `None` once end-of-stream was reached and the queue is empty,
    /// or while the sink is flushing or shut down.
    pub fn pull_buffer(&self) -> Option<Buffer> {
        self.pull_until(None)
    }

    /// Take the next buffer, waiting at most `timeout`.
    pub fn try_pull_buffer(&self, timeout: Duration) -> Option<Buffer> {
        self.pull_until(Some(Instant::now() + timeout))
    }

    fn pull_until(&self, deadline: Option<Instant>) -> Option<Buffer> {
        let mut state = self.inner.state();
        loop {
            if let Some(buffer) = state.queue.pop_front() {
                state.total_pulled += 1;
                self.inner.space_available.notify_one();
                return Some(buffer);
            }
            if state.eos || state.flushing {
                return None;
            }
            state = match deadline {
                None => self
                    .inner
                    .data_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.inner
                        .data_available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Take every queued buffer without waiting.
    pub fn drain(&self) -> Vec<Buffer> {
        let mut state = self.inner.state();
        let buffers: Vec<Buffer> = state.queue.drain(..).collect();
        state.total_pulled += buffers.len() as u64;
        self.inner.space_available.notify_all();
        buffers
    }

    /// Number of queued buffers.
    pub fn queue_len(&self) -> usize {
        self.inner.state().queue.len()
    }

    /// Check if end-of-stream has been received.
    pub fn is_eos(&self) -> bool {
        self.inner.state().eos
    }

    /// Last segment received.
    pub fn segment(&self) -> Option<Segment> {
        self.inner.state().segment.clone()
    }

    /// Get statistics.
    pub fn stats(&self) -> AppSinkStats {
        let state = self.inner.state();
        AppSinkStats {
            queued_buffers: state.queue.len(),
            total_received: state.total_received,
            total_pulled: state.total_pulled,
            total_dropped: state.total_dropped,
            eos: state.eos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::State;

    fn sink_element(sink: AppSink) -> (Element, AppSinkHandle, Pad) {
        let handle = sink.handle();
        let element = sink.into_element("sink");
        let pad = element.static_pad("sink").unwrap();
        (element, handle, pad)
    }

    #[test]
    fn test_chain_and_pull() {
        let (element, handle, pad) = sink_element(AppSink::new());
        element.set_state(State::Paused).unwrap();

        assert_eq!(pad.chain(Buffer::from_slice(b"ab")), Ok(FlowSuccess::Ok));
        assert_eq!(pad.chain(Buffer::from_slice(b"cd")), Ok(FlowSuccess::Ok));
        assert_eq!(handle.queue_len(), 2);
        assert_eq!(handle.pull_buffer().unwrap().as_bytes(), b"ab");

        assert!(pad.send_event(Event::Eos));
        assert!(handle.is_eos());
        assert_eq!(handle.pull_buffer().unwrap().as_bytes(), b"cd");
        assert!(handle.pull_buffer().is_none());

        let stats = handle.stats();
        assert_eq!(stats.total_received, 2);
        assert_eq!(stats.total_pulled, 2);
        element.set_state(State::Null).unwrap();
    }

    #[test]
    fn test_drop_on_full() {
        let (element, handle, pad) =
            sink_element(AppSink::new().with_max_buffers(1).drop_on_full(true));
        element.set_state(State::Paused).unwrap();

        pad.chain(Buffer::with_size(1)).unwrap();
        pad.chain(Buffer::with_size(1)).unwrap();
        assert_eq!(handle.stats().total_dropped, 1);
        assert_eq!(handle.drain().len(), 1);
    }

    #[test]
    fn test_deactivation_unblocks_full_queue() {
        let (element, handle, pad) = sink_element(AppSink::new().with_max_buffers(1));
        element.set_state(State::Paused).unwrap();
        pad.chain(Buffer::with_size(1)).unwrap();

        let blocked = std::thread::spawn({
            let pad = pad.clone();
            move || pad.chain(Buffer::with_size(1))
        });
        std::thread::sleep(Duration::from_millis(20));
        element.set_state(State::Ready).unwrap();

        // Usually blocked in the full queue; a late start finds the pad inactive.
        let result = blocked.join().unwrap();
        assert!(matches!(result, Err(FlowError::Flushing | FlowError::WrongState)));
        assert!(handle.try_pull_buffer(Duration::from_millis(1)).is_some());
    }

    #[test]
    fn test_try_pull_timeout() {
        let (element, handle, _pad) = sink_element(AppSink::new());
        element.set_state(State::Paused).unwrap();
        assert!(handle.try_pull_buffer(Duration::from_millis(5)).is_none());
    }
}
