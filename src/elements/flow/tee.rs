//! Tee element - duplicates buffers to multiple outputs.

use crate::buffer::Buffer;
use crate::element::{Element, ElementImpl};
use crate::event::Event;
use crate::flow::{FlowCombiner, FlowError, FlowResult, FlowSuccess};
use crate::lock;
use crate::pad::{Pad, PadDirection};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// An element pushing every buffer to all of its source pads.
///
/// Source pads are created on request and named `src_0`, `src_1`, ...
/// Buffers are shared, not copied. Results of the branches are combined
/// with a [`FlowCombiner`]: an unlinked branch is ignored while another
/// branch is linked, and EOS is returned only when every branch is done.
///
/// # Example
///
/// ```rust
/// use padflow::elements::Tee;
/// use padflow::pad::PadDirection;
///
/// let tee = Tee::element("tee");
/// let first = tee.request_pad(PadDirection::Src).unwrap();
/// let second = tee.request_pad(PadDirection::Src).unwrap();
/// assert_eq!(first.name(), "src_0");
/// assert_eq!(second.name(), "src_1");
/// ```
pub struct Tee {
    combiner: Mutex<FlowCombiner>,
    next_pad: AtomicU32,
    count: AtomicU64,
}

impl Tee {
    /// Create a Tee without source pads.
    pub fn new() -> Self {
        Self {
            combiner: Mutex::new(FlowCombiner::new()),
            next_pad: AtomicU32::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Create a Tee element with a sink pad named "sink".
    pub fn element(name: impl Into<String>) -> Element {
        Self::new().into_element(name)
    }

    /// Wrap into an element with a sink pad named "sink".
    pub fn into_element(self, name: impl Into<String>) -> Element {
        let element = Element::new(name, self);
        // A fresh element has no pads, so adding one cannot fail.
        let _ = element.add_pad(Pad::sink());
        element
    }

    /// Number of buffers received.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Tee {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementImpl for Tee {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        self.count.fetch_add(1, Ordering::Relaxed);
        let branches = element.src_pads();
        if branches.is_empty() {
            return Err(FlowError::NotLinked);
        }

        let mut combined = Ok(FlowSuccess::Ok);
        for pad in branches {
            let result = pad.push(buffer.clone());
            combined = lock(&self.combiner).update_pad_flow(&pad, result);
        }
        combined
    }

    fn event(&self, _element: &Element, pad: &Pad, event: Event) -> bool {
        if let Event::FlushStop(_) = event {
            lock(&self.combiner).reset();
        }
        pad.event_default(event)
    }

    fn request_pad(&self, _element: &Element, direction: PadDirection) -> Option<Pad> {
        if direction != PadDirection::Src {
            return None;
        }
        let index = self.next_pad.fetch_add(1, Ordering::Relaxed);
        let pad = Pad::new(format!("src_{index}"), PadDirection::Src);
        lock(&self.combiner).add_pad(&pad);
        Some(pad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::State;
    use crate::elements::AppSink;

    #[test]
    fn test_fanout_ignores_unlinked_branch() {
        let tee = Tee::element("tee");
        let linked = tee.request_pad(PadDirection::Src).unwrap();
        let _unlinked = tee.request_pad(PadDirection::Src).unwrap();

        let sink = AppSink::new();
        let handle = sink.handle();
        let sink = sink.into_element("out");
        linked.link(&sink.static_pad("sink").unwrap()).unwrap();

        sink.set_state(State::Paused).unwrap();
        tee.set_state(State::Paused).unwrap();

        let tee_sink = tee.static_pad("sink").unwrap();
        assert_eq!(tee_sink.chain(Buffer::with_size(4)), Ok(FlowSuccess::Ok));
        assert_eq!(handle.queue_len(), 1);
    }

    #[test]
    fn test_all_unlinked() {
        let tee = Tee::element("tee");
        tee.request_pad(PadDirection::Src).unwrap();
        tee.request_pad(PadDirection::Src).unwrap();
        tee.set_state(State::Paused).unwrap();

        let tee_sink = tee.static_pad("sink").unwrap();
        assert_eq!(tee_sink.chain(Buffer::with_size(1)), Err(FlowError::NotLinked));
        assert!(tee.request_pad(PadDirection::Sink).is_err());
    }
}
