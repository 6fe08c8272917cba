//! Chunker element: re-slices a byte stream into fixed-size buffers.
//!
//! Incoming buffers of any size are collected in an [`Adapter`] and leave
//! as `chunk_size` buffers. Whole input buffers that line up with a chunk
//! boundary pass through without copying.

use crate::adapter::Adapter;
use crate::buffer::Buffer;
use crate::element::{Element, ElementImpl};
use crate::event::Event;
use crate::flow::{FlowError, FlowResult, FlowSuccess};
use crate::lock;
use crate::pad::{Pad, PadDirection};
use std::sync::Mutex;
use tracing::{debug, trace};

/// Splits and joins buffers into chunks of a fixed size.
///
/// # Example
///
/// ```rust
/// use padflow::elements::Chunker;
///
/// let element = Chunker::new(188).drain_on_eos(false).into_element("ts");
/// assert!(element.static_pad("sink").is_some());
/// assert!(element.static_pad("src").is_some());
/// ```
pub struct Chunker {
    chunk_size: usize,
    drain_on_eos: bool,
    adapter: Mutex<Adapter>,
}

impl Chunker {
    /// Create a chunker producing `chunk_size` buffers.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            drain_on_eos: true,
            adapter: Mutex::new(Adapter::new()),
        }
    }

    /// Create a chunker element with pads named "sink" and "src".
    pub fn element(name: impl Into<String>, chunk_size: usize) -> Element {
        Self::new(chunk_size).into_element(name)
    }

    /// Whether a short final chunk is pushed at end-of-stream (default) or
    /// discarded.
    pub fn drain_on_eos(mut self, drain: bool) -> Self {
        self.drain_on_eos = drain;
        self
    }

    /// Wrap into an element with pads named "sink" and "src".
    pub fn into_element(self, name: impl Into<String>) -> Element {
        let element = Element::new(name, self);
        // A fresh element has no pads, so adding these cannot fail.
        let _ = element.add_pad(Pad::sink());
        let _ = element.add_pad(Pad::src());
        element
    }

    /// Chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes waiting for a full chunk.
    pub fn pending(&self) -> usize {
        lock(&self.adapter).available()
    }

    fn take_chunks(&self, buffer: Buffer) -> Vec<Buffer> {
        let mut adapter = lock(&self.adapter);
        adapter.push(buffer);
        let mut chunks = Vec::with_capacity(adapter.available() / self.chunk_size);
        while adapter.available() >= self.chunk_size {
            match adapter.take_buffer(self.chunk_size) {
                Some(chunk) => chunks.push(chunk),
                None => break,
            }
        }
        chunks
    }
}

fn src_pad(element: &Element) -> Option<Pad> {
    element
        .pads()
        .into_iter()
        .find(|p| p.direction() == PadDirection::Src)
}

impl ElementImpl for Chunker {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        let chunks = self.take_chunks(buffer);
        if chunks.is_empty() {
            return Ok(FlowSuccess::Ok);
        }

        let src = src_pad(element).ok_or(FlowError::NotLinked)?;
        trace!(element = %element.name(), chunks = chunks.len(), "pushing chunks");
        for chunk in chunks {
            src.push(chunk)?;
        }
        Ok(FlowSuccess::Ok)
    }

    fn event(&self, element: &Element, pad: &Pad, event: Event) -> bool {
        match &event {
            Event::FlushStop(_) => lock(&self.adapter).clear(),
            Event::Eos => {
                let rest = {
                    let mut adapter = lock(&self.adapter);
                    let available = adapter.available();
                    let rest = if self.drain_on_eos && available > 0 {
                        adapter.take_buffer(available)
                    } else {
                        None
                    };
                    adapter.clear();
                    rest
                };
                if let (Some(rest), Some(src)) = (rest, src_pad(element)) {
                    debug!(element = %element.name(), size = rest.len(), "draining short chunk");
                    if let Err(e) = src.push(rest) {
                        debug!(element = %element.name(), error = %e, "final chunk not accepted");
                    }
                }
            }
            _ => {}
        }
        pad.event_default(event)
    }
}
