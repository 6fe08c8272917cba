//! Identity element with callbacks for debugging.
//!
//! A pass-through element that allows inspection of buffers via callbacks.
//! Works in both scheduling modes: pushed buffers are forwarded from the
//! source pad, and pulls on the source pad are served by pulling upstream.

use crate::buffer::Buffer;
use crate::element::{Element, ElementImpl};
use crate::error::ActivationError;
use crate::flow::{FlowError, FlowResult};
use crate::pad::{Pad, PadDirection, PadMode};
use std::sync::atomic::{AtomicU64, Ordering};

/// Callback type for buffer inspection.
pub type BufferCallback = Box<dyn Fn(&Buffer) + Send + Sync>;

/// An identity element that passes buffers through unchanged while
/// optionally calling a callback for inspection.
///
/// This is useful for debugging, logging, or metrics collection
/// without modifying the data flow.
///
/// # Example
///
/// ```rust
/// use padflow::elements::Identity;
///
/// let element = Identity::new()
///     .on_buffer(|buf| println!("buffer of {} bytes", buf.len()))
///     .into_element("debug-point");
/// assert_eq!(element.pads().len(), 2);
/// ```
pub struct Identity {
    callback: Option<BufferCallback>,
    count: AtomicU64,
    bytes: AtomicU64,
}

impl Identity {
    /// Create a new identity element.
    pub fn new() -> Self {
        Self {
            callback: None,
            count: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Create an identity element with pads named "sink" and "src".
    pub fn element(name: impl Into<String>) -> Element {
        Self::new().into_element(name)
    }

    /// Set a callback to be called for each buffer.
    pub fn on_buffer<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Buffer) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
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

    /// Number of buffers that passed through.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Bytes that passed through.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn inspect(&self, buffer: &Buffer) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(buffer.len() as u64, Ordering::Relaxed);
        if let Some(callback) = &self.callback {
            callback(buffer);
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

fn other_pad(element: &Element, direction: PadDirection) -> Option<Pad> {
    element.pads().into_iter().find(|p| p.direction() == direction)
}

impl ElementImpl for Identity {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        self.inspect(&buffer);
        let src = other_pad(element, PadDirection::Src).ok_or(FlowError::NotLinked)?;
        src.push(buffer)
    }

    fn create(
        &self,
        element: &Element,
        _pad: &Pad,
        offset: u64,
        size: u32,
    ) -> Result<Buffer, FlowError> {
        let sink = other_pad(element, PadDirection::Sink).ok_or(FlowError::NotLinked)?;
        let buffer = sink.pull_range(offset, size)?;
        self.inspect(&buffer);
        Ok(buffer)
    }

    fn activate_mode(
        &self,
        element: &Element,
        pad: &Pad,
        mode: PadMode,
        active: bool,
    ) -> Result<(), ActivationError> {
        if mode != PadMode::Pull || pad.direction() != PadDirection::Src {
            return Ok(());
        }
        // Serving pulls downstream means pulling upstream.
        let sink = other_pad(element, PadDirection::Sink)
            .ok_or_else(|| ActivationError::NotLinked(pad.debug_name()))?;
        if active {
            sink.activate(PadMode::Pull)
        } else {
            sink.activate(PadMode::Inactive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{AppSink, DataSrc};
    use crate::flow::FlowSuccess;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_push_through() {
        let seen = Arc::new(AtomicUsize::new(0));
        let identity = Identity::new().on_buffer({
            let seen = Arc::clone(&seen);
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        let element = identity.into_element("id");
        let sink = AppSink::new();
        let handle = sink.handle();
        let sink = sink.into_element("out");

        element
            .static_pad("src")
            .unwrap()
            .link(&sink.static_pad("sink").unwrap())
            .unwrap();
        sink.set_state(crate::element::State::Paused).unwrap();
        element.set_state(crate::element::State::Paused).unwrap();

        let id_sink = element.static_pad("sink").unwrap();
        assert_eq!(id_sink.chain(Buffer::from_slice(b"xyz")), Ok(FlowSuccess::Ok));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(handle.queue_len(), 1);
        assert_eq!(element.downcast_ref::<Identity>().unwrap().bytes(), 3);
    }

    #[test]
    fn test_pull_through() {
        let src = DataSrc::element("src", vec![1u8; 10]);
        let id = Identity::element("id");
        src.static_pad("src")
            .unwrap()
            .link(&id.static_pad("sink").unwrap())
            .unwrap();

        let id_src = id.static_pad("src").unwrap();
        id_src.activate(PadMode::Pull).unwrap();
        assert_eq!(id.static_pad("sink").unwrap().mode(), PadMode::Pull);
        assert_eq!(src.static_pad("src").unwrap().mode(), PadMode::Pull);

        assert_eq!(id_src.create(4, 100).unwrap().len(), 6);

        id_src.activate(PadMode::Inactive).unwrap();
        assert_eq!(src.static_pad("src").unwrap().mode(), PadMode::Inactive);
    }
}
