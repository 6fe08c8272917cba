//! Integration tests for pad scheduling.
//!
//! Elements here are written against the public `ElementImpl` trait only,
//! the way an element outside the crate would be.

use padflow::buffer::Buffer;
use padflow::element::{Element, ElementImpl, State};
use padflow::elements::{AppSink, Identity};
use padflow::error::ActivationError;
use padflow::event::{Event, FlushStopEvent, SeekEvent, Segment, StreamStartEvent};
use padflow::flow::{FlowError, FlowResult, FlowSuccess};
use padflow::pad::{Pad, PadDirection, PadMode};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Random-access source that only serves complete ranges.
struct RangeSrc {
    data: Vec<u8>,
    calls: Arc<AtomicUsize>,
}

impl ElementImpl for RangeSrc {
    fn create(
        &self,
        _element: &Element,
        _pad: &Pad,
        offset: u64,
        size: u32,
    ) -> Result<Buffer, FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let start = offset as usize;
        let end = start + size as usize;
        if end > self.data.len() {
            return Err(FlowError::Eos);
        }
        Ok(Buffer::from_slice(&self.data[start..end]))
    }

    fn activate_mode(
        &self,
        _element: &Element,
        _pad: &Pad,
        _mode: PadMode,
        _active: bool,
    ) -> Result<(), ActivationError> {
        Ok(())
    }
}

fn range_src(len: usize) -> (Element, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let element = Element::new(
        "a",
        RangeSrc {
            data: (0..len).map(|i| i as u8).collect(),
            calls: Arc::clone(&calls),
        },
    );
    element.add_pad(Pad::src()).unwrap();
    (element, calls)
}

fn link(src: &Element, sink: &Element) {
    src.static_pad("src")
        .unwrap()
        .link(&sink.static_pad("sink").unwrap())
        .unwrap();
}

// ============================================================================
// Pull mode
// ============================================================================

/// Test that one downstream create reaches the upstream create exactly once.
#[test]
fn test_pull_create_reaches_upstream_once() {
    let (a, calls) = range_src(250);
    let b = Identity::element("b");
    link(&a, &b);

    let b_src = b.static_pad("src").unwrap();
    b_src.activate(PadMode::Pull).unwrap();
    assert_eq!(a.static_pad("src").unwrap().mode(), PadMode::Pull);

    let buffer = b_src.create(0, 100).unwrap();
    assert_eq!(buffer.len(), 100);
    assert_eq!(buffer.as_bytes()[99], 99);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Only 50 bytes remain past offset 200.
    assert_eq!(b_src.create(200, 100).unwrap_err(), FlowError::Eos);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test that data calls on pads that were never activated are refused.
#[test]
fn test_inactive_pads_refuse_data() {
    let (a, calls) = range_src(10);
    let b = Identity::element("b");
    link(&a, &b);

    let b_sink = b.static_pad("sink").unwrap();
    assert_eq!(b_sink.pull_range(0, 1).unwrap_err(), FlowError::WrongState);
    assert_eq!(
        b.static_pad("src").unwrap().create(0, 1).unwrap_err(),
        FlowError::WrongState
    );
    assert_eq!(b_sink.chain(Buffer::with_size(1)), Err(FlowError::WrongState));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Test that a pad only serves the mode it was activated in.
#[test]
fn test_mode_mismatch() {
    let (a, _calls) = range_src(10);
    let a_src = a.static_pad("src").unwrap();
    a_src.activate(PadMode::Push).unwrap();
    assert_eq!(a_src.create(0, 1).unwrap_err(), FlowError::WrongState);

    // Switching modes passes through inactive.
    a_src.activate(PadMode::Pull).unwrap();
    assert_eq!(a_src.mode(), PadMode::Pull);
    assert!(a_src.create(0, 1).is_ok());
}

/// Test that pull activation of a sink pad without a peer fails.
#[test]
fn test_pull_activation_needs_peer() {
    let b = Identity::element("b");
    let b_src = b.static_pad("src").unwrap();
    assert!(b_src.activate(PadMode::Pull).is_err());
    assert_eq!(b_src.mode(), PadMode::Inactive);
}

// ============================================================================
// Push mode and events
// ============================================================================

struct Counter {
    seen: Arc<AtomicUsize>,
}

impl ElementImpl for Counter {
    fn chain(&self, _element: &Element, _pad: &Pad, _buffer: Buffer) -> FlowResult {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(FlowSuccess::Ok)
    }
}

fn push_pair() -> (Element, Element, Pad, Arc<AtomicUsize>) {
    let upstream = Element::new("up", Counter { seen: Arc::default() });
    upstream.add_pad(Pad::src()).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let downstream = Element::new("down", Counter { seen: Arc::clone(&seen) });
    downstream.add_pad(Pad::sink()).unwrap();
    link(&upstream, &downstream);

    downstream.set_state(State::Paused).unwrap();
    upstream.set_state(State::Paused).unwrap();
    let src = upstream.static_pad("src").unwrap();
    (upstream, downstream, src, seen)
}

/// Test the flush bracket around pushed data.
#[test]
fn test_flush_bracket() {
    let (_up, down, src, seen) = push_pair();
    let sink = down.static_pad("sink").unwrap();

    assert_eq!(src.push(Buffer::with_size(8)), Ok(FlowSuccess::Ok));

    assert!(src.push_event(Event::FlushStart));
    assert!(sink.is_flushing());
    assert_eq!(src.push(Buffer::with_size(8)), Err(FlowError::Flushing));

    assert!(src.push_event(Event::FlushStop(FlushStopEvent::new(true))));
    assert!(!sink.is_flushing());
    assert_eq!(src.push(Buffer::with_size(8)), Ok(FlowSuccess::Ok));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

/// Test that EOS blocks data until a flush clears it.
#[test]
fn test_eos_until_flush() {
    let (_up, down, src, seen) = push_pair();
    let sink = down.static_pad("sink").unwrap();

    assert!(src.push_event(Event::Eos));
    assert!(sink.is_eos());
    assert_eq!(src.push(Buffer::with_size(1)), Err(FlowError::Eos));

    src.push_event(Event::FlushStart);
    src.push_event(Event::FlushStop(FlushStopEvent::new(true)));
    assert!(!sink.is_eos());
    assert_eq!(src.push(Buffer::with_size(1)), Ok(FlowSuccess::Ok));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

/// Test that sticky events are stored on the sink pad.
#[test]
fn test_sticky_events_stored() {
    let (_up, down, src, _seen) = push_pair();
    let sink = down.static_pad("sink").unwrap();

    src.push_event(Event::StreamStart(StreamStartEvent::new("up/src")));
    src.push_event(Event::Segment(Segment::new_bytes(0, None)));
    assert_eq!(sink.sticky_events().len(), 2);
    assert_eq!(sink.segment().unwrap().start, 0);

    // A new segment replaces the old one.
    src.push_event(Event::Segment(Segment::new_bytes(64, None)));
    assert_eq!(sink.sticky_events().len(), 2);
    assert_eq!(sink.segment().unwrap().start, 64);
}

/// Test that events travelling the wrong way are refused.
#[test]
fn test_event_direction_checked() {
    let (_up, down, src, _seen) = push_pair();
    let sink = down.static_pad("sink").unwrap();

    assert!(!src.push_event(Event::Seek(SeekEvent::new_bytes(0))));
    assert!(!sink.push_event(Event::Eos));
    assert_eq!(src.direction(), PadDirection::Src);
}

/// Test buffers pushed through an identity reach an app sink in order.
#[test]
fn test_push_chain_through_identity() {
    let (a, _calls) = range_src(0);
    let id = Identity::element("id");
    let sink = AppSink::new();
    let handle = sink.handle();
    let sink = sink.into_element("sink");
    link(&a, &id);
    link(&id, &sink);

    for element in [&sink, &id, &a] {
        element.set_state(State::Paused).unwrap();
    }

    let src = a.static_pad("src").unwrap();
    for i in 0..5u8 {
        assert_eq!(src.push(Buffer::from_slice(&[i])), Ok(FlowSuccess::Ok));
    }
    let order: Vec<u8> = handle.drain().iter().map(|b| b.as_bytes()[0]).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
}
