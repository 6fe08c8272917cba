//! DataSrc element for serving inline data.
//!
//! Similar to GStreamer's dataurisrc, but accepts raw bytes directly. Works
//! in both scheduling modes: in push mode a task on the source pad pushes
//! `blocksize` chunks, in pull mode downstream reads any byte range. Byte
//! seeks are supported in push mode.

use crate::buffer::Buffer;
use crate::bus::MessageView;
use crate::element::{Element, ElementImpl, State};
use crate::error::ActivationError;
use crate::event::{
    Event, FlushStopEvent, SeekEvent, Segment, SegmentFlags, SegmentFormat, StreamStartEvent,
    TagList, TagsEvent,
};
use crate::flow::{FlowError, FlowResult, FlowSuccess};
use crate::lock;
use crate::metadata::Metadata;
use crate::pad::{Pad, PadMode};
use crate::query::Query;
use crate::task::TaskContext;
use bytes::Bytes;
use std::sync::Mutex;
use tracing::{debug, warn};

/// A source that serves a byte blob.
///
/// # Example
///
/// ```rust
/// use padflow::elements::DataSrc;
///
/// let src = DataSrc::from_string("hello world").with_blocksize(4);
/// assert_eq!(src.len(), 11);
/// let element = src.into_element("src");
/// assert!(element.static_pad("src").is_some());
/// ```
pub struct DataSrc {
    data: Bytes,
    blocksize: u32,
    tags: TagList,
    state: Mutex<DataSrcState>,
}

struct DataSrcState {
    segment: Segment,
    position: u64,
    sequence: u64,
    need_stream_start: bool,
    need_segment: bool,
    discont: bool,
}

impl DataSrc {
    /// Chunk size used in push mode unless configured.
    pub const DEFAULT_BLOCKSIZE: u32 = 4096;

    /// Create a DataSrc serving `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let state = DataSrcState::new(data.len() as u64);
        Self {
            data,
            blocksize: Self::DEFAULT_BLOCKSIZE,
            tags: TagList::new(),
            state: Mutex::new(state),
        }
    }

    /// Create a DataSrc from a string.
    pub fn from_string(data: &str) -> Self {
        Self::new(Bytes::copy_from_slice(data.as_bytes()))
    }

    /// Create a DataSrc element with a source pad named "src".
    pub fn element(name: impl Into<String>, data: impl Into<Bytes>) -> Element {
        Self::new(data).into_element(name)
    }

    /// Set the push-mode chunk size.
    pub fn with_blocksize(mut self, blocksize: u32) -> Self {
        self.blocksize = blocksize.max(1);
        self
    }

    /// Send `tags` downstream after the stream start.
    pub fn with_tags(mut self, tags: TagList) -> Self {
        self.tags = tags;
        self
    }

    /// Wrap into an element with a source pad named "src".
    pub fn into_element(self, name: impl Into<String>) -> Element {
        let element = Element::new(name, self);
        // A fresh element has no pads, so adding one cannot fail.
        let _ = element.add_pad(Pad::src());
        element
    }

    /// Total data size.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the data is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte position of the next chunk.
    pub fn position(&self) -> u64 {
        lock(&self.state).position
    }

    fn reset(&self) {
        *lock(&self.state) = DataSrcState::new(self.data.len() as u64);
    }

    fn stream_loop(&self, element: &Element, pad: &Pad, ctx: &TaskContext<'_>) -> FlowResult {
        let mut events = Vec::new();
        let len = self.data.len() as u64;

        let chunk = {
            let mut state = lock(&self.state);
            if state.need_stream_start {
                let stream_id = format!("{}/{}", element.name(), pad.name());
                events.push(Event::StreamStart(StreamStartEvent::new(stream_id)));
                if !self.tags.is_empty() {
                    events.push(Event::Tags(TagsEvent::new(self.tags.clone())));
                }
                state.need_stream_start = false;
            }
            if state.need_segment {
                events.push(Event::Segment(state.segment.clone()));
                state.need_segment = false;
            }

            let end = state.segment.stop.map_or(len, |stop| stop.min(len));
            if state.position >= end {
                None
            } else {
                let offset = state.position;
                let size = (end - offset).min(u64::from(self.blocksize));
                state.position += size;
                state.segment.position = state.position;
                state.sequence += 1;
                let discont = std::mem::take(&mut state.discont);
                Some((offset, size, state.sequence - 1, discont))
            }
        };

        for event in events {
            pad.push_event(event);
        }

        let Some((offset, size, sequence, discont)) = chunk else {
            let segment_seek = lock(&self.state)
                .segment
                .flags
                .contains(SegmentFlags::SEGMENT);
            if segment_seek {
                debug!(element = %element.name(), "segment done");
                element.post_message(MessageView::SegmentDone {
                    format: SegmentFormat::Bytes,
                    position: lock(&self.state).position,
                });
                ctx.pause();
                return Ok(FlowSuccess::Ok);
            }
            return Err(FlowError::Eos);
        };

        let mut metadata = Metadata::from_sequence(sequence).with_byte_range(offset, size);
        metadata.flags.discont = discont;
        let range = offset as usize..(offset + size) as usize;
        let buffer = Buffer::from(self.data.slice(range)).with_metadata(metadata);
        pad.push(buffer)
    }

    fn perform_seek(&self, element: &Element, pad: &Pad, seek: &SeekEvent) -> bool {
        if seek.format != SegmentFormat::Bytes || seek.rate <= 0.0 {
            debug!(element = %element.name(), format = ?seek.format, rate = seek.rate, "unsupported seek");
            return false;
        }

        let flush = seek.is_flush();
        if flush {
            pad.push_event(Event::FlushStart);
        } else {
            pad.pause_task();
        }

        let stream = pad.stream_lock();
        let applied = {
            let mut state = lock(&self.state);
            let mut segment = state.segment.clone();
            match segment.do_seek(seek) {
                Some(_) => {
                    state.position = segment.start;
                    state.segment = segment;
                    state.need_segment = true;
                    state.discont = true;
                    true
                }
                None => false,
            }
        };
        if flush {
            pad.push_event(Event::FlushStop(FlushStopEvent::new(true)));
        }
        drop(stream);

        debug!(element = %element.name(), applied, position = self.position(), "seek handled");
        if pad.mode() == PadMode::Push && element.current_state() == State::Playing {
            if let Err(e) = pad.resume_task() {
                warn!(element = %element.name(), error = %e, "failed to restart task after seek");
            }
        }
        applied
    }
}

impl DataSrcState {
    fn new(len: u64) -> Self {
        Self {
            segment: Segment::new_bytes(0, None).with_duration(len),
            position: 0,
            sequence: 0,
            need_stream_start: true,
            need_segment: true,
            discont: true,
        }
    }
}

impl ElementImpl for DataSrc {
    fn create(
        &self,
        _element: &Element,
        _pad: &Pad,
        offset: u64,
        size: u32,
    ) -> Result<Buffer, FlowError> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Err(FlowError::Eos);
        }
        let end = (offset + u64::from(size)).min(len);
        lock(&self.state).position = end;

        let metadata = Metadata::new().with_byte_range(offset, end - offset);
        Ok(Buffer::from(self.data.slice(offset as usize..end as usize)).with_metadata(metadata))
    }

    fn event(&self, element: &Element, pad: &Pad, event: Event) -> bool {
        match &event {
            Event::Seek(seek) => self.perform_seek(element, pad, seek),
            _ => pad.event_default(event),
        }
    }

    fn query(&self, _element: &Element, _pad: &Pad, query: &mut Query) -> bool {
        if query.format() != Some(SegmentFormat::Bytes) {
            return false;
        }
        let len = self.data.len() as u64;
        match query {
            Query::Position { .. } => {
                query.set_position(self.position());
                true
            }
            Query::Duration { .. } => {
                query.set_duration(len);
                true
            }
            Query::Seeking { .. } => {
                query.set_seeking(true, 0, Some(len));
                true
            }
            _ => false,
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
            return Ok(());
        }
        self.reset();
        if mode == PadMode::Push {
            pad.create_task(|pad, ctx| {
                let Some(element) = pad.parent() else {
                    return Err(FlowError::Flushing);
                };
                match element.downcast_ref::<DataSrc>() {
                    Some(src) => src.stream_loop(&element, pad, ctx),
                    None => Err(FlowError::Error),
                }
            })
            .map_err(|e| ActivationError::Failed(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::PadDirection;

    #[test]
    fn test_create_ranges() {
        let element = DataSrc::element("src", Bytes::from_static(b"0123456789"));
        let src = element.static_pad("src").unwrap();

        // Pull activation is normally triggered by the peer.
        src.activate(PadMode::Pull).unwrap();

        let buffer = src.create(2, 4).unwrap();
        assert_eq!(buffer.as_bytes(), b"2345");
        assert_eq!(buffer.offset(), Some(2));

        let tail = src.create(8, 100).unwrap();
        assert_eq!(tail.as_bytes(), b"89");
        assert_eq!(src.create(10, 1).unwrap_err(), FlowError::Eos);
    }

    #[test]
    fn test_queries() {
        let element = DataSrc::element("src", vec![0u8; 100]);
        let src = element.static_pad("src").unwrap();

        let mut duration = Query::new_duration(SegmentFormat::Bytes);
        assert!(src.query(&mut duration));
        assert_eq!(duration.duration(), Some(100));

        let mut seeking = Query::new_seeking(SegmentFormat::Bytes);
        assert!(src.query(&mut seeking));
        assert!(seeking.is_seekable());

        let mut time = Query::new_duration(SegmentFormat::Time);
        assert!(!src.query(&mut time));
    }

    #[test]
    fn test_builder() {
        let src = DataSrc::from_string("abc").with_blocksize(0);
        assert_eq!(src.blocksize, 1);
        assert!(!src.is_empty());
        let element = src.into_element("src");
        assert_eq!(element.pads()[0].direction(), PadDirection::Src);
    }
}
