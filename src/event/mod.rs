//! Control events travelling alongside buffers.
//!
//! Events are categorized by their flow direction:
//!
//! - **Downstream events** describe what happens to the data after this
//!   point (stream-start, segment, tags, gap, EOS). They travel with the data.
//! - **Upstream events** request a change from upstream (seek, QoS, latency).
//!   They travel against the data.
//! - **Flush events** (flush-start, flush-stop) travel downstream but are not
//!   serialized with buffers: flush-start must overtake data so it can unblock
//!   a streaming thread.
//!
//! Serialized downstream events are *sticky*: the pad that receives them keeps
//! the last one of each kind until a flush-stop clears them.
//!
//! # Example
//!
//! ```rust
//! use padflow::event::{Event, TagList, TagsEvent};
//!
//! let tags = TagList::new().with("title", "My Stream");
//! let event = Event::Tags(TagsEvent::new(tags));
//!
//! assert!(event.is_downstream());
//! assert!(event.is_serialized());
//! assert!(event.is_sticky());
//! ```

mod segment;
mod tags;

pub use segment::{Segment, SegmentFlags, SegmentFormat};
pub use tags::{TAG_DURATION, TAG_TITLE, TagList, TagMergeMode, TagValue};

use std::mem;
use std::time::Duration;

// ============================================================================
// Event Enum
// ============================================================================

/// Events that flow through pads.
#[derive(Debug, Clone)]
pub enum Event {
    // ========== Downstream Events ==========
    /// Start of a new stream.
    StreamStart(StreamStartEvent),

    /// The playback window for following buffers.
    Segment(Segment),

    /// Stream tags.
    Tags(TagsEvent),

    /// End of stream: no more data follows.
    Eos,

    /// No data for a period.
    Gap(GapEvent),

    // ========== Upstream Events ==========
    /// Seek request.
    Seek(SeekEvent),

    /// Quality of service feedback.
    Qos(QosEvent),

    /// Configure the pipeline latency.
    Latency(Duration),

    // ========== Flush Events ==========
    /// Discard in-flight data and unblock streaming threads.
    FlushStart,

    /// Resume after a flush.
    FlushStop(FlushStopEvent),

    /// Application-defined event.
    Custom(CustomEvent),
}

/// Direction an event travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventDirection {
    /// With the data, from source pads to sink pads.
    Downstream,
    /// Against the data, from sink pads to source pads.
    Upstream,
}

impl Event {
    /// Direction this event travels in.
    pub fn direction(&self) -> EventDirection {
        match self {
            Event::Seek(_) | Event::Qos(_) | Event::Latency(_) => EventDirection::Upstream,
            Event::Custom(custom) => custom.direction,
            _ => EventDirection::Downstream,
        }
    }

    /// Check if this event flows with data.
    pub fn is_downstream(&self) -> bool {
        self.direction() == EventDirection::Downstream
    }

    /// Check if this event flows against data.
    pub fn is_upstream(&self) -> bool {
        self.direction() == EventDirection::Upstream
    }

    /// Check if this event keeps its position relative to buffers.
    ///
    /// Serialized events are delivered under the receiving pad's stream lock.
    pub fn is_serialized(&self) -> bool {
        match self {
            Event::FlushStart | Event::FlushStop(_) => false,
            Event::Seek(_) | Event::Qos(_) | Event::Latency(_) => false,
            Event::Custom(custom) => custom.serialized,
            _ => true,
        }
    }

    /// Check if a pad stores this event until the next flush-stop.
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            Event::StreamStart(_) | Event::Segment(_) | Event::Tags(_) | Event::Eos
        )
    }

    /// Check if two events are of the same kind.
    pub fn same_kind(&self, other: &Event) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    /// Human-readable name for this event type.
    pub fn name(&self) -> &str {
        match self {
            Event::StreamStart(_) => "stream-start",
            Event::Segment(_) => "segment",
            Event::Tags(_) => "tags",
            Event::Eos => "eos",
            Event::Gap(_) => "gap",
            Event::Seek(_) => "seek",
            Event::Qos(_) => "qos",
            Event::Latency(_) => "latency",
            Event::FlushStart => "flush-start",
            Event::FlushStop(_) => "flush-stop",
            Event::Custom(c) => &c.name,
        }
    }
}

// ============================================================================
// Stream Start Event
// ============================================================================

/// Stream start event: begins a new logical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStartEvent {
    /// Unique stream identifier.
    pub stream_id: String,
    /// Group of streams played together, if any.
    pub group_id: Option<u32>,
}

impl StreamStartEvent {
    /// Create a new stream start event.
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            group_id: None,
        }
    }

    /// Set the group id.
    pub fn with_group(mut self, group_id: u32) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

// ============================================================================
// Tags Event
// ============================================================================

/// Tags event: stream metadata.
#[derive(Debug, Clone)]
pub struct TagsEvent {
    /// The tag list.
    pub tags: TagList,
    /// How to merge with tags already known downstream.
    pub mode: TagMergeMode,
}

impl TagsEvent {
    /// Create a new tags event.
    pub fn new(tags: TagList) -> Self {
        Self {
            tags,
            mode: TagMergeMode::default(),
        }
    }
}

// ============================================================================
// Gap Event
// ============================================================================

/// Gap event: no data for a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapEvent {
    /// Start of the gap.
    pub timestamp: Duration,
    /// Length of the gap, if known.
    pub duration: Option<Duration>,
}

impl GapEvent {
    /// Create a new gap event.
    pub fn new(timestamp: Duration, duration: Option<Duration>) -> Self {
        Self {
            timestamp,
            duration,
        }
    }
}

// ============================================================================
// Seek Event
// ============================================================================

/// Seek event: request to move the playback window.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekEvent {
    /// Playback rate (1.0 = normal, -1.0 = reverse).
    pub rate: f64,
    /// Format of the positions.
    pub format: SegmentFormat,
    /// Seek flags.
    pub flags: SeekFlags,
    /// New start position.
    pub start: SeekPosition,
    /// New stop position.
    pub stop: SeekPosition,
}

impl SeekEvent {
    /// Flushing seek to a time position.
    pub fn new_time(position: Duration) -> Self {
        Self {
            rate: 1.0,
            format: SegmentFormat::Time,
            flags: SeekFlags::FLUSH.union(SeekFlags::KEY_UNIT),
            start: SeekPosition::set(position.as_nanos() as i64),
            stop: SeekPosition::none(),
        }
    }

    /// Flushing seek to a byte position.
    pub fn new_bytes(position: u64) -> Self {
        Self {
            rate: 1.0,
            format: SegmentFormat::Bytes,
            flags: SeekFlags::FLUSH,
            start: SeekPosition::set(position as i64),
            stop: SeekPosition::none(),
        }
    }

    /// Set the rate.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the flags.
    pub fn with_flags(mut self, flags: SeekFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the start position.
    pub fn with_start(mut self, start: SeekPosition) -> Self {
        self.start = start;
        self
    }

    /// Set the stop position.
    pub fn with_stop(mut self, stop: SeekPosition) -> Self {
        self.stop = stop;
        self
    }

    /// Check if this seek flushes the pipeline.
    pub fn is_flush(&self) -> bool {
        self.flags.contains(SeekFlags::FLUSH)
    }
}

/// One end of a seek range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPosition {
    /// How `position` is interpreted.
    pub seek_type: SeekType,
    /// Position or relative offset.
    pub position: i64,
}

impl SeekPosition {
    /// Absolute position.
    pub fn set(position: i64) -> Self {
        Self {
            seek_type: SeekType::Set,
            position,
        }
    }

    /// Offset from the current position.
    pub fn current(offset: i64) -> Self {
        Self {
            seek_type: SeekType::Current,
            position: offset,
        }
    }

    /// Offset from the end (usually negative).
    pub fn end(offset: i64) -> Self {
        Self {
            seek_type: SeekType::End,
            position: offset,
        }
    }

    /// Leave this end unchanged.
    pub fn none() -> Self {
        Self {
            seek_type: SeekType::None,
            position: -1,
        }
    }
}

/// Interpretation of a seek position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeekType {
    /// Keep the current value.
    #[default]
    None,
    /// Absolute position.
    Set,
    /// Relative to the current position.
    Current,
    /// Relative to the end.
    End,
}

/// Flags for seek events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeekFlags(u32);

impl SeekFlags {
    /// No special flags.
    pub const NONE: Self = Self(0);
    /// Flush in-flight data before seeking.
    pub const FLUSH: Self = Self(1 << 0);
    /// Seek to the exact position.
    pub const ACCURATE: Self = Self(1 << 1);
    /// Seek to the nearest keyframe.
    pub const KEY_UNIT: Self = Self(1 << 2);
    /// Segment seek: post SegmentDone instead of EOS.
    pub const SEGMENT: Self = Self(1 << 3);

    /// Create empty flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if contains a flag.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

// ============================================================================
// QoS Event
// ============================================================================

/// Quality of service feedback sent upstream by a late or early sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QosEvent {
    /// Long-term proportion of the real-time rate achieved.
    pub proportion: f64,
    /// Lateness of the buffer in nanoseconds; negative when early.
    pub diff: i64,
    /// Timestamp of the buffer the feedback is about.
    pub timestamp: Duration,
}

impl QosEvent {
    /// Create a QoS event.
    pub fn new(proportion: f64, diff: i64, timestamp: Duration) -> Self {
        Self {
            proportion,
            diff,
            timestamp,
        }
    }
}

// ============================================================================
// Flush Stop Event
// ============================================================================

/// Flush stop event: resume normal operation after a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushStopEvent {
    /// Whether running time restarts at 0.
    pub reset_time: bool,
}

impl FlushStopEvent {
    /// Create a new flush stop event.
    pub fn new(reset_time: bool) -> Self {
        Self { reset_time }
    }
}

impl Default for FlushStopEvent {
    fn default() -> Self {
        Self { reset_time: true }
    }
}

// ============================================================================
// Custom Event
// ============================================================================

/// Application-defined event.
#[derive(Debug, Clone)]
pub struct CustomEvent {
    /// Event name.
    pub name: String,
    /// Direction of travel.
    pub direction: EventDirection,
    /// Whether the event is ordered with buffers.
    pub serialized: bool,
    /// Payload.
    pub data: TagList,
}

impl CustomEvent {
    /// Create a serialized downstream custom event.
    pub fn downstream(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: EventDirection::Downstream,
            serialized: true,
            data: TagList::new(),
        }
    }

    /// Create an upstream custom event.
    pub fn upstream(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: EventDirection::Upstream,
            serialized: false,
            data: TagList::new(),
        }
    }

    /// Add a payload value.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.data.set(key, value);
        self
    }
}
