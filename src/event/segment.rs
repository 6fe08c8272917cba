//! Playback segments.
//!
//! A [`Segment`] describes the currently valid window of a stream in one
//! format (bytes or nanoseconds) and maps stream positions to running time.
//! Sources update their segment from seek events with [`Segment::do_seek`]
//! and announce it downstream in a Segment event; sinks use
//! [`Segment::clip`] and [`Segment::to_running_time`].

use super::{SeekEvent, SeekFlags, SeekType};
use std::time::Duration;

/// Format of segment positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SegmentFormat {
    /// Element-specific default units.
    Default,
    /// Byte positions.
    Bytes,
    /// Positions in nanoseconds.
    #[default]
    Time,
}

/// Flags carried by a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SegmentFlags(u32);

impl SegmentFlags {
    /// No special flags.
    pub const NONE: Self = Self(0);
    /// Running time was reset by a flushing seek.
    pub const RESET: Self = Self(1 << 0);
    /// Intermediate data may be skipped.
    pub const SKIP: Self = Self(1 << 1);
    /// Segment seek: post SegmentDone instead of EOS at the stop position.
    pub const SEGMENT: Self = Self(1 << 2);

    /// Check if contains a flag.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A playback window in one format.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Units of every position field.
    pub format: SegmentFormat,
    /// Segment flags.
    pub flags: SegmentFlags,
    /// Playback rate; negative plays backwards.
    pub rate: f64,
    /// Running time accumulated by previous segments.
    pub base: u64,
    /// First valid position.
    pub start: u64,
    /// Position after the last valid one, if bounded.
    pub stop: Option<u64>,
    /// Stream time of `start`.
    pub time: u64,
    /// Last known position.
    pub position: u64,
    /// Total stream length, if known.
    pub duration: Option<u64>,
}

impl Default for Segment {
    fn default() -> Self {
        Self::new(SegmentFormat::Time)
    }
}

impl Segment {
    /// Create an open segment starting at 0.
    pub fn new(format: SegmentFormat) -> Self {
        Self {
            format,
            flags: SegmentFlags::NONE,
            rate: 1.0,
            base: 0,
            start: 0,
            stop: None,
            time: 0,
            position: 0,
            duration: None,
        }
    }

    /// Create a time segment.
    pub fn new_time(start: Duration, stop: Option<Duration>) -> Self {
        let start = start.as_nanos() as u64;
        Self {
            start,
            stop: stop.map(|s| s.as_nanos() as u64),
            time: start,
            position: start,
            ..Self::new(SegmentFormat::Time)
        }
    }

    /// Create a byte segment.
    pub fn new_bytes(start: u64, stop: Option<u64>) -> Self {
        Self {
            start,
            stop,
            time: start,
            position: start,
            ..Self::new(SegmentFormat::Bytes)
        }
    }

    /// Set the total length.
    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Apply a seek to this segment.
    ///
    /// Returns `None` when the seek cannot be applied (format mismatch, zero
    /// rate, or an end-relative position without a known duration). Otherwise
    /// returns whether the playback position moved.
    pub fn do_seek(&mut self, seek: &SeekEvent) -> Option<bool> {
        if seek.format != self.format || seek.rate == 0.0 {
            return None;
        }

        let start = match seek.start.seek_type {
            SeekType::None => self.start,
            SeekType::Set => clamp_position(seek.start.position),
            SeekType::Current => clamp_position(self.position as i64 + seek.start.position),
            SeekType::End => clamp_position(self.duration? as i64 + seek.start.position),
        };
        let stop = match seek.stop.seek_type {
            SeekType::None => self.stop,
            SeekType::Set if seek.stop.position < 0 => None,
            SeekType::Set => Some(clamp_position(seek.stop.position)),
            SeekType::Current => Some(clamp_position(self.position as i64 + seek.stop.position)),
            SeekType::End => Some(clamp_position(self.duration? as i64 + seek.stop.position)),
        };

        let start = match self.duration {
            Some(duration) => start.min(duration),
            None => start,
        };
        let stop = stop.map(|s| s.max(start));

        if seek.flags.contains(SeekFlags::FLUSH) {
            self.base = 0;
            self.flags = SegmentFlags::RESET;
        } else {
            self.base = self.to_running_time(self.position).unwrap_or(self.base);
            self.flags = SegmentFlags::NONE;
        }
        if seek.flags.contains(SeekFlags::SEGMENT) {
            self.flags = self.flags.union(SegmentFlags::SEGMENT);
        }

        let position = if seek.rate > 0.0 {
            start
        } else {
            stop.unwrap_or(start)
        };
        let update = position != self.position;

        self.rate = seek.rate;
        self.start = start;
        self.stop = stop;
        self.time = start;
        self.position = position;
        Some(update)
    }

    /// Clip `[start, stop)` to this segment.
    ///
    /// Returns `None` when the range lies completely outside the segment.
    /// An unbounded `stop` is clipped to the segment stop.
    pub fn clip(&self, start: u64, stop: Option<u64>) -> Option<(u64, Option<u64>)> {
        if let Some(seg_stop) = self.stop {
            if start >= seg_stop && !(start == seg_stop && stop == Some(start)) {
                return None;
            }
        }
        if let Some(stop) = stop {
            if stop < self.start || (stop == self.start && start != stop) {
                return None;
            }
        }

        let clipped_start = start.max(self.start);
        let clipped_stop = match (stop, self.stop) {
            (Some(stop), Some(seg_stop)) => Some(stop.min(seg_stop)),
            (Some(stop), None) => Some(stop),
            (None, seg_stop) => seg_stop,
        };
        Some((clipped_start, clipped_stop))
    }

    /// Convert a stream position to running time.
    ///
    /// Returns `None` for positions outside the segment, and for backwards
    /// playback without a stop position.
    pub fn to_running_time(&self, position: u64) -> Option<u64> {
        if position < self.start {
            return None;
        }
        if let Some(stop) = self.stop {
            if position > stop {
                return None;
            }
        }

        let distance = if self.rate > 0.0 {
            position - self.start
        } else {
            self.stop? - position
        };
        let abs_rate = self.rate.abs();
        let scaled = if abs_rate == 1.0 {
            distance
        } else {
            (distance as f64 / abs_rate) as u64
        };
        Some(self.base + scaled)
    }

    /// Convert a stream position to stream time.
    pub fn to_stream_time(&self, position: u64) -> Option<u64> {
        if position < self.start {
            return None;
        }
        if let Some(stop) = self.stop {
            if position > stop {
                return None;
            }
        }
        Some(position - self.start + self.time)
    }

    /// Check if `position` is past the stop position in playback direction.
    pub fn is_done(&self, position: u64) -> bool {
        if self.rate > 0.0 {
            self.stop.is_some_and(|stop| position >= stop)
        } else {
            position <= self.start
        }
    }
}

fn clamp_position(position: i64) -> u64 {
    position.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SeekPosition;

    #[test]
    fn test_flushing_seek_resets_base() {
        let mut segment = Segment::new_bytes(0, None).with_duration(1000);
        segment.base = 500;
        segment.position = 100;

        let update = segment.do_seek(&SeekEvent::new_bytes(400)).unwrap();
        assert!(update);
        assert_eq!(segment.start, 400);
        assert_eq!(segment.position, 400);
        assert_eq!(segment.base, 0);
        assert!(segment.flags.contains(SegmentFlags::RESET));
    }

    #[test]
    fn test_non_flushing_seek_accumulates_base() {
        let mut segment = Segment::new_bytes(0, None);
        segment.position = 300;

        let seek = SeekEvent::new_bytes(50).with_flags(SeekFlags::NONE);
        assert_eq!(segment.do_seek(&seek), Some(true));
        assert_eq!(segment.base, 300);
        assert_eq!(segment.to_running_time(60), Some(310));
    }

    #[test]
    fn test_seek_relative_to_end() {
        let mut segment = Segment::new_bytes(0, None);
        let seek = SeekEvent::new_bytes(0).with_start(SeekPosition::end(-100));
        assert_eq!(segment.do_seek(&seek), None, "duration unknown");

        segment.duration = Some(1000);
        assert_eq!(segment.do_seek(&seek), Some(true));
        assert_eq!(segment.start, 900);
    }

    #[test]
    fn test_seek_format_mismatch() {
        let mut segment = Segment::new_bytes(0, None);
        assert!(segment.do_seek(&SeekEvent::new_time(Duration::from_secs(1))).is_none());
    }

    #[test]
    fn test_clip() {
        let segment = Segment::new_bytes(100, Some(200));
        assert_eq!(segment.clip(50, Some(150)), Some((100, Some(150))));
        assert_eq!(segment.clip(150, Some(250)), Some((150, Some(200))));
        assert_eq!(segment.clip(150, None), Some((150, Some(200))));
        assert_eq!(segment.clip(0, Some(100)), None);
        assert_eq!(segment.clip(200, Some(300)), None);
    }

    #[test]
    fn test_running_time_with_rate() {
        let mut segment = Segment::new_time(Duration::from_secs(10), Some(Duration::from_secs(20)));
        assert_eq!(segment.to_running_time(10_000_000_000), Some(0));
        assert_eq!(segment.to_running_time(15_000_000_000), Some(5_000_000_000));
        assert_eq!(segment.to_running_time(5_000_000_000), None);

        segment.rate = 2.0;
        assert_eq!(segment.to_running_time(14_000_000_000), Some(2_000_000_000));

        segment.rate = -1.0;
        assert_eq!(segment.to_running_time(19_000_000_000), Some(1_000_000_000));
        assert_eq!(segment.to_stream_time(12_000_000_000), Some(12_000_000_000));
    }

    #[test]
    fn test_is_done() {
        let segment = Segment::new_bytes(0, Some(64));
        assert!(!segment.is_done(63));
        assert!(segment.is_done(64));
        assert!(!Segment::new_bytes(0, None).is_done(u64::MAX));
    }
}
