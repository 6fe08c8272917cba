//! Buffer metadata types.

use std::time::Duration;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// First buffer after a discontinuity (seek, flush, packet loss).
    pub discont: bool,
    /// Buffer cannot be decoded on its own (not a keyframe).
    pub delta_unit: bool,
    /// Buffer is a gap marker carrying no meaningful data.
    pub gap: bool,
    /// Buffer carries stream headers.
    pub header: bool,
    /// Buffer is corrupted or incomplete.
    pub corrupted: bool,
    /// Buffer should be decoded but not presented.
    pub decode_only: bool,
    /// Last buffer of the stream.
    pub eos: bool,
}

impl BufferFlags {
    /// Set the discont flag.
    pub fn set_discont(&mut self, value: bool) {
        self.discont = value;
    }

    /// Check if the discont flag is set.
    pub fn is_discont(&self) -> bool {
        self.discont
    }

    /// Check if this buffer is a sync point (not a delta unit).
    pub fn is_sync_point(&self) -> bool {
        !self.delta_unit
    }
}

/// Metadata associated with a buffer.
///
/// Timestamps are optional; a parser that cannot timestamp its output leaves
/// them unset and downstream interpolates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Presentation timestamp.
    pub pts: Option<Duration>,

    /// Decode timestamp.
    pub dts: Option<Duration>,

    /// Duration of this buffer's content.
    pub duration: Option<Duration>,

    /// Monotonic sequence number within a stream.
    pub sequence: u64,

    /// Byte offset of the first byte in the original source.
    pub offset: Option<u64>,

    /// Byte offset one past the last byte in the original source.
    pub offset_end: Option<u64>,

    /// Buffer flags.
    pub flags: BufferFlags,
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the decode timestamp.
    pub fn with_dts(mut self, dts: Duration) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the byte range `[offset, offset + len)` in the original source.
    pub fn with_byte_range(mut self, offset: u64, len: u64) -> Self {
        self.offset = Some(offset);
        self.offset_end = Some(offset + len);
        self
    }

    /// Mark as first buffer after a discontinuity.
    pub fn with_discont(mut self) -> Self {
        self.flags.discont = true;
        self
    }

    /// Mark as a delta unit.
    pub fn with_delta_unit(mut self) -> Self {
        self.flags.delta_unit = true;
        self
    }

    /// Mark as end-of-stream.
    pub fn with_eos(mut self) -> Self {
        self.flags.eos = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::from_sequence(42)
            .with_pts(Duration::from_millis(100))
            .with_duration(Duration::from_millis(33))
            .with_byte_range(1000, 24);

        assert_eq!(meta.sequence, 42);
        assert_eq!(meta.pts, Some(Duration::from_millis(100)));
        assert_eq!(meta.duration, Some(Duration::from_millis(33)));
        assert_eq!(meta.offset, Some(1000));
        assert_eq!(meta.offset_end, Some(1024));
    }

    #[test]
    fn test_flags() {
        let meta = Metadata::new().with_discont().with_delta_unit();
        assert!(meta.flags.is_discont());
        assert!(!meta.flags.is_sync_point());
        assert!(!meta.flags.eos);
    }
}
