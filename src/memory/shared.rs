//! Read-only segment over a `bytes::Bytes` handle.

use super::{MemorySegment, MemoryType};
use bytes::Bytes;

/// A segment that views memory owned by a [`Bytes`] handle without copying.
///
/// The memory may be shared with other `Bytes` clones outside the pipeline,
/// so the segment never hands out mutable access.
#[derive(Debug, Clone)]
pub struct BytesSegment {
    bytes: Bytes,
}

impl BytesSegment {
    /// Wrap a `Bytes` handle.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Get the wrapped handle.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl MemorySegment for BytesSegment {
    fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_segment_is_read_only() {
        let mut segment = BytesSegment::new(Bytes::from_static(b"static"));
        assert_eq!(segment.as_slice(), b"static");
        assert!(segment.as_mut_slice().is_none());
        assert!(!segment.memory_type().is_writable());
    }
}
