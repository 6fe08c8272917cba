//! Memory segment trait and types.

/// Type of memory backing a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Writable heap memory owned by the segment.
    Heap,
    /// Immutable memory borrowed from a [`bytes::Bytes`] handle.
    ///
    /// Writing to a buffer backed by this memory always copies first.
    ReadOnly,
}

impl MemoryType {
    /// Can buffers backed by this memory be written in place?
    #[inline]
    pub fn is_writable(&self) -> bool {
        matches!(self, MemoryType::Heap)
    }
}

/// Trait for memory segment backends.
///
/// A memory segment is a contiguous region of bytes that one or more
/// [`MemoryHandle`](crate::buffer::MemoryHandle)s view. Segments are shared
/// through `Arc`; mutable access is only available through `Arc::get_mut`,
/// i.e. when the caller holds the only reference.
pub trait MemorySegment: Send + Sync {
    /// Get the segment as a byte slice.
    fn as_slice(&self) -> &[u8];

    /// Get the segment as a mutable byte slice.
    ///
    /// Returns `None` if the segment is read-only.
    fn as_mut_slice(&mut self) -> Option<&mut [u8]>;

    /// Total size of the segment in bytes.
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true if the segment has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of memory backing this segment.
    fn memory_type(&self) -> MemoryType;
}
