//! Reference-counted buffers with copy-on-write.
//!
//! A [`Buffer`] is a cheap handle: cloning it takes another reference, and
//! dropping the last reference frees the record. Buffers are logically
//! immutable while shared; [`Buffer::make_mut`] copies whatever is shared
//! before handing out mutable bytes.

use crate::memory::{BytesSegment, HeapSegment, MemorySegment, MemoryType};
use crate::metadata::{BufferFlags, Metadata};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Handle to a memory region within a segment.
///
/// This is cheap to clone (just Arc increment + copy of offset/len).
#[derive(Clone)]
pub struct MemoryHandle {
    /// The backing memory segment.
    segment: Arc<dyn MemorySegment>,
    /// Offset within the segment.
    offset: usize,
    /// Length of this handle's data.
    len: usize,
}

impl MemoryHandle {
    /// Create a new memory handle.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > segment.len()`.
    pub fn new(segment: Arc<dyn MemorySegment>, offset: usize, len: usize) -> Self {
        assert!(
            offset + len <= segment.len(),
            "memory handle exceeds segment bounds"
        );
        Self {
            segment,
            offset,
            len,
        }
    }

    /// Create a memory handle covering an entire segment.
    pub fn from_segment(segment: Arc<dyn MemorySegment>) -> Self {
        let len = segment.len();
        Self {
            segment,
            offset: 0,
            len,
        }
    }

    /// Get the length of this handle's data.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if this handle has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get this handle's data as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.segment.as_slice()[self.offset..self.offset + self.len]
    }

    /// Get the memory type of the backing segment.
    pub fn memory_type(&self) -> MemoryType {
        self.segment.memory_type()
    }

    /// Get the offset within the segment.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Create a sub-handle (a view into a portion of this handle).
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > self.len`.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(offset + len <= self.len, "sub-handle exceeds parent bounds");
        Self {
            segment: Arc::clone(&self.segment),
            offset: self.offset + offset,
            len,
        }
    }

    /// Check if `other` starts exactly where this handle ends, in the same segment.
    pub fn is_contiguous_with(&self, other: &MemoryHandle) -> bool {
        Arc::ptr_eq(&self.segment, &other.segment) && self.offset + self.len == other.offset
    }

    /// Check if this handle is the only reference to a writable segment.
    pub fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.segment) == 1 && self.memory_type().is_writable()
    }

    /// Get this handle's data mutably, copying it into a private heap segment
    /// first if the segment is shared or read-only.
    pub fn make_mut(&mut self) -> &mut [u8] {
        let needs_copy = match Arc::get_mut(&mut self.segment) {
            Some(segment) => segment.as_mut_slice().is_none(),
            None => true,
        };
        if needs_copy {
            let copy = HeapSegment::copy_from_slice(self.as_slice());
            self.segment = Arc::new(copy);
            self.offset = 0;
        }

        let range = self.offset..self.offset + self.len;
        match Arc::get_mut(&mut self.segment).and_then(|s| s.as_mut_slice()) {
            Some(bytes) => &mut bytes[range],
            None => unreachable!("freshly copied heap segment is exclusive"),
        }
    }
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("memory_type", &self.memory_type())
            .finish()
    }
}

#[derive(Clone)]
struct BufferInner {
    memory: MemoryHandle,
    metadata: Metadata,
}

/// A buffer containing data and metadata.
///
/// Buffers are the unit of data passed between pads. They consist of:
/// - A [`MemoryHandle`] pointing to the actual data
/// - [`Metadata`] with timestamps, offsets and flags
///
/// # Ownership
///
/// `Clone` takes another reference to the same buffer; the record and its
/// memory are freed when the last reference is dropped. Two `Buffer` values
/// compare equal only if they are references to the same buffer.
///
/// # Example
///
/// ```rust
/// use padflow::buffer::Buffer;
///
/// let mut buffer = Buffer::from_slice(b"hello");
/// let shared = buffer.clone();
/// assert_eq!(buffer.ref_count(), 2);
///
/// // Writing to a shared buffer copies it first.
/// buffer.make_mut()[0] = b'j';
/// assert_eq!(buffer.as_bytes(), b"jello");
/// assert_eq!(shared.as_bytes(), b"hello");
/// ```
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Create a new buffer.
    pub fn new(memory: MemoryHandle, metadata: Metadata) -> Self {
        Self {
            inner: Arc::new(BufferInner { memory, metadata }),
        }
    }

    /// Create a zero-filled buffer of `size` bytes.
    pub fn with_size(size: usize) -> Self {
        Self::from_segment(Arc::new(HeapSegment::new(size)))
    }

    /// Create a buffer holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_segment(Arc::new(HeapSegment::copy_from_slice(data)))
    }

    fn from_segment(segment: Arc<dyn MemorySegment>) -> Self {
        Self::new(MemoryHandle::from_segment(segment), Metadata::new())
    }

    /// Get a reference to the buffer's metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Get a mutable reference to the buffer's metadata.
    ///
    /// Copies the buffer record (not the bytes) if it is shared.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut Arc::make_mut(&mut self.inner).metadata
    }

    /// Set the metadata, returning the buffer.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        *self.metadata_mut() = metadata;
        self
    }

    /// Presentation timestamp.
    pub fn pts(&self) -> Option<Duration> {
        self.inner.metadata.pts
    }

    /// Duration of the buffer's content.
    pub fn duration(&self) -> Option<Duration> {
        self.inner.metadata.duration
    }

    /// Byte offset in the original source.
    pub fn offset(&self) -> Option<u64> {
        self.inner.metadata.offset
    }

    /// Buffer flags.
    pub fn flags(&self) -> BufferFlags {
        self.inner.metadata.flags
    }

    /// Get a reference to the memory handle.
    pub fn memory(&self) -> &MemoryHandle {
        &self.inner.memory
    }

    /// Map the buffer for reading.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.memory.as_slice()
    }

    /// Get the length of the buffer data.
    pub fn len(&self) -> usize {
        self.inner.memory.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.memory.is_empty()
    }

    /// Get the memory type of the backing segment.
    pub fn memory_type(&self) -> MemoryType {
        self.inner.memory.memory_type()
    }

    /// Number of live references to this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Check if the bytes can be written without copying.
    pub fn is_writable(&self) -> bool {
        self.ref_count() == 1 && self.inner.memory.is_exclusive()
    }

    /// Check whether two handles refer to the same buffer.
    pub fn ptr_eq(a: &Buffer, b: &Buffer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Make the buffer exclusive and get its bytes for in-place mutation.
    ///
    /// The buffer record is cloned if other references exist, and the bytes
    /// are copied if the memory is shared with another buffer or read-only.
    pub fn make_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.inner).memory.make_mut()
    }

    /// Create a zero-copy sub-buffer (a view into a portion of this buffer).
    ///
    /// Timestamps are kept only when the view starts at offset 0; the byte
    /// offsets are shifted to describe the view.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > self.len()`.
    pub fn slice(&self, offset: usize, len: usize) -> Buffer {
        let memory = self.inner.memory.slice(offset, len);
        let source = &self.inner.metadata;
        let mut metadata = Metadata {
            sequence: source.sequence,
            flags: source.flags,
            offset: source.offset.map(|o| o + offset as u64),
            offset_end: source.offset.map(|o| o + (offset + len) as u64),
            ..Metadata::default()
        };
        if offset == 0 {
            metadata.pts = source.pts;
            metadata.dts = source.dts;
            if len == self.len() {
                metadata.duration = source.duration;
            }
        } else {
            metadata.flags.discont = false;
        }
        Buffer::new(memory, metadata)
    }

    /// Check if `other` directly follows this buffer in the same memory.
    pub fn is_span_contiguous(&self, other: &Buffer) -> bool {
        self.inner.memory.is_contiguous_with(&other.inner.memory)
    }

    /// Join this buffer with `other` into one contiguous buffer.
    ///
    /// Zero-copy when `other` directly follows this buffer in the same
    /// memory segment; otherwise both are copied into a new segment. The
    /// result carries this buffer's metadata extended over both ranges.
    pub fn merge(&self, other: &Buffer) -> Buffer {
        let memory = if self.is_span_contiguous(other) {
            let first = &self.inner.memory;
            MemoryHandle {
                segment: Arc::clone(&first.segment),
                offset: first.offset,
                len: first.len + other.len(),
            }
        } else {
            let mut data = Vec::with_capacity(self.len() + other.len());
            data.extend_from_slice(self.as_bytes());
            data.extend_from_slice(other.as_bytes());
            MemoryHandle::from_segment(Arc::new(HeapSegment::from_vec(data)))
        };

        let mut metadata = self.inner.metadata.clone();
        metadata.offset_end = other.inner.metadata.offset_end;
        metadata.duration = match (self.duration(), other.duration()) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
        Buffer::new(memory, metadata)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_segment(Arc::new(HeapSegment::from_vec(data)))
    }
}

impl From<Bytes> for Buffer {
    fn from(bytes: Bytes) -> Self {
        Self::from_segment(Arc::new(BytesSegment::new(bytes)))
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Buffer::ptr_eq(self, other)
    }
}

impl Eq for Buffer {}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("memory", &self.inner.memory)
            .field("metadata", &self.inner.metadata)
            .field("refs", &self.ref_count())
            .finish()
    }
}
