//! Heap-backed memory segment.

use super::{MemorySegment, MemoryType};

/// A memory segment backed by heap allocation.
///
/// # Example
///
/// ```rust
/// use padflow::memory::{HeapSegment, MemorySegment};
///
/// let segment = HeapSegment::new(1024);
/// assert_eq!(segment.len(), 1024);
/// ```
pub struct HeapSegment {
    /// Boxed slice so the allocation is never resized behind a view.
    data: Box<[u8]>,
}

impl HeapSegment {
    /// Create a zero-initialized heap segment of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Create a segment that takes ownership of `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// Create a segment holding a copy of `data`.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }
}

impl MemorySegment for HeapSegment {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        Some(&mut self.data)
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn memory_type(&self) -> MemoryType {
        MemoryType::Heap
    }
}

impl std::fmt::Debug for HeapSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapSegment")
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_segment_creation() {
        let segment = HeapSegment::new(1024);
        assert_eq!(segment.len(), 1024);
        assert_eq!(segment.memory_type(), MemoryType::Heap);
    }

    #[test]
    fn test_heap_segment_is_zeroed() {
        let segment = HeapSegment::new(64);
        assert!(segment.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_heap_segment_read_write() {
        let mut segment = HeapSegment::new(8);
        let slice = segment.as_mut_slice().unwrap();
        slice[0] = 42;
        slice[1] = 43;
        assert_eq!(&segment.as_slice()[..2], &[42, 43]);
    }

    #[test]
    fn test_zero_sized_segment() {
        let segment = HeapSegment::from_vec(Vec::new());
        assert!(segment.is_empty());
    }
}
