//! Byte-granular FIFO over a sequence of buffers.
//!
//! Stream parsers receive data in arbitrarily sized buffers but need to read
//! exactly as many bytes as they understand. The [`Adapter`] queues incoming
//! buffers and lets the parser [`peek`](Adapter::peek) at the front bytes,
//! then [`flush`](Adapter::flush) exactly what it consumed.
//!
//! # Example
//!
//! ```rust
//! use padflow::adapter::Adapter;
//! use padflow::buffer::Buffer;
//!
//! let mut adapter = Adapter::new();
//! adapter.push(Buffer::from_slice(b"\x00\x00\x00\x05hel"));
//! adapter.push(Buffer::from_slice(b"lo, world"));
//!
//! // Read a 4 byte length prefix, then the payload it announces.
//! let header = adapter.peek(4).unwrap();
//! let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
//! drop(header);
//! adapter.flush(4);
//!
//! assert_eq!(adapter.take(len).unwrap(), b"hello");
//! assert_eq!(adapter.available(), 7);
//! ```

use crate::buffer::Buffer;
use bytes::Buf;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::Duration;

/// A FIFO of buffers with byte-granular peek, flush and take.
#[derive(Debug, Default)]
pub struct Adapter {
    buffers: VecDeque<Buffer>,
    /// Bytes available across all queued buffers (excludes `skip`).
    size: usize,
    /// Bytes already consumed from the front buffer.
    skip: usize,
    pts: Option<Duration>,
    pts_distance: u64,
    offset: Option<u64>,
    offset_distance: u64,
}

impl Adapter {
    /// Create an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer. Empty buffers are ignored.
    pub fn push(&mut self, buffer: Buffer) {
        if buffer.is_empty() {
            return;
        }
        self.size += buffer.len();
        self.buffers.push_back(buffer);
        if self.buffers.len() == 1 {
            self.front_changed();
        }
    }

    /// Total number of buffered bytes.
    pub fn available(&self) -> usize {
        self.size
    }

    /// Bytes that can be read from the front buffer without copying.
    pub fn available_fast(&self) -> usize {
        self.buffers
            .front()
            .map(|front| front.len() - self.skip)
            .unwrap_or(0)
    }

    /// Check if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of queued buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Look at the first `n` bytes without consuming them.
    ///
    /// Borrows straight from the front buffer when it holds all `n` bytes and
    /// assembles a copy otherwise. Returns `None` when `n` is 0 or more than
    /// [`available`](Self::available).
    pub fn peek(&self, n: usize) -> Option<Cow<'_, [u8]>> {
        if n == 0 || n > self.size {
            return None;
        }
        if n <= self.available_fast() {
            let front = self.buffers.front()?;
            return Some(Cow::Borrowed(&front.as_bytes()[self.skip..self.skip + n]));
        }
        let mut data = vec![0u8; n];
        self.copy_to(0, &mut data);
        Some(Cow::Owned(data))
    }

    /// Look at the first `n` bytes as a buffer without consuming them.
    ///
    /// Returns a zero-copy view when the bytes lie in one buffer or in
    /// adjacent views of the same memory, and an assembled copy otherwise.
    pub fn peek_buffer(&self, n: usize) -> Option<Buffer> {
        if n == 0 || n > self.size {
            return None;
        }
        let front = self.buffers.front()?;
        if n <= self.available_fast() {
            return Some(front.slice(self.skip, n));
        }

        let mut parts = Vec::new();
        let mut remaining = n;
        for (index, buffer) in self.buffers.iter().enumerate() {
            let start = if index == 0 { self.skip } else { 0 };
            let len = (buffer.len() - start).min(remaining);
            parts.push(buffer.slice(start, len));
            remaining -= len;
            if remaining == 0 {
                break;
            }
        }

        let contiguous = parts.windows(2).all(|w| w[0].is_span_contiguous(&w[1]));
        if contiguous {
            let mut iter = parts.into_iter();
            let first = iter.next()?;
            return Some(iter.fold(first, |acc, part| acc.merge(&part)));
        }

        let mut data = vec![0u8; n];
        self.copy_to(0, &mut data);
        let metadata = parts[0].metadata().clone();
        Some(Buffer::from(data).with_metadata(metadata))
    }

    /// Discard the first `n` bytes, releasing fully consumed buffers.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.available()`.
    pub fn flush(&mut self, n: usize) {
        assert!(n <= self.size, "flush exceeds available bytes");
        let mut remaining = n;
        self.size -= n;

        while remaining > 0 {
            let Some(front) = self.buffers.front() else {
                break;
            };
            let left = front.len() - self.skip;
            if remaining < left {
                self.skip += remaining;
                self.advance_distance(remaining);
                break;
            }
            remaining -= left;
            self.advance_distance(left);
            self.skip = 0;
            self.buffers.pop_front();
            if !self.buffers.is_empty() {
                self.front_changed();
            }
        }
    }

    /// Consume the first `n` bytes, returning them as an owned vector.
    pub fn take(&mut self, n: usize) -> Option<Vec<u8>> {
        let data = self.peek(n)?.into_owned();
        self.flush(n);
        Some(data)
    }

    /// Consume the first `n` bytes, returning them as a buffer.
    ///
    /// Zero-copy under the same conditions as [`peek_buffer`](Self::peek_buffer).
    pub fn take_buffer(&mut self, n: usize) -> Option<Buffer> {
        let buffer = self.peek_buffer(n)?;
        self.flush(n);
        Some(buffer)
    }

    /// Copy `dest.len()` bytes starting `offset` bytes into the adapter.
    ///
    /// # Panics
    ///
    /// Panics if `offset + dest.len() > self.available()`.
    pub fn copy_to(&self, offset: usize, dest: &mut [u8]) {
        assert!(
            offset + dest.len() <= self.size,
            "copy exceeds available bytes"
        );
        let mut skip = self.skip + offset;
        let mut written = 0;
        for buffer in &self.buffers {
            if written == dest.len() {
                break;
            }
            let bytes = buffer.as_bytes();
            if skip >= bytes.len() {
                skip -= bytes.len();
                continue;
            }
            let len = (bytes.len() - skip).min(dest.len() - written);
            dest[written..written + len].copy_from_slice(&bytes[skip..skip + len]);
            written += len;
            skip = 0;
        }
    }

    /// Find the first position where the big-endian `u32` at that position,
    /// masked with `mask`, equals `pattern`.
    ///
    /// Only the `size` bytes starting at `offset` are searched, and the whole
    /// 4-byte word must lie inside that range. Returns the position relative
    /// to the start of the adapter.
    ///
    /// # Panics
    ///
    /// Panics if `offset + size > self.available()`.
    pub fn masked_scan_u32(
        &self,
        mask: u32,
        pattern: u32,
        offset: usize,
        size: usize,
    ) -> Option<usize> {
        assert!(
            offset + size <= self.size,
            "scan exceeds available bytes"
        );
        debug_assert_eq!(pattern & mask, pattern, "pattern has bits outside mask");

        let mut state: u32 = 0;
        for (index, byte) in self.bytes_from(offset).take(size).enumerate() {
            state = (state << 8) | byte as u32;
            if index >= 3 && state & mask == pattern {
                return Some(offset + index - 3);
            }
        }
        None
    }

    /// Timestamp of the last buffer that started at or before the read
    /// position, and the number of bytes consumed since that buffer started.
    pub fn prev_pts(&self) -> (Option<Duration>, u64) {
        (self.pts, self.pts_distance)
    }

    /// Source byte offset of the last buffer that started at or before the
    /// read position, and the number of bytes consumed since then.
    pub fn prev_offset(&self) -> (Option<u64>, u64) {
        (self.offset, self.offset_distance)
    }

    /// Drop all buffered data and reset timestamp tracking.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.size = 0;
        self.skip = 0;
        self.pts = None;
        self.pts_distance = 0;
        self.offset = None;
        self.offset_distance = 0;
    }

    fn bytes_from(&self, offset: usize) -> impl Iterator<Item = u8> + '_ {
        let start = self.skip + offset;
        self.buffers
            .iter()
            .flat_map(|buffer| buffer.as_bytes().iter().copied())
            .skip(start)
    }

    fn front_changed(&mut self) {
        let Some(front) = self.buffers.front() else {
            return;
        };
        if let Some(pts) = front.pts() {
            self.pts = Some(pts);
            self.pts_distance = 0;
        }
        if let Some(offset) = front.offset() {
            self.offset = Some(offset);
            self.offset_distance = 0;
        }
    }

    fn advance_distance(&mut self, n: usize) {
        self.pts_distance += n as u64;
        self.offset_distance += n as u64;
    }
}

impl Buf for Adapter {
    fn remaining(&self) -> usize {
        self.size
    }

    fn chunk(&self) -> &[u8] {
        match self.buffers.front() {
            Some(front) => &front.as_bytes()[self.skip..],
            None => &[],
        }
    }

    fn advance(&mut self, cnt: usize) {
        self.flush(cnt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn numbered(start: u8, len: usize) -> Buffer {
        Buffer::from((0..len).map(|i| start.wrapping_add(i as u8)).collect::<Vec<_>>())
    }

    #[test]
    fn test_push_and_available() {
        let mut adapter = Adapter::new();
        adapter.push(numbered(0, 10));
        adapter.push(Buffer::with_size(0));
        adapter.push(numbered(10, 6));

        assert_eq!(adapter.available(), 16);
        assert_eq!(adapter.available_fast(), 10);
        assert_eq!(adapter.buffer_count(), 2);
    }

    #[test]
    fn test_peek_within_front_is_borrowed() {
        let mut adapter = Adapter::new();
        adapter.push(numbered(0, 10));

        let peeked = adapter.peek(4).unwrap();
        assert!(matches!(peeked, Cow::Borrowed(_)));
        assert_eq!(&*peeked, &[0, 1, 2, 3]);
    }

    #[test]
    fn test_peek_spanning_buffers_assembles() {
        let mut adapter = Adapter::new();
        adapter.push(numbered(0, 3));
        adapter.push(numbered(3, 3));

        let peeked = adapter.peek(5).unwrap();
        assert!(matches!(peeked, Cow::Owned(_)));
        assert_eq!(&*peeked, &[0, 1, 2, 3, 4]);
        drop(peeked);
        assert_eq!(adapter.available(), 6, "peek must not consume");
    }

    #[test]
    fn test_peek_too_much_or_nothing() {
        let mut adapter = Adapter::new();
        adapter.push(numbered(0, 3));
        assert!(adapter.peek(4).is_none());
        assert!(adapter.peek(0).is_none());
    }

    #[test]
    fn test_flush_partial_and_whole_buffers() {
        let mut adapter = Adapter::new();
        adapter.push(numbered(0, 4));
        adapter.push(numbered(4, 4));

        adapter.flush(2);
        assert_eq!(adapter.available(), 6);
        assert_eq!(adapter.buffer_count(), 2);

        adapter.flush(3);
        assert_eq!(adapter.available(), 3);
        assert_eq!(adapter.buffer_count(), 1);
        assert_eq!(&*adapter.peek(3).unwrap(), &[5, 6, 7]);
    }

    #[test]
    #[should_panic(expected = "flush exceeds available bytes")]
    fn test_flush_too_much_panics() {
        let mut adapter = Adapter::new();
        adapter.push(numbered(0, 4));
        adapter.flush(5);
    }

    #[test]
    fn test_peek_buffer_zero_copy_paths() {
        let parent = numbered(0, 8);
        let mut adapter = Adapter::new();
        adapter.push(parent.slice(0, 4));
        adapter.push(parent.slice(4, 4));
        adapter.flush(1);

        let inside = adapter.peek_buffer(2).unwrap();
        assert_eq!(inside.as_bytes(), &[1, 2]);

        let spanning = adapter.peek_buffer(6).unwrap();
        assert_eq!(spanning.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(
            spanning.as_bytes().as_ptr(),
            parent.as_bytes()[1..].as_ptr(),
            "adjacent views must merge without copying"
        );
    }

    #[test]
    fn test_take_buffer_copies_disjoint_memory() {
        let mut adapter = Adapter::new();
        adapter.push(numbered(0, 2));
        adapter.push(numbered(2, 2));

        let taken = adapter.take_buffer(3).unwrap();
        assert_eq!(taken.as_bytes(), &[0, 1, 2]);
        assert_eq!(adapter.available(), 1);
    }

    #[test]
    fn test_masked_scan() {
        let mut adapter = Adapter::new();
        adapter.push(Buffer::from_slice(&[0xff, 0x00, 0x00]));
        adapter.push(Buffer::from_slice(&[0x01, 0xb3, 0x00, 0x00, 0x01, 0xb8]));

        assert_eq!(
            adapter.masked_scan_u32(0xffff_ffff, 0x0000_01b3, 0, 9),
            Some(1)
        );
        assert_eq!(
            adapter.masked_scan_u32(0xffff_ff00, 0x0000_0100, 2, 7),
            Some(5)
        );
        assert_eq!(adapter.masked_scan_u32(0xffff_ffff, 0x0000_01b8, 0, 8), None);
    }

    #[test]
    fn test_prev_pts_tracking() {
        let mut adapter = Adapter::new();
        adapter.push(
            numbered(0, 10).with_metadata(Metadata::new().with_pts(Duration::from_millis(10))),
        );
        adapter.push(
            numbered(10, 10).with_metadata(Metadata::new().with_pts(Duration::from_millis(20))),
        );

        assert_eq!(adapter.prev_pts(), (Some(Duration::from_millis(10)), 0));
        adapter.flush(4);
        assert_eq!(adapter.prev_pts(), (Some(Duration::from_millis(10)), 4));
        adapter.flush(8);
        assert_eq!(adapter.prev_pts(), (Some(Duration::from_millis(20)), 2));

        adapter.clear();
        assert_eq!(adapter.prev_pts(), (None, 0));
        assert_eq!(adapter.available(), 0);
    }

    #[test]
    fn test_buf_impl() {
        let mut adapter = Adapter::new();
        adapter.push(Buffer::from_slice(&[0x00, 0x01]));
        adapter.push(Buffer::from_slice(&[0x02, 0x03, 0x04]));

        assert_eq!(adapter.chunk(), &[0x00, 0x01]);
        assert_eq!(adapter.get_u32(), 0x0001_0203);
        assert_eq!(adapter.remaining(), 1);
        assert_eq!(adapter.get_u8(), 0x04);
        assert!(!adapter.has_remaining());
    }
}
