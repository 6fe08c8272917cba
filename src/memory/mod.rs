//! Memory backends for buffers.
//!
//! - [`MemorySegment`]: trait for a contiguous region that buffers view
//! - [`HeapSegment`]: owned, writable heap memory
//! - [`BytesSegment`]: zero-copy, read-only view over [`bytes::Bytes`]
//!
//! Segments are always shared behind an `Arc`. Mutable access requires the
//! only reference, which is what lets [`Buffer`](crate::buffer::Buffer)
//! implement copy-on-write.

mod heap;
mod segment;
mod shared;

pub use heap::HeapSegment;
pub use segment::{MemorySegment, MemoryType};
pub use shared::BytesSegment;
