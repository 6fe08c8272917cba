//! Transform elements.
//!
//! - [`Chunker`]: Re-slices a byte stream into fixed-size buffers

mod chunker;

pub use chunker::Chunker;
