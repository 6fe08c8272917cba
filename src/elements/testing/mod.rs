//! Test and utility source elements.
//!
//! - [`DataSrc`]: Serves buffers from inline data in push or pull mode

mod datasrc;

pub use datasrc::DataSrc;
