//! Flow routing elements.
//!
//! - [`Tee`]: 1-to-N fanout (duplicates buffers)

mod tee;

pub use tee::Tee;
