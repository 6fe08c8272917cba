//! Built-in pipeline elements.
//!
//! A small set of elements covering both scheduling modes, useful for
//! assembling pipelines in tests and applications:
//!
//! ## Sources
//! - [`DataSrc`]: Serves inline data, pushed by a pad task or pulled by range
//!
//! ## Sinks
//! - [`AppSink`]: Extracts buffers to application code
//!
//! ## Transforms
//! - [`Identity`]: Passes buffers unchanged with an inspection callback
//! - [`Chunker`]: Re-slices a byte stream into fixed-size buffers
//!
//! ## Routing
//! - [`Tee`]: Duplicates buffers to multiple outputs (1-to-N fanout)

mod app;
mod flow;
mod identity;
mod testing;
mod transform;

// Sources
pub use testing::DataSrc;

// Sinks
pub use app::{AppSink, AppSinkHandle, AppSinkStats};

// Transforms
pub use identity::{BufferCallback, Identity};
pub use transform::Chunker;

// Routing
pub use flow::Tee;
