//! Application integration elements.
//!
//! - [`AppSink`]: Extracts buffers to application code

mod appsink;

pub use appsink::{AppSink, AppSinkHandle, AppSinkStats};
