//! # padflow
//!
//! A streaming media core built from elements connected through pads.
//!
//! Elements own pads; a source pad of one element links to a sink pad of
//! another, and data moves across the link either pushed downstream
//! ([`Pad::push`](pad::Pad::push) calling the peer's chain) or pulled
//! upstream ([`Pad::pull_range`](pad::Pad::pull_range) calling the peer's
//! create). Streaming threads are pad [`Task`](task::Task)s, serialized with
//! the data path through the pad's stream lock. Elements move through the
//! `Null -> Ready -> Paused -> Playing` state machine one step at a time,
//! and report to the application through a [`Bus`](bus::Bus).
//!
//! ## Features
//!
//! - **Zero-copy buffers**: reference-counted memory with copy-on-write
//! - **Adapter**: byte accumulator that re-slices a stream of buffers
//! - **Push and pull scheduling**: negotiated per link at activation
//! - **Events and queries**: flushing, segments, seeks, sticky events
//! - **Bus**: thread-safe message queue with sync handler, watch and stream
//! - **Observability**: `tracing` spans and `metrics` counters
//!
//! ## Quick Start
//!
//! ```rust
//! use padflow::prelude::*;
//! use padflow::elements::{AppSink, DataSrc};
//! use std::time::Duration;
//!
//! let pipeline = Pipeline::new("demo");
//! let sink = AppSink::new();
//! let output = sink.handle();
//!
//! pipeline.add(DataSrc::new(vec![7u8; 10_000]).with_blocksize(4096).into_element("src"))?;
//! pipeline.add(sink.into_element("sink"))?;
//! pipeline.link("src", "sink")?;
//!
//! pipeline.set_state(State::Playing)?;
//! pipeline.wait_eos(Some(Duration::from_secs(5)));
//! pipeline.set_state(State::Null)?;
//!
//! let total: usize = output.drain().iter().map(|b| b.len()).sum();
//! assert_eq!(total, 10_000);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod buffer;
pub mod bus;
pub mod element;
pub mod elements;
pub mod error;
pub mod event;
pub mod flow;
pub mod memory;
pub mod metadata;
pub mod observability;
pub mod pipeline;
pub mod query;
pub mod task;

pub use element::pad;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a holder panicked.
///
/// Every mutex in the crate guards state that stays consistent across a
/// panic in user callbacks, so poisoning is not treated as an error.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::adapter::Adapter;
    pub use crate::buffer::Buffer;
    pub use crate::bus::{Bus, Message, MessageType, MessageView};
    pub use crate::element::{Element, ElementImpl, State, StateChange, StateChangeSuccess};
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, SeekEvent, Segment, SegmentFormat};
    pub use crate::flow::{FlowError, FlowResult, FlowSuccess};
    pub use crate::metadata::Metadata;
    pub use crate::pad::{Pad, PadDirection, PadMode};
    pub use crate::pipeline::{Pipeline, PipelineConfig};
    pub use crate::query::Query;
}

pub use error::{Error, Result};
