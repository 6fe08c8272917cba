//! Synchronous request/response queries.
//!
//! A query is created by the asker, passed by `&mut` through
//! [`Pad::query`](crate::pad::Pad::query) and filled in by the first element
//! that can answer it. The call returns `true` when the query was answered.
//!
//! ```rust
//! use padflow::event::SegmentFormat;
//! use padflow::query::Query;
//!
//! let mut query = Query::new_duration(SegmentFormat::Bytes);
//! assert_eq!(query.duration(), None);
//!
//! // An element that knows the answer fills it in.
//! query.set_duration(4096);
//! assert_eq!(query.duration(), Some(4096));
//! ```

use crate::event::{SegmentFormat, TagList};
use std::time::Duration;

/// A query and, once answered, its result.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Current playback position.
    Position {
        /// Format the answer is wanted in.
        format: SegmentFormat,
        /// Answer.
        position: Option<u64>,
    },
    /// Total stream length.
    Duration {
        /// Format the answer is wanted in.
        format: SegmentFormat,
        /// Answer.
        duration: Option<u64>,
    },
    /// Whether and where the stream can seek.
    Seeking {
        /// Format of the range.
        format: SegmentFormat,
        /// Answer.
        seekable: bool,
        /// First seekable position.
        start: u64,
        /// Last seekable position, if bounded.
        end: Option<u64>,
    },
    /// Latency of the path to the source.
    Latency {
        /// Whether the path contains a live source.
        live: bool,
        /// Minimum latency.
        min: Duration,
        /// Maximum latency, `None` when unbounded.
        max: Option<Duration>,
    },
    /// Application-defined query.
    Custom {
        /// Query name.
        name: String,
        /// Request and response fields.
        data: TagList,
    },
}

impl Query {
    /// Ask for the current position.
    pub fn new_position(format: SegmentFormat) -> Self {
        Query::Position {
            format,
            position: None,
        }
    }

    /// Ask for the total length.
    pub fn new_duration(format: SegmentFormat) -> Self {
        Query::Duration {
            format,
            duration: None,
        }
    }

    /// Ask whether seeking is possible.
    pub fn new_seeking(format: SegmentFormat) -> Self {
        Query::Seeking {
            format,
            seekable: false,
            start: 0,
            end: None,
        }
    }

    /// Ask for the latency.
    pub fn new_latency() -> Self {
        Query::Latency {
            live: false,
            min: Duration::ZERO,
            max: None,
        }
    }

    /// Application-defined query.
    pub fn new_custom(name: impl Into<String>) -> Self {
        Query::Custom {
            name: name.into(),
            data: TagList::new(),
        }
    }

    /// Name of this query type.
    pub fn name(&self) -> &str {
        match self {
            Query::Position { .. } => "position",
            Query::Duration { .. } => "duration",
            Query::Seeking { .. } => "seeking",
            Query::Latency { .. } => "latency",
            Query::Custom { name, .. } => name,
        }
    }

    /// Requested format, for format-carrying queries.
    pub fn format(&self) -> Option<SegmentFormat> {
        match self {
            Query::Position { format, .. }
            | Query::Duration { format, .. }
            | Query::Seeking { format, .. } => Some(*format),
            _ => None,
        }
    }

    /// Position answer.
    pub fn position(&self) -> Option<u64> {
        match self {
            Query::Position { position, .. } => *position,
            _ => None,
        }
    }

    /// Answer a position query. Ignored for other query types.
    pub fn set_position(&mut self, value: u64) {
        if let Query::Position { position, .. } = self {
            *position = Some(value);
        }
    }

    /// Duration answer.
    pub fn duration(&self) -> Option<u64> {
        match self {
            Query::Duration { duration, .. } => *duration,
            _ => None,
        }
    }

    /// Answer a duration query. Ignored for other query types.
    pub fn set_duration(&mut self, value: u64) {
        if let Query::Duration { duration, .. } = self {
            *duration = Some(value);
        }
    }

    /// Answer a seeking query. Ignored for other query types.
    pub fn set_seeking(&mut self, can_seek: bool, range_start: u64, range_end: Option<u64>) {
        if let Query::Seeking {
            seekable,
            start,
            end,
            ..
        } = self
        {
            *seekable = can_seek;
            *start = range_start;
            *end = range_end;
        }
    }

    /// Seeking answer: whether the stream is seekable.
    pub fn is_seekable(&self) -> bool {
        matches!(self, Query::Seeking { seekable: true, .. })
    }

    /// Answer a latency query. Ignored for other query types.
    pub fn set_latency(&mut self, is_live: bool, min_latency: Duration, max_latency: Option<Duration>) {
        if let Query::Latency { live, min, max } = self {
            *live = is_live;
            *min = min_latency;
            *max = max_latency;
        }
    }

    /// Latency answer as `(live, min, max)`.
    pub fn latency(&self) -> Option<(bool, Duration, Option<Duration>)> {
        match self {
            Query::Latency { live, min, max } => Some((*live, *min, *max)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_ignore_other_kinds() {
        let mut query = Query::new_position(SegmentFormat::Time);
        query.set_duration(10);
        assert_eq!(query.duration(), None);
        assert_eq!(query.position(), None);

        query.set_position(5);
        assert_eq!(query.position(), Some(5));
        assert_eq!(query.format(), Some(SegmentFormat::Time));
    }

    #[test]
    fn test_seeking_and_latency() {
        let mut query = Query::new_seeking(SegmentFormat::Bytes);
        assert!(!query.is_seekable());
        query.set_seeking(true, 0, Some(100));
        assert!(query.is_seekable());

        let mut latency = Query::new_latency();
        latency.set_latency(true, Duration::from_millis(20), None);
        assert_eq!(
            latency.latency(),
            Some((true, Duration::from_millis(20), None))
        );
        assert_eq!(latency.name(), "latency");
    }
}
