//! Flow results threaded through every push and pull data operation.
//!
//! Data-flow failures are values, never panics: `chain`, `push`, `create` and
//! `pull_range` all return a [`FlowResult`]. Errors are partitioned into a
//! fatal class (the producer must stop its task and report on the bus) and a
//! non-fatal class (EOS, flushing, an unlinked branch).
//!
//! # Combining results of several outgoing pads
//!
//! Whether `NotLinked` stops an element that feeds several pads is a policy
//! decision of that element. [`FlowCombiner`] implements the common policy:
//!
//! ```rust
//! use padflow::flow::{FlowCombiner, FlowError, FlowSuccess};
//! use padflow::pad::{Pad, PadDirection};
//!
//! let a = Pad::new("src_0", PadDirection::Src);
//! let b = Pad::new("src_1", PadDirection::Src);
//! let mut combiner = FlowCombiner::new();
//! combiner.add_pad(&a);
//! combiner.add_pad(&b);
//!
//! // One unlinked branch is tolerated.
//! combiner.update_pad_flow(&a, Err(FlowError::NotLinked));
//! assert_eq!(combiner.update_pad_flow(&b, Ok(FlowSuccess::Ok)), Ok(FlowSuccess::Ok));
//!
//! // All branches unlinked is reported.
//! assert_eq!(
//!     combiner.update_pad_flow(&b, Err(FlowError::NotLinked)),
//!     Err(FlowError::NotLinked)
//! );
//! ```

use crate::pad::Pad;
use std::fmt;

/// Successful flow outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowSuccess {
    /// Data was handled.
    #[default]
    Ok,
    /// Collaborator-defined success, passed through opaquely.
    CustomSuccess(u32),
}

/// Failed flow outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// End of stream: stop producing and report completion.
    Eos,
    /// The pad has no peer.
    NotLinked,
    /// The pad is flushing; a seek or state change is in progress.
    Flushing,
    /// The pad is not activated in the mode the call requires.
    WrongState,
    /// Formats could not be agreed on.
    NotNegotiated,
    /// The element does not implement the operation.
    NotSupported,
    /// Unrecoverable streaming error.
    Error,
    /// Collaborator-defined error, passed through opaquely.
    CustomError(u32),
}

/// Outcome of a data-flow operation.
pub type FlowResult = Result<FlowSuccess, FlowError>;

impl FlowError {
    /// Check if this error must stop the producing task and be reported on
    /// the bus.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FlowError::Error
                | FlowError::WrongState
                | FlowError::NotNegotiated
                | FlowError::NotSupported
                | FlowError::CustomError(_)
        )
    }

    /// Short lowercase name, used in log fields and bus messages.
    pub fn name(&self) -> &'static str {
        match self {
            FlowError::Eos => "eos",
            FlowError::NotLinked => "not-linked",
            FlowError::Flushing => "flushing",
            FlowError::WrongState => "wrong-state",
            FlowError::NotNegotiated => "not-negotiated",
            FlowError::NotSupported => "not-supported",
            FlowError::Error => "error",
            FlowError::CustomError(_) => "custom-error",
        }
    }

    /// Integer code of this error. Custom errors map to `-100 - n`.
    ///
    /// Returns `None` for a custom value whose code does not fit in an
    /// `i32`.
    pub fn code(&self) -> Option<i32> {
        let code = match self {
            FlowError::NotLinked => -1,
            FlowError::Flushing => -2,
            FlowError::Eos => -3,
            FlowError::NotNegotiated => -4,
            FlowError::Error => -5,
            FlowError::NotSupported => -6,
            FlowError::WrongState => -7,
            FlowError::CustomError(n) => -i32::try_from(*n).ok()?.checked_add(100)?,
        };
        Some(code)
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::CustomError(n) => write!(f, "custom-error({n})"),
            other => f.write_str(other.name()),
        }
    }
}

impl std::error::Error for FlowError {}

impl FlowSuccess {
    /// Integer code of this success. Custom successes map to `100 + n`.
    ///
    /// Returns `None` for a custom value whose code does not fit in an
    /// `i32`.
    pub fn code(&self) -> Option<i32> {
        match self {
            FlowSuccess::Ok => Some(0),
            FlowSuccess::CustomSuccess(n) => i32::try_from(*n).ok()?.checked_add(100),
        }
    }
}

/// Convert an integer flow code back into a [`FlowResult`].
///
/// Unknown codes in the reserved range map to [`FlowError::Error`].
pub fn flow_result_from_code(code: i32) -> FlowResult {
    match code {
        0 => Ok(FlowSuccess::Ok),
        c if c >= 100 => Ok(FlowSuccess::CustomSuccess((c - 100) as u32)),
        -1 => Err(FlowError::NotLinked),
        -2 => Err(FlowError::Flushing),
        -3 => Err(FlowError::Eos),
        -4 => Err(FlowError::NotNegotiated),
        -5 => Err(FlowError::Error),
        -6 => Err(FlowError::NotSupported),
        -7 => Err(FlowError::WrongState),
        c if c <= -100 => Err(FlowError::CustomError((-100 - c) as u32)),
        _ => Err(FlowError::Error),
    }
}

/// Integer code of a [`FlowResult`], `None` when a custom value is out of
/// range.
pub fn flow_result_code(result: FlowResult) -> Option<i32> {
    match result {
        Ok(success) => success.code(),
        Err(error) => error.code(),
    }
}

/// Combines the last flow result of several outgoing pads into one.
///
/// - Flushing and fatal errors are returned at once.
/// - `NotLinked` is returned only when every pad is not linked.
/// - `Eos` is returned only when every pad is EOS (or not linked).
/// - Otherwise the combined result is `Ok`.
#[derive(Debug, Default)]
pub struct FlowCombiner {
    pads: Vec<(Pad, FlowResult)>,
}

impl FlowCombiner {
    /// Create an empty combiner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a pad. Its last result starts as `Ok`.
    pub fn add_pad(&mut self, pad: &Pad) {
        if !self.pads.iter().any(|(p, _)| p == pad) {
            self.pads.push((pad.clone(), Ok(FlowSuccess::Ok)));
        }
    }

    /// Stop tracking a pad.
    pub fn remove_pad(&mut self, pad: &Pad) {
        self.pads.retain(|(p, _)| p != pad);
    }

    /// Number of tracked pads.
    pub fn len(&self) -> usize {
        self.pads.len()
    }

    /// Check if no pads are tracked.
    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }

    /// Reset every tracked pad's last result to `Ok` (after a flush).
    pub fn reset(&mut self) {
        for (_, result) in &mut self.pads {
            *result = Ok(FlowSuccess::Ok);
        }
    }

    /// Record `result` as the last result of `pad` and return the combined
    /// result.
    pub fn update_pad_flow(&mut self, pad: &Pad, result: FlowResult) -> FlowResult {
        if let Some((_, last)) = self.pads.iter_mut().find(|(p, _)| p == pad) {
            *last = result;
        }
        self.update_flow(result)
    }

    /// Combine `result` with the tracked per-pad results.
    pub fn update_flow(&self, result: FlowResult) -> FlowResult {
        if let Err(error) = result {
            if error == FlowError::Flushing || error.is_fatal() {
                return result;
            }
        }

        let mut all_not_linked = true;
        let mut all_eos = true;
        for (_, last) in &self.pads {
            match last {
                Err(error) if *error == FlowError::Flushing || error.is_fatal() => {
                    return *last;
                }
                Err(FlowError::NotLinked) => {}
                Err(FlowError::Eos) => all_not_linked = false,
                _ => {
                    all_not_linked = false;
                    all_eos = false;
                }
            }
        }

        if self.pads.is_empty() {
            return result;
        }
        if all_not_linked {
            Err(FlowError::NotLinked)
        } else if all_eos {
            Err(FlowError::Eos)
        } else {
            Ok(FlowSuccess::Ok)
        }
    }
}
