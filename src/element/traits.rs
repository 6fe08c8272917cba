//! Core element trait.
//!
//! An element's behavior is an [`ElementImpl`]: a set of hooks the pads and
//! the state machine call into. Every hook has a default, so a pass-through
//! or a pure sink only overrides what it needs.

use crate::buffer::Buffer;
use crate::element::{Element, StateChange, StateChangeResult, StateChangeSuccess};
use crate::error::ActivationError;
use crate::event::Event;
use crate::flow::{FlowError, FlowResult};
use crate::pad::{Pad, PadDirection, PadMode};
use crate::query::Query;
use std::any::Any;

/// Upcast to [`Any`], implemented for every `'static` type.
pub trait AsAny {
    /// `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Element behavior.
///
/// Hooks receive the [`Element`] they belong to and, for pad hooks, the pad
/// the call arrived on. Data hooks run on streaming threads under that pad's
/// stream lock; state hooks run on the thread calling
/// [`Element::set_state`].
///
/// # Example
///
/// ```rust
/// use padflow::buffer::Buffer;
/// use padflow::element::{Element, ElementImpl};
/// use padflow::flow::{FlowResult, FlowSuccess};
/// use padflow::pad::Pad;
///
/// struct Discard;
///
/// impl ElementImpl for Discard {
///     fn chain(&self, _element: &Element, _pad: &Pad, _buffer: Buffer) -> FlowResult {
///         Ok(FlowSuccess::Ok)
///     }
/// }
///
/// let sink = Element::new("discard", Discard);
/// sink.add_pad(Pad::sink()).unwrap();
/// ```
pub trait ElementImpl: AsAny + Send + Sync + 'static {
    /// Handle a buffer arriving on a sink pad in push mode.
    fn chain(&self, element: &Element, pad: &Pad, buffer: Buffer) -> FlowResult {
        let _ = (element, pad, buffer);
        Err(FlowError::NotSupported)
    }

    /// Produce up to `size` bytes at `offset` for a source pad in pull mode.
    ///
    /// A short buffer is allowed near the end of the data; `Eos` past it.
    fn create(
        &self,
        element: &Element,
        pad: &Pad,
        offset: u64,
        size: u32,
    ) -> Result<Buffer, FlowError> {
        let _ = (element, pad, offset, size);
        Err(FlowError::NotSupported)
    }

    /// Handle an event arriving on `pad`.
    fn event(&self, element: &Element, pad: &Pad, event: Event) -> bool {
        let _ = element;
        pad.event_default(event)
    }

    /// Answer a query arriving on `pad`.
    fn query(&self, element: &Element, pad: &Pad, query: &mut Query) -> bool {
        let _ = element;
        pad.query_default(query)
    }

    /// Called before the element's own pads take `transition`.
    fn change_state(&self, element: &Element, transition: StateChange) -> StateChangeResult {
        let _ = (element, transition);
        Ok(StateChangeSuccess::Success)
    }

    /// Called after the element's pads took `transition`.
    fn post_change_state(&self, element: &Element, transition: StateChange) -> StateChangeResult {
        let _ = (element, transition);
        Ok(StateChangeSuccess::Success)
    }

    /// Create a pad on request, for elements with a variable number of pads.
    ///
    /// The returned pad is added to the element by the caller.
    fn request_pad(&self, element: &Element, direction: PadDirection) -> Option<Pad> {
        let _ = (element, direction);
        None
    }

    /// Choose a scheduling mode for `pad` and activate it.
    ///
    /// Called on READY to PAUSED for each pad that is still inactive.
    fn activate(&self, element: &Element, pad: &Pad) -> Result<(), ActivationError> {
        let _ = element;
        pad.activate(PadMode::Push)
    }

    /// Accept or refuse `mode` on `pad`, and set up or tear down what the
    /// mode needs, typically a streaming task.
    ///
    /// Pull mode is refused by default.
    fn activate_mode(
        &self,
        element: &Element,
        pad: &Pad,
        mode: PadMode,
        active: bool,
    ) -> Result<(), ActivationError> {
        let _ = element;
        if active && mode == PadMode::Pull {
            return Err(ActivationError::ModeNotSupported {
                pad: pad.debug_name(),
                mode,
            });
        }
        Ok(())
    }
}
