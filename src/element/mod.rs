//! Elements: named processing nodes owning pads and a lifecycle state.
//!
//! An [`Element`] pairs an [`ElementImpl`] with its [`Pad`]s and a state
//! machine. [`Element::set_state`] walks to the target state one adjacent
//! step at a time, and each step does fixed work on the pads:
//!
//! | Step | Pad work |
//! |------|----------|
//! | `NullToReady` | none |
//! | `ReadyToPaused` | activate source pads, then sink pads |
//! | `PausedToPlaying` | start bound tasks |
//! | `PlayingToPaused` | pause tasks |
//! | `PausedToReady` | deactivate sink pads, then source pads (stops tasks) |
//! | `ReadyToNull` | none |
//!
//! The element's [`change_state`](ElementImpl::change_state) hook runs before
//! the pad work and [`post_change_state`](ElementImpl::post_change_state)
//! after it. Every committed step posts a `StateChanged` message. A failing
//! step leaves the element in the last state it reached.
//!
//! An element may have children (a [`Pipeline`](crate::pipeline::Pipeline)
//! does). Children take each step before the parent's own pads, ordered
//! from sinks to sources.

mod context;
pub mod pad;
mod state;
mod traits;

pub use context::{PipelineContext, PipelineHook};
pub use pad::{Pad, PadDirection, PadMode};
pub use state::{State, StateChange, StateChangeResult, StateChangeSuccess};
pub use traits::{AsAny, ElementImpl};

use crate::bus::{ErrorInfo, Message, MessageView};
use crate::error::{Error, Result, StateChangeError};
use crate::event::Event;
use crate::lock;
use crate::observability::{span_element, trace_state_change};
use crate::query::Query;
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{Span, debug, error, warn};

#[derive(Debug, Clone, Copy, Default)]
struct StateRecord {
    current: State,
    pending: Option<State>,
}

pub(crate) struct ElementInner {
    name: String,
    imp: Box<dyn ElementImpl>,
    pads: RwLock<SmallVec<[Pad; 4]>>,
    children: RwLock<Vec<Element>>,
    state: Mutex<StateRecord>,
    /// Serializes `set_state` calls.
    state_lock: Mutex<()>,
    context: RwLock<Option<Arc<PipelineContext>>>,
}

/// An element. Cloning yields another handle to the same element.
#[derive(Clone)]
pub struct Element {
    pub(crate) inner: Arc<ElementInner>,
}

impl Element {
    /// Create an element in the `Null` state without pads.
    pub fn new(name: impl Into<String>, imp: impl ElementImpl) -> Self {
        Self {
            inner: Arc::new(ElementInner {
                name: name.into(),
                imp: Box::new(imp),
                pads: RwLock::new(SmallVec::new()),
                children: RwLock::new(Vec::new()),
                state: Mutex::new(StateRecord::default()),
                state_lock: Mutex::new(()),
                context: RwLock::new(None),
            }),
        }
    }

    /// Name of the element.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Behavior of the element.
    pub fn imp(&self) -> &dyn ElementImpl {
        self.inner.imp.as_ref()
    }

    /// Behavior of the element as its concrete type.
    pub fn downcast_ref<T: ElementImpl>(&self) -> Option<&T> {
        self.imp().as_any().downcast_ref::<T>()
    }

    // ========================================================================
    // Pads
    // ========================================================================

    /// Add `pad` to the element.
    ///
    /// A pad added while the element is paused or playing is activated
    /// right away.
    pub fn add_pad(&self, pad: Pad) -> Result<()> {
        if pad.has_parent() {
            return Err(Error::PadHasParent(pad.name().to_string()));
        }
        {
            let mut pads = self.write_pads();
            if pads.iter().any(|p| p.name() == pad.name()) {
                return Err(Error::DuplicatePad(pad.name().to_string()));
            }
            pad.set_parent(Arc::downgrade(&self.inner));
            pads.push(pad.clone());
        }
        debug!(element = %self.name(), pad = %pad.name(), "pad added");

        if self.current_state() >= State::Paused && !pad.is_active() {
            self.imp().activate(self, &pad)?;
        }
        Ok(())
    }

    /// Remove `pad` from the element, deactivating and unlinking it.
    pub fn remove_pad(&self, pad: &Pad) -> bool {
        let removed = {
            let mut pads = self.write_pads();
            match pads.iter().position(|p| p == pad) {
                Some(index) => {
                    pads.remove(index);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return false;
        }

        if let Err(e) = pad.activate(PadMode::Inactive) {
            warn!(pad = %pad.debug_name(), error = %e, "failed to deactivate removed pad");
        }
        if let Some(peer) = pad.peer() {
            match pad.direction() {
                PadDirection::Src => pad.unlink(&peer),
                PadDirection::Sink => peer.unlink(pad),
            };
        }
        pad.set_parent(std::sync::Weak::new());
        debug!(element = %self.name(), pad = %pad.name(), "pad removed");
        true
    }

    /// Ask the element for a new pad and add it.
    pub fn request_pad(&self, direction: PadDirection) -> Result<Pad> {
        let pad = self.imp().request_pad(self, direction).ok_or_else(|| {
            Error::PadNotFound(format!("{}: no {direction:?} pad on request", self.name()))
        })?;
        self.add_pad(pad.clone())?;
        Ok(pad)
    }

    /// All pads, in insertion order.
    pub fn pads(&self) -> Vec<Pad> {
        self.read_pads().to_vec()
    }

    /// Source pads, in insertion order.
    pub fn src_pads(&self) -> Vec<Pad> {
        self.pads_in(PadDirection::Src)
    }

    /// Sink pads, in insertion order.
    pub fn sink_pads(&self) -> Vec<Pad> {
        self.pads_in(PadDirection::Sink)
    }

    /// The pad named `name`.
    pub fn static_pad(&self, name: &str) -> Option<Pad> {
        self.read_pads().iter().find(|p| p.name() == name).cloned()
    }

    fn pads_in(&self, direction: PadDirection) -> Vec<Pad> {
        self.read_pads()
            .iter()
            .filter(|p| p.direction() == direction)
            .cloned()
            .collect()
    }

    fn read_pads(&self) -> std::sync::RwLockReadGuard<'_, SmallVec<[Pad; 4]>> {
        self.inner.pads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_pads(&self) -> std::sync::RwLockWriteGuard<'_, SmallVec<[Pad; 4]>> {
        self.inner.pads.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Children and context
    // ========================================================================

    /// Child elements, in insertion order.
    pub fn children(&self) -> Vec<Element> {
        self.inner
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn add_child(&self, child: Element) {
        if let Some(ctx) = self.context() {
            child.set_context(Some(ctx));
        }
        self.inner
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(child);
    }

    pub(crate) fn remove_child(&self, name: &str) -> Option<Element> {
        let mut children = self
            .inner
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let index = children.iter().position(|c| c.name() == name)?;
        let child = children.remove(index);
        drop(children);
        child.set_context(None);
        Some(child)
    }

    /// Children ordered from sinks to sources.
    ///
    /// A child comes after every child it pushes to. Children in a cycle
    /// keep insertion order.
    pub fn sorted_children(&self) -> Vec<Element> {
        let mut remaining = self.children();
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<Element>, Vec<Element>) =
                remaining.iter().cloned().partition(|child| {
                    child
                        .downstream_elements()
                        .iter()
                        .all(|down| down == child || !remaining.contains(down))
                });
            if ready.is_empty() {
                ordered.extend(blocked);
                break;
            }
            ordered.extend(ready);
            remaining = blocked;
        }
        ordered
    }

    fn downstream_elements(&self) -> Vec<Element> {
        self.src_pads()
            .iter()
            .filter_map(Pad::peer)
            .filter_map(|peer| peer.parent())
            .collect()
    }

    /// Pipeline context, if the element belongs to a pipeline.
    pub fn context(&self) -> Option<Arc<PipelineContext>> {
        self.inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_context(&self, context: Option<Arc<PipelineContext>>) {
        for child in self.children() {
            child.set_context(context.clone());
        }
        *self
            .inner
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner) = context;
    }

    // ========================================================================
    // State machine
    // ========================================================================

    /// Current state.
    pub fn current_state(&self) -> State {
        lock(&self.inner.state).current
    }

    /// Current state and the target of an ongoing `set_state`, if any.
    pub fn state(&self) -> (State, Option<State>) {
        let record = *lock(&self.inner.state);
        (record.current, record.pending)
    }

    /// Walk to `target` through every adjacent state in between.
    ///
    /// Returns `NoPreroll` if any step did. On failure the element stays in
    /// the last state it reached and the error records that state.
    pub fn set_state(&self, target: State) -> StateChangeResult {
        let _serialized = lock(&self.inner.state_lock);
        let mut outcome = StateChangeSuccess::Success;

        loop {
            let current = self.current_state();
            let next = current.step_towards(target);
            let Some(transition) = StateChange::from_states(current, next) else {
                break;
            };

            lock(&self.inner.state).pending = Some(target);
            let step = self.change_state(transition);
            if let Some(ctx) = self.context() {
                ctx.notify_state_change(self, transition, &step);
            }

            match step {
                Ok(success) => {
                    outcome = outcome.merge(success);
                    let pending = (next != target).then_some(target);
                    {
                        let mut record = lock(&self.inner.state);
                        record.current = next;
                        record.pending = pending;
                    }
                    trace_state_change(self.name(), current.name(), next.name());
                    self.post_message(MessageView::StateChanged {
                        old: current,
                        new: next,
                        pending,
                    });
                }
                Err(mut e) => {
                    lock(&self.inner.state).pending = None;
                    e.current = current;
                    error!(element = %self.name(), %transition, reason = %e.reason, "state change failed");
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    /// Perform a single step without committing the new state.
    ///
    /// Runs the element's pre-hook, the children, the pad work and the
    /// post-hook. [`set_state`](Self::set_state) calls this once per step.
    pub fn change_state(&self, transition: StateChange) -> StateChangeResult {
        let span = self.state_span(transition);
        let _entered = span.as_ref().map(Span::enter);
        debug!(element = %self.name(), %transition, "changing state");

        let mut outcome = self.imp().change_state(self, transition)?;

        for child in self.sorted_children() {
            let child_outcome = child.set_state(transition.next()).map_err(|e| {
                StateChangeError::new(
                    self.name(),
                    transition,
                    format!("child {} failed: {}", e.element, e.reason),
                )
            })?;
            outcome = outcome.merge(child_outcome);
        }

        match transition {
            StateChange::ReadyToPaused => self.activate_pads(transition)?,
            StateChange::PausedToPlaying => self.start_tasks(transition)?,
            StateChange::PlayingToPaused => self.pause_tasks(),
            StateChange::PausedToReady => self.deactivate_pads(),
            StateChange::NullToReady | StateChange::ReadyToNull => {}
        }

        let post = self.imp().post_change_state(self, transition)?;
        Ok(outcome.merge(post))
    }

    fn state_span(&self, transition: StateChange) -> Option<Span> {
        let enabled = self
            .context()
            .is_none_or(|ctx| ctx.config().tracing.state_spans);
        enabled.then(|| span_element(self.name(), &transition.to_string()))
    }

    fn activate_pads(&self, transition: StateChange) -> std::result::Result<(), StateChangeError> {
        let pads = self.pads();
        let ordered = pads
            .iter()
            .filter(|p| p.direction() == PadDirection::Src)
            .chain(pads.iter().filter(|p| p.direction() == PadDirection::Sink));

        for pad in ordered {
            // Pads already pulled into a mode by their peer keep it.
            if pad.is_active() {
                continue;
            }
            if let Err(e) = self.imp().activate(self, pad) {
                for pad in &pads {
                    if let Err(e) = pad.activate(PadMode::Inactive) {
                        warn!(pad = %pad.debug_name(), error = %e, "pad deactivation failed");
                    }
                }
                return Err(StateChangeError::new(
                    self.name(),
                    transition,
                    e.to_string(),
                ));
            }
        }
        Ok(())
    }

    fn deactivate_pads(&self) {
        let pads = self.pads();
        let ordered = pads
            .iter()
            .filter(|p| p.direction() == PadDirection::Sink)
            .chain(pads.iter().filter(|p| p.direction() == PadDirection::Src));

        for pad in ordered {
            if let Err(e) = pad.activate(PadMode::Inactive) {
                warn!(pad = %pad.debug_name(), error = %e, "pad deactivation failed");
            }
        }
    }

    fn start_tasks(&self, transition: StateChange) -> std::result::Result<(), StateChangeError> {
        for pad in self.pads() {
            pad.resume_task().map_err(|e| {
                StateChangeError::new(self.name(), transition, e.to_string())
            })?;
        }
        Ok(())
    }

    fn pause_tasks(&self) {
        for pad in self.pads() {
            pad.pause_task();
        }
    }

    // ========================================================================
    // Messages, events and queries
    // ========================================================================

    /// Post a message from this element on the pipeline bus.
    ///
    /// Returns `false` if the element has no pipeline or the bus refused the
    /// message.
    pub fn post_message(&self, view: MessageView) -> bool {
        let Some(ctx) = self.context() else {
            return false;
        };
        let message = Message::new(Some(self.name()), view);
        ctx.notify_message(&message);
        ctx.bus().post(message)
    }

    /// Post an Error message.
    pub fn post_error(&self, info: ErrorInfo) -> bool {
        error!(element = %self.name(), error = %info, "posting error");
        self.post_message(MessageView::Error(info))
    }

    /// Send `event` into the element.
    ///
    /// Upstream events leave through the first sink pad and downstream events
    /// through the first source pad. An element with children delivers
    /// upstream events to its sink children and downstream events to its
    /// source children instead.
    pub fn send_event(&self, event: Event) -> bool {
        let children = self.children();
        if !children.is_empty() {
            let mut handled = false;
            for child in children {
                let edge = if event.is_upstream() {
                    child.src_pads().is_empty()
                } else {
                    child.sink_pads().is_empty()
                };
                if edge {
                    handled |= child.send_event(event.clone());
                }
            }
            return handled;
        }

        let pad = if event.is_upstream() {
            self.sink_pads().into_iter().next()
        } else {
            self.src_pads().into_iter().next()
        };
        match pad {
            Some(pad) => pad.push_event(event),
            None => false,
        }
    }

    /// Answer `query` on behalf of the element.
    ///
    /// Asks the element's first source pad, or the peer of its first sink
    /// pad. An element with children asks its sink children.
    pub fn query(&self, query: &mut Query) -> bool {
        let children = self.children();
        if !children.is_empty() {
            return children
                .iter()
                .filter(|child| child.src_pads().is_empty())
                .any(|child| child.query(query));
        }

        if let Some(src) = self.src_pads().into_iter().next() {
            return src.query(query);
        }
        self.sink_pads()
            .into_iter()
            .next()
            .is_some_and(|sink| sink.peer_query(query))
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (current, pending) = self.state();
        f.debug_struct("Element")
            .field("name", &self.inner.name)
            .field("state", &current)
            .field("pending", &pending)
            .field("pads", &self.read_pads().len())
            .field("children", &self.children().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, MessageType};
    use crate::pipeline::PipelineConfig;

    #[derive(Default)]
    struct Journal {
        steps: Mutex<Vec<StateChange>>,
        fail_on: Option<StateChange>,
    }

    impl ElementImpl for Journal {
        fn change_state(&self, element: &Element, transition: StateChange) -> StateChangeResult {
            if self.fail_on == Some(transition) {
                return Err(StateChangeError::new(element.name(), transition, "refused"));
            }
            self.steps.lock().unwrap().push(transition);
            Ok(StateChangeSuccess::Success)
        }
    }

    fn with_bus(element: &Element) -> Bus {
        let bus = Bus::new("test");
        let ctx = Arc::new(PipelineContext::new(bus.clone(), PipelineConfig::default()));
        element.set_context(Some(ctx));
        bus
    }

    #[test]
    fn test_set_state_visits_every_step() {
        let element = Element::new("journal", Journal::default());
        let bus = with_bus(&element);

        assert_eq!(element.set_state(State::Playing), Ok(StateChangeSuccess::Success));
        assert_eq!(element.state(), (State::Playing, None));
        assert_eq!(element.set_state(State::Null), Ok(StateChangeSuccess::Success));

        let journal = element.downcast_ref::<Journal>().unwrap();
        assert_eq!(
            *journal.steps.lock().unwrap(),
            vec![
                StateChange::NullToReady,
                StateChange::ReadyToPaused,
                StateChange::PausedToPlaying,
                StateChange::PlayingToPaused,
                StateChange::PausedToReady,
                StateChange::ReadyToNull,
            ]
        );

        let first = bus.pop_filtered(MessageType::STATE_CHANGED).unwrap();
        assert_eq!(
            first.view(),
            &MessageView::StateChanged {
                old: State::Null,
                new: State::Ready,
                pending: Some(State::Playing),
            }
        );
        assert_eq!(bus.len(), 5);
    }

    #[test]
    fn test_failed_step_keeps_reached_state() {
        let element = Element::new(
            "journal",
            Journal {
                fail_on: Some(StateChange::PausedToPlaying),
                ..Default::default()
            },
        );
        let err = element.set_state(State::Playing).unwrap_err();
        assert_eq!(err.transition, StateChange::PausedToPlaying);
        assert_eq!(err.current, State::Paused);
        assert_eq!(element.state(), (State::Paused, None));
    }

    #[test]
    fn test_pads_follow_state() {
        struct Plain;
        impl ElementImpl for Plain {}

        let element = Element::new("plain", Plain);
        let src = Pad::src();
        element.add_pad(src.clone()).unwrap();
        assert!(matches!(element.add_pad(Pad::src()), Err(Error::DuplicatePad(_))));
        assert!(matches!(element.add_pad(src.clone()), Err(Error::PadHasParent(_))));

        element.set_state(State::Paused).unwrap();
        assert_eq!(src.mode(), PadMode::Push);

        let late = Pad::new("late", PadDirection::Sink);
        element.add_pad(late.clone()).unwrap();
        assert_eq!(late.mode(), PadMode::Push);

        element.set_state(State::Ready).unwrap();
        assert_eq!(src.mode(), PadMode::Inactive);
        assert_eq!(late.mode(), PadMode::Inactive);

        assert!(element.remove_pad(&late));
        assert!(element.static_pad("late").is_none());
        assert!(late.parent().is_none());
    }

    #[test]
    fn test_post_without_context() {
        struct Plain;
        impl ElementImpl for Plain {}
        let element = Element::new("lonely", Plain);
        assert!(!element.post_message(MessageView::Eos));
    }
}
