//! Pads: the directional data and control ports of elements.
//!
//! A source pad pushes buffers to, or is pulled from by, the sink pad it is
//! linked to. Every pad has a three-state activation mode:
//!
//! | Mode | Data entry point | Who drives |
//! |------|------------------|------------|
//! | [`PadMode::Inactive`] | none, data calls fail with `WrongState` | nobody |
//! | [`PadMode::Push`] | [`Pad::chain`] on the sink pad | upstream pushes |
//! | [`PadMode::Pull`] | [`Pad::create`] on the source pad | downstream pulls |
//!
//! Streaming on a pad is serialized by its stream lock: `chain`, `create`,
//! serialized events and every iteration of the pad's [`Task`] hold it.
//!
//! Links are weak in both directions, and a pad refers to its element
//! weakly, so tearing down one element never dangles another.

use crate::buffer::Buffer;
use crate::bus::{ErrorCode, ErrorDomain, ErrorInfo, MessageView, StreamStatusType};
use crate::element::{Element, ElementInner};
use crate::error::{ActivationError, PadLinkError, TaskError};
use crate::event::{Event, Segment};
use crate::flow::{FlowError, FlowResult, FlowSuccess};
use crate::lock;
use crate::observability::{PadMetrics, record_flow_error};
use crate::query::Query;
use crate::task::{StreamLock, Task, TaskConfig, TaskContext, TaskState};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};
use std::thread;
use tracing::{debug, error, trace, warn};

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Produces data; linked to a downstream sink pad.
    Src,
    /// Consumes data; linked to an upstream source pad.
    Sink,
}

impl PadDirection {
    /// The other direction.
    pub fn opposite(self) -> Self {
        match self {
            PadDirection::Src => PadDirection::Sink,
            PadDirection::Sink => PadDirection::Src,
        }
    }
}

/// Scheduling mode of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PadMode {
    /// Not streaming.
    #[default]
    Inactive,
    /// Upstream pushes buffers into the sink pad.
    Push,
    /// Downstream pulls byte ranges from the source pad.
    Pull,
}

pub(crate) struct PadInner {
    name: String,
    direction: PadDirection,
    parent: RwLock<Weak<ElementInner>>,
    peer: Mutex<Weak<PadInner>>,
    mode: Mutex<PadMode>,
    /// Serializes activation of this pad.
    activation: Mutex<()>,
    flushing: AtomicBool,
    eos: AtomicBool,
    sticky: Mutex<Vec<Event>>,
    stream_lock: StreamLock,
    task: Mutex<Option<Task>>,
    metrics: OnceLock<PadMetrics>,
}

/// A pad. Cloning yields another handle to the same pad.
#[derive(Clone)]
pub struct Pad {
    pub(crate) inner: Arc<PadInner>,
}

impl Pad {
    /// Create an inactive, unlinked pad.
    pub fn new(name: impl Into<String>, direction: PadDirection) -> Self {
        Self {
            inner: Arc::new(PadInner {
                name: name.into(),
                direction,
                parent: RwLock::new(Weak::new()),
                peer: Mutex::new(Weak::new()),
                mode: Mutex::new(PadMode::Inactive),
                activation: Mutex::new(()),
                flushing: AtomicBool::new(true),
                eos: AtomicBool::new(false),
                sticky: Mutex::new(Vec::new()),
                stream_lock: Arc::new(Mutex::new(())),
                task: Mutex::new(None),
                metrics: OnceLock::new(),
            }),
        }
    }

    /// Create a source pad named "src".
    pub fn src() -> Self {
        Self::new("src", PadDirection::Src)
    }

    /// Create a sink pad named "sink".
    pub fn sink() -> Self {
        Self::new("sink", PadDirection::Sink)
    }

    /// Name of the pad, unique within its element.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Direction of the pad.
    pub fn direction(&self) -> PadDirection {
        self.inner.direction
    }

    /// `element:pad`, for logs.
    pub fn debug_name(&self) -> String {
        match self.parent() {
            Some(element) => format!("{}:{}", element.name(), self.inner.name),
            None => format!("<none>:{}", self.inner.name),
        }
    }

    /// Element owning this pad.
    pub fn parent(&self) -> Option<Element> {
        self.inner
            .parent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
            .map(|inner| Element { inner })
    }

    pub(crate) fn set_parent(&self, parent: Weak<ElementInner>) {
        *self
            .inner
            .parent
            .write()
            .unwrap_or_else(PoisonError::into_inner) = parent;
    }

    pub(crate) fn has_parent(&self) -> bool {
        self.inner
            .parent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .strong_count()
            > 0
    }

    /// The linked pad.
    pub fn peer(&self) -> Option<Pad> {
        lock(&self.inner.peer).upgrade().map(|inner| Pad { inner })
    }

    /// Check if the pad has a peer.
    pub fn is_linked(&self) -> bool {
        lock(&self.inner.peer).strong_count() > 0
    }

    /// Current activation mode.
    pub fn mode(&self) -> PadMode {
        *lock(&self.inner.mode)
    }

    /// Check if the pad is active in any mode.
    pub fn is_active(&self) -> bool {
        self.mode() != PadMode::Inactive
    }

    /// Check if the pad refuses data because of a flush or deactivation.
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::Acquire)
    }

    /// Check if the pad received end-of-stream since the last flush.
    pub fn is_eos(&self) -> bool {
        self.inner.eos.load(Ordering::Acquire)
    }

    /// Sticky events received so far. Flush-stop drops the segment and EOS.
    pub fn sticky_events(&self) -> Vec<Event> {
        lock(&self.inner.sticky).clone()
    }

    /// The sticky segment, if one was received.
    pub fn segment(&self) -> Option<Segment> {
        lock(&self.inner.sticky).iter().find_map(|event| match event {
            Event::Segment(segment) => Some(segment.clone()),
            _ => None,
        })
    }

    /// Take the stream lock.
    ///
    /// Blocks while a streaming call or a task iteration is running on this
    /// pad. Control code that mutates per-pad streaming state holds it.
    pub fn stream_lock(&self) -> MutexGuard<'_, ()> {
        lock(&self.inner.stream_lock)
    }

    // ========================================================================
    // Linking
    // ========================================================================

    /// Link this source pad to `sink`.
    pub fn link(&self, sink: &Pad) -> Result<(), PadLinkError> {
        if self.direction() != PadDirection::Src || sink.direction() != PadDirection::Sink {
            return Err(PadLinkError::WrongDirection);
        }
        let (Some(src_parent), Some(sink_parent)) = (self.parent(), sink.parent()) else {
            return Err(PadLinkError::NoParent);
        };
        if src_parent == sink_parent {
            return Err(PadLinkError::SameElement);
        }

        let mut src_peer = lock(&self.inner.peer);
        let mut sink_peer = lock(&sink.inner.peer);
        if src_peer.strong_count() > 0 || sink_peer.strong_count() > 0 {
            return Err(PadLinkError::WasLinked);
        }
        *src_peer = Arc::downgrade(&sink.inner);
        *sink_peer = Arc::downgrade(&self.inner);
        drop(sink_peer);
        drop(src_peer);

        debug!(src = %self.debug_name(), sink = %sink.debug_name(), "pads linked");
        Ok(())
    }

    /// Undo [`link`](Self::link). Returns `false` if the pads were not linked
    /// to each other.
    pub fn unlink(&self, sink: &Pad) -> bool {
        if self.direction() != PadDirection::Src {
            return false;
        }
        let mut src_peer = lock(&self.inner.peer);
        let mut sink_peer = lock(&sink.inner.peer);
        let linked = src_peer.ptr_eq(&Arc::downgrade(&sink.inner))
            && sink_peer.ptr_eq(&Arc::downgrade(&self.inner));
        if linked {
            *src_peer = Weak::new();
            *sink_peer = Weak::new();
            debug!(src = %self.inner.name, sink = %sink.inner.name, "pads unlinked");
        }
        linked
    }

    // ========================================================================
    // Activation
    // ========================================================================

    /// Switch the pad to `mode`.
    ///
    /// Changing between two active modes passes through
    /// [`PadMode::Inactive`]. Activating a sink pad in pull mode first
    /// activates its peer in pull mode. The element's
    /// [`activate_mode`](crate::element::ElementImpl::activate_mode) hook may
    /// refuse the mode, which leaves the pad inactive.
    pub fn activate(&self, mode: PadMode) -> Result<(), ActivationError> {
        let _activation = lock(&self.inner.activation);
        let old = self.mode();
        if old == mode {
            return Ok(());
        }
        if old != PadMode::Inactive {
            self.deactivate(old)?;
        }
        if mode == PadMode::Inactive {
            return Ok(());
        }

        let pulls_from_peer = mode == PadMode::Pull && self.direction() == PadDirection::Sink;
        if pulls_from_peer {
            let peer = self
                .peer()
                .ok_or_else(|| ActivationError::NotLinked(self.debug_name()))?;
            peer.activate(PadMode::Pull)?;
        }

        *lock(&self.inner.mode) = mode;
        self.inner.flushing.store(false, Ordering::Release);

        if let Some(element) = self.parent() {
            if let Err(e) = element.imp().activate_mode(&element, self, mode, true) {
                warn!(pad = %self.debug_name(), ?mode, error = %e, "activation refused");
                self.inner.flushing.store(true, Ordering::Release);
                *lock(&self.inner.mode) = PadMode::Inactive;
                if pulls_from_peer {
                    if let Some(peer) = self.peer() {
                        if let Err(e) = peer.activate(PadMode::Inactive) {
                            warn!(pad = %peer.debug_name(), error = %e, "peer deactivation failed");
                        }
                    }
                }
                return Err(e);
            }
        }

        debug!(pad = %self.debug_name(), ?mode, "pad activated");
        Ok(())
    }

    fn deactivate(&self, old: PadMode) -> Result<(), ActivationError> {
        self.inner.flushing.store(true, Ordering::Release);

        let hook = match self.parent() {
            Some(element) => element.imp().activate_mode(&element, self, old, false),
            None => Ok(()),
        };

        let on_task_thread = lock(&self.inner.task)
            .as_ref()
            .and_then(Task::thread_id)
            .is_some_and(|id| id == thread::current().id());
        if let Err(e) = self.stop_task() {
            warn!(pad = %self.debug_name(), error = %e, "failed to stop pad task");
        }

        // Wait for a streaming call from another thread to leave the pad.
        // The pad's own task holds the stream lock for its running iteration.
        if !on_task_thread {
            drop(self.stream_lock());
        }
        *lock(&self.inner.mode) = PadMode::Inactive;

        if old == PadMode::Pull && self.direction() == PadDirection::Sink {
            if let Some(peer) = self.peer() {
                peer.activate(PadMode::Inactive)?;
            }
        }

        debug!(pad = %self.debug_name(), ?old, "pad deactivated");
        hook
    }

    // ========================================================================
    // Data flow
    // ========================================================================

    /// Push-mode data entry of a sink pad.
    ///
    /// Runs the element's chain handler under the stream lock. The buffer is
    /// handed over to the element.
    pub fn chain(&self, buffer: Buffer) -> FlowResult {
        if self.direction() != PadDirection::Sink {
            return Err(FlowError::NotSupported);
        }
        if self.mode() != PadMode::Push {
            return Err(FlowError::WrongState);
        }
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }

        let _stream = self.stream_lock();
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }
        if self.is_eos() {
            return Err(FlowError::Eos);
        }
        let Some(element) = self.parent() else {
            return Err(FlowError::NotSupported);
        };
        element.imp().chain(&element, self, buffer)
    }

    /// Pull-mode data entry of a source pad.
    ///
    /// Produces up to `size` bytes at `offset` by running the element's
    /// create handler under the stream lock.
    pub fn create(&self, offset: u64, size: u32) -> Result<Buffer, FlowError> {
        if self.direction() != PadDirection::Src {
            return Err(FlowError::NotSupported);
        }
        if self.mode() != PadMode::Pull {
            return Err(FlowError::WrongState);
        }
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }

        let _stream = self.stream_lock();
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }
        let Some(element) = self.parent() else {
            return Err(FlowError::NotSupported);
        };
        element.imp().create(&element, self, offset, size)
    }

    /// Pull `size` bytes at `offset` from the peer of this sink pad.
    pub fn pull_range(&self, offset: u64, size: u32) -> Result<Buffer, FlowError> {
        if self.direction() != PadDirection::Sink {
            return Err(FlowError::NotSupported);
        }
        if self.mode() != PadMode::Pull {
            return Err(FlowError::WrongState);
        }
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }
        let Some(peer) = self.peer() else {
            return Err(FlowError::NotLinked);
        };
        let result = peer.create(offset, size);
        if let Err(error) = result {
            if error != FlowError::Eos {
                self.record_error(error);
            }
        }
        result
    }

    /// Push a buffer from this source pad into its peer.
    ///
    /// Returns the peer's flow result unchanged.
    pub fn push(&self, buffer: Buffer) -> FlowResult {
        if self.direction() != PadDirection::Src {
            return Err(FlowError::NotSupported);
        }
        if self.mode() != PadMode::Push {
            return Err(FlowError::WrongState);
        }
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }
        let Some(peer) = self.peer() else {
            self.record_error(FlowError::NotLinked);
            return Err(FlowError::NotLinked);
        };

        let size = buffer.len();
        let context = self.parent().and_then(|element| element.context());
        if context
            .as_ref()
            .is_some_and(|ctx| ctx.config().tracing.buffer_events)
        {
            trace!(pad = %self.debug_name(), size, pts = ?buffer.pts(), "push");
        }

        let metrics = self.metrics();
        metrics.record_push(size);
        let result = {
            let _timer = metrics.start_timer();
            peer.chain(buffer)
        };
        if let Err(error) = result {
            if !matches!(error, FlowError::Eos | FlowError::Flushing) {
                metrics.record_error(error);
            }
        }
        if let Some(ctx) = context {
            ctx.notify_push(self, size, &result);
        }
        result
    }

    fn metrics(&self) -> &PadMetrics {
        self.inner.metrics.get_or_init(|| {
            let element = self.parent().map(|e| e.name().to_string()).unwrap_or_default();
            PadMetrics::new(&element, &self.inner.name)
        })
    }

    fn record_error(&self, error: FlowError) {
        let element = self.parent().map(|e| e.name().to_string()).unwrap_or_default();
        record_flow_error(&element, &self.inner.name, error);
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Send `event` out of this pad to its peer.
    ///
    /// Downstream events leave through source pads and upstream events
    /// through sink pads. Flush events also update this pad's flushing
    /// state, and sticky events are stored on it.
    pub fn push_event(&self, event: Event) -> bool {
        let expected = if event.is_downstream() {
            PadDirection::Src
        } else {
            PadDirection::Sink
        };
        if self.direction() != expected {
            warn!(pad = %self.debug_name(), event = event.name(), "event pushed in the wrong direction");
            return false;
        }

        match &event {
            Event::FlushStart => self.inner.flushing.store(true, Ordering::Release),
            Event::FlushStop(_) => {
                if self.is_active() {
                    self.inner.flushing.store(false, Ordering::Release);
                }
                self.inner.eos.store(false, Ordering::Release);
                self.clear_flushed_sticky();
            }
            e if e.is_sticky() => {
                if self.is_flushing() {
                    debug!(pad = %self.debug_name(), event = e.name(), "refusing sticky event while flushing");
                    return false;
                }
                if matches!(e, Event::Eos) {
                    self.inner.eos.store(true, Ordering::Release);
                }
                self.store_sticky(e);
            }
            _ => {}
        }

        let Some(peer) = self.peer() else {
            trace!(pad = %self.debug_name(), event = event.name(), "pad not linked, event not forwarded");
            return event.is_sticky();
        };
        trace!(pad = %self.debug_name(), event = event.name(), "pushing event");
        peer.send_event(event)
    }

    /// Deliver `event` into this pad's element.
    ///
    /// Flush-start only marks the pad flushing and never waits for the
    /// stream lock, so it can unblock a streaming thread. Flush-stop and
    /// serialized downstream events run under the stream lock; serialized
    /// events are refused while flushing.
    pub fn send_event(&self, event: Event) -> bool {
        self.receive_event(event, false)
    }

    fn receive_event(&self, event: Event, stream_locked: bool) -> bool {
        let mut _stream = None;
        let serialized_data_event =
            self.direction() == PadDirection::Sink && event.is_downstream() && event.is_serialized();

        match &event {
            Event::FlushStart => {
                self.inner.flushing.store(true, Ordering::Release);
            }
            Event::FlushStop(_) => {
                if !stream_locked {
                    _stream = Some(self.stream_lock());
                }
                if self.is_active() {
                    self.inner.flushing.store(false, Ordering::Release);
                }
                self.inner.eos.store(false, Ordering::Release);
                self.clear_flushed_sticky();
            }
            e if serialized_data_event => {
                if self.is_flushing() {
                    return false;
                }
                if !stream_locked {
                    _stream = Some(self.stream_lock());
                }
                if self.is_flushing() {
                    return false;
                }
                if self.is_eos() && !matches!(e, Event::StreamStart(_)) {
                    debug!(pad = %self.debug_name(), event = e.name(), "refusing event after EOS");
                    return false;
                }
                if e.is_sticky() {
                    self.store_sticky(e);
                }
                if matches!(e, Event::Eos) {
                    self.inner.eos.store(true, Ordering::Release);
                }
            }
            _ => {}
        }

        let Some(element) = self.parent() else {
            return false;
        };
        trace!(pad = %self.debug_name(), event = event.name(), "event received");
        element.imp().event(&element, self, event)
    }

    /// A flush ends the segment; the stream itself carries on.
    fn clear_flushed_sticky(&self) {
        lock(&self.inner.sticky).retain(|event| !matches!(event, Event::Segment(_) | Event::Eos));
    }

    fn store_sticky(&self, event: &Event) {
        let mut sticky = lock(&self.inner.sticky);
        if let Event::StreamStart(_) = event {
            sticky.clear();
        }
        match sticky.iter_mut().find(|stored| stored.same_kind(event)) {
            Some(stored) => *stored = event.clone(),
            None => sticky.push(event.clone()),
        }
    }

    /// Default event handling: forward `event` to every linked pad of the
    /// opposite direction on this pad's element.
    ///
    /// End-of-stream reaching an element without source pads is posted on
    /// the bus as an EOS message instead.
    pub fn event_default(&self, event: Event) -> bool {
        let Some(element) = self.parent() else {
            return false;
        };

        if matches!(event, Event::Eos)
            && self.direction() == PadDirection::Sink
            && element.src_pads().is_empty()
        {
            crate::observability::trace_eos(element.name());
            element.post_message(MessageView::Eos);
            return true;
        }

        let mut result = true;
        for pad in element.pads() {
            if pad.direction() != self.direction() && pad.is_linked() {
                result &= pad.push_event(event.clone());
            }
        }
        result
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Ask this pad's element to answer `query`.
    pub fn query(&self, query: &mut Query) -> bool {
        match self.parent() {
            Some(element) => element.imp().query(&element, self, query),
            None => false,
        }
    }

    /// Ask the peer's element to answer `query`.
    pub fn peer_query(&self, query: &mut Query) -> bool {
        self.peer().is_some_and(|peer| peer.query(query))
    }

    /// Default query handling: forward to the peer of the first linked pad
    /// of the opposite direction.
    pub fn query_default(&self, query: &mut Query) -> bool {
        let Some(element) = self.parent() else {
            return false;
        };
        element
            .pads()
            .into_iter()
            .find(|pad| pad.direction() != self.direction() && pad.is_linked())
            .is_some_and(|pad| pad.peer_query(query))
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Bind a streaming task to this pad without starting it.
    ///
    /// The loop function runs under the stream lock and returns a flow
    /// result:
    ///
    /// - success: the loop continues;
    /// - `Flushing`: the task pauses quietly;
    /// - `Eos`: EOS is sent downstream (source pad) or into the element
    ///   (sink pad), then the task pauses;
    /// - `NotLinked` or a fatal error: an Error message is posted, EOS is
    ///   sent as above and the task pauses.
    ///
    /// A panic in the loop function is treated as [`FlowError::Error`].
    ///
    /// A loop feeding several pads returns their combined result, see
    /// [`FlowCombiner`](crate::flow::FlowCombiner). Does nothing if the pad
    /// already has a task.
    pub fn create_task<F>(&self, func: F) -> Result<(), TaskError>
    where
        F: FnMut(&Pad, &TaskContext<'_>) -> FlowResult + Send + 'static,
    {
        let mut slot = lock(&self.inner.task);
        if slot.is_some() {
            return Ok(());
        }

        let weak = Arc::downgrade(&self.inner);
        let mut func = func;
        let task = Task::with_lock(
            self.debug_name(),
            Arc::clone(&self.inner.stream_lock),
            move |ctx| {
                let Some(inner) = weak.upgrade() else {
                    ctx.pause();
                    return;
                };
                let pad = Pad { inner };
                let result = panic::catch_unwind(AssertUnwindSafe(|| func(&pad, ctx)))
                    .unwrap_or_else(|payload| {
                        error!(
                            pad = %pad.debug_name(),
                            panic = panic_message(payload.as_ref()),
                            "streaming function panicked"
                        );
                        Err(FlowError::Error)
                    });
                pad.handle_task_result(result, ctx);
            },
        )
        .with_config(self.task_config());
        *slot = Some(task);
        Ok(())
    }

    /// Bind a streaming task if needed and start it.
    pub fn start_task<F>(&self, func: F) -> Result<(), TaskError>
    where
        F: FnMut(&Pad, &TaskContext<'_>) -> FlowResult + Send + 'static,
    {
        self.create_task(func)?;
        self.resume_task().map(|_| ())
    }

    /// Start the bound task, if any. Returns whether the pad has a task.
    pub fn resume_task(&self) -> Result<bool, TaskError> {
        let slot = lock(&self.inner.task);
        let Some(task) = slot.as_ref() else {
            return Ok(false);
        };
        let was_started = task.state() == TaskState::Started;
        task.start()?;
        drop(slot);
        if !was_started {
            self.post_stream_status(StreamStatusType::Enter);
        }
        Ok(true)
    }

    /// Pause the task after its running iteration.
    pub fn pause_task(&self) -> bool {
        match lock(&self.inner.task).as_ref() {
            Some(task) => {
                task.pause();
                true
            }
            None => false,
        }
    }

    /// Stop the task, wait for it, and unbind it from the pad.
    pub fn stop_task(&self) -> Result<(), TaskError> {
        let task = lock(&self.inner.task).take();
        let Some(task) = task else {
            return Ok(());
        };
        task.stop()?;
        self.post_stream_status(StreamStatusType::Leave);
        Ok(())
    }

    /// State of the task, if the pad has one.
    pub fn task_state(&self) -> Option<TaskState> {
        lock(&self.inner.task).as_ref().map(Task::state)
    }

    fn task_config(&self) -> TaskConfig {
        self.parent()
            .and_then(|element| element.context())
            .map(|ctx| {
                let mut config = ctx.config().task.clone();
                config.span &= ctx.config().tracing.task_spans;
                config
            })
            .unwrap_or_default()
    }

    fn post_stream_status(&self, status: StreamStatusType) {
        if let Some(element) = self.parent() {
            element.post_message(MessageView::StreamStatus {
                status,
                pad: self.inner.name.clone(),
            });
        }
    }

    fn handle_task_result(&self, result: FlowResult, ctx: &TaskContext<'_>) {
        let error = match result {
            Ok(FlowSuccess::Ok) | Ok(FlowSuccess::CustomSuccess(_)) => return,
            Err(error) => error,
        };

        match error {
            FlowError::Flushing => {
                debug!(pad = %self.debug_name(), "pausing task, flushing");
            }
            FlowError::Eos => {
                debug!(pad = %self.debug_name(), "pausing task, end of stream");
                self.send_eos_from_task();
            }
            error => {
                error!(pad = %self.debug_name(), reason = %error, "streaming stopped");
                if let Some(element) = self.parent() {
                    let info = ErrorInfo::new(
                        ErrorDomain::Stream,
                        ErrorCode::Failed,
                        format!("streaming stopped, reason {error}"),
                    )
                    .with_debug(self.debug_name());
                    element.post_message(MessageView::Error(info));
                }
                self.send_eos_from_task();
            }
        }
        ctx.pause();
    }

    fn send_eos_from_task(&self) {
        let delivered = match self.direction() {
            PadDirection::Src => self.push_event(Event::Eos),
            // The task holds this pad's stream lock already.
            PadDirection::Sink => self.receive_event(Event::Eos, true),
        };
        if !delivered {
            debug!(pad = %self.debug_name(), "EOS from task was not handled");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl PartialEq for Pad {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Pad {}

impl fmt::Debug for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pad")
            .field("name", &self.inner.name)
            .field("direction", &self.inner.direction)
            .field("mode", &self.mode())
            .field("linked", &self.is_linked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementImpl};
    use crate::event::{FlushStopEvent, StreamStartEvent};

    /// Sink that records the length of each chained buffer.
    #[derive(Default)]
    struct Recorder {
        sizes: Mutex<Vec<usize>>,
    }

    impl ElementImpl for Recorder {
        fn chain(&self, _element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
            self.sizes.lock().unwrap().push(buffer.len());
            Ok(FlowSuccess::Ok)
        }
    }

    struct Plain;
    impl ElementImpl for Plain {}

    fn linked_pair() -> (Element, Pad, Element, Pad) {
        let upstream = Element::new("up", Plain);
        let src = Pad::src();
        upstream.add_pad(src.clone()).unwrap();

        let downstream = Element::new("down", Recorder::default());
        let sink = Pad::sink();
        downstream.add_pad(sink.clone()).unwrap();

        src.link(&sink).unwrap();
        (upstream, src, downstream, sink)
    }

    #[test]
    fn test_link_checks() {
        let a = Element::new("a", Plain);
        let b = Element::new("b", Plain);
        let a_src = Pad::src();
        let a_sink = Pad::sink();
        let b_sink = Pad::sink();
        a.add_pad(a_src.clone()).unwrap();
        a.add_pad(a_sink.clone()).unwrap();
        b.add_pad(b_sink.clone()).unwrap();

        assert_eq!(b_sink.link(&a_src), Err(PadLinkError::WrongDirection));
        assert_eq!(a_src.link(&a_sink), Err(PadLinkError::SameElement));
        assert_eq!(
            Pad::src().link(&b_sink),
            Err(PadLinkError::NoParent)
        );

        a_src.link(&b_sink).unwrap();
        assert_eq!(a_src.peer(), Some(b_sink.clone()));
        assert_eq!(b_sink.peer(), Some(a_src.clone()));

        let c = Element::new("c", Plain);
        let c_sink = Pad::sink();
        c.add_pad(c_sink.clone()).unwrap();
        assert_eq!(a_src.link(&c_sink), Err(PadLinkError::WasLinked));

        assert!(a_src.unlink(&b_sink));
        assert!(!a_src.is_linked());
        assert!(!a_src.unlink(&b_sink));
    }

    #[test]
    fn test_peer_is_weak() {
        let (upstream, src, downstream, sink) = linked_pair();
        drop(downstream);
        drop(sink);
        assert!(src.peer().is_none());
        assert!(!src.is_linked());
        drop(upstream);
    }

    #[test]
    fn test_inactive_pad_rejects_data() {
        let (_up, src, _down, sink) = linked_pair();
        assert_eq!(sink.chain(Buffer::with_size(4)), Err(FlowError::WrongState));
        assert_eq!(src.create(0, 4).unwrap_err(), FlowError::WrongState);
        assert_eq!(src.push(Buffer::with_size(4)), Err(FlowError::WrongState));
        assert!(sink.is_flushing());
    }

    #[test]
    fn test_push_reaches_chain() {
        let (_up, src, down, sink) = linked_pair();
        src.activate(PadMode::Push).unwrap();
        sink.activate(PadMode::Push).unwrap();

        assert_eq!(src.push(Buffer::with_size(3)), Ok(FlowSuccess::Ok));
        assert_eq!(src.push(Buffer::with_size(5)), Ok(FlowSuccess::Ok));
        let recorder = down.downcast_ref::<Recorder>().unwrap();
        assert_eq!(*recorder.sizes.lock().unwrap(), vec![3, 5]);
    }

    #[test]
    fn test_default_chain_is_not_supported() {
        let up = Element::new("up", Plain);
        let down = Element::new("down", Plain);
        let src = Pad::src();
        let sink = Pad::sink();
        up.add_pad(src.clone()).unwrap();
        down.add_pad(sink.clone()).unwrap();
        src.link(&sink).unwrap();
        src.activate(PadMode::Push).unwrap();
        sink.activate(PadMode::Push).unwrap();

        assert_eq!(src.push(Buffer::with_size(1)), Err(FlowError::NotSupported));
    }

    #[test]
    fn test_unlinked_push() {
        let up = Element::new("up", Plain);
        let src = Pad::src();
        up.add_pad(src.clone()).unwrap();
        src.activate(PadMode::Push).unwrap();
        assert_eq!(src.push(Buffer::with_size(1)), Err(FlowError::NotLinked));
    }

    #[test]
    fn test_default_pull_mode_is_refused() {
        let (_up, src, _down, sink) = linked_pair();
        let err = sink.activate(PadMode::Pull).unwrap_err();
        assert!(matches!(err, ActivationError::ModeNotSupported { .. }));
        assert_eq!(src.mode(), PadMode::Inactive);
        assert_eq!(sink.mode(), PadMode::Inactive);
    }

    #[test]
    fn test_flush_and_eos_state() {
        let (_up, src, _down, sink) = linked_pair();
        src.activate(PadMode::Push).unwrap();
        sink.activate(PadMode::Push).unwrap();

        assert!(src.push_event(Event::StreamStart(StreamStartEvent::new("s"))));
        assert!(src.push_event(Event::Segment(Segment::new_bytes(0, None))));
        assert_eq!(sink.sticky_events().len(), 2);
        assert!(sink.segment().is_some());

        assert!(src.push_event(Event::Eos));
        assert!(sink.is_eos());
        assert_eq!(sink.chain(Buffer::with_size(1)), Err(FlowError::Eos));

        assert!(src.push_event(Event::FlushStart));
        assert!(sink.is_flushing());
        assert_eq!(src.push(Buffer::with_size(1)), Err(FlowError::Flushing));
        assert!(!src.push_event(Event::Segment(Segment::default())));

        assert!(src.push_event(Event::FlushStop(FlushStopEvent::default())));
        assert!(!sink.is_flushing());
        assert!(!sink.is_eos());
        assert_eq!(sink.sticky_events().len(), 1);
        assert!(sink.segment().is_none());
        assert_eq!(src.push(Buffer::with_size(1)), Ok(FlowSuccess::Ok));
    }

    #[test]
    fn test_event_wrong_direction() {
        let (_up, src, _down, sink) = linked_pair();
        assert!(!sink.push_event(Event::Eos));
        assert!(!src.push_event(Event::Seek(crate::event::SeekEvent::new_bytes(0))));
    }

    #[test]
    fn test_task_eos_pauses_and_forwards() {
        let (_up, src, _down, sink) = linked_pair();
        src.activate(PadMode::Push).unwrap();
        sink.activate(PadMode::Push).unwrap();

        let mut remaining = 3;
        src.start_task(move |pad, _ctx| {
            if remaining == 0 {
                return Err(FlowError::Eos);
            }
            remaining -= 1;
            pad.push(Buffer::with_size(2))
        })
        .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while src.task_state() != Some(TaskState::Paused) {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(sink.is_eos());
        src.stop_task().unwrap();
        assert_eq!(src.task_state(), None);
    }

    #[test]
    fn test_deactivate_stops_task() {
        let (_up, src, _down, sink) = linked_pair();
        src.activate(PadMode::Push).unwrap();
        sink.activate(PadMode::Push).unwrap();
        src.start_task(|pad, _ctx| pad.push(Buffer::with_size(1))).unwrap();

        src.activate(PadMode::Inactive).unwrap();
        assert_eq!(src.task_state(), None);
        assert_eq!(src.mode(), PadMode::Inactive);
        assert!(src.is_flushing());
    }
}
