//! Thread-safe message bus from streaming threads to the controller.
//!
//! Elements and tasks post [`Message`]s from any thread; the application
//! consumes them with [`Bus::pop`], a [`BusWatch`] or the async
//! [`Bus::stream`]. Messages are delivered in arrival order.
//!
//! A synchronous handler installed with [`Bus::set_sync_handler`] runs in
//! the posting thread and decides per message:
//!
//! - [`BusSyncReply::Drop`]: discard the message,
//! - [`BusSyncReply::Pass`]: queue it for the consumer,
//! - [`BusSyncReply::Async`]: queue it and block the poster until the
//!   consumer releases the last reference to the message.
//!
//! The queue has its own mutex, never taken by the core while a stream lock
//! is held by the same call, so posting from a streaming callback cannot
//! deadlock a consumer that drains the bus.
//!
//! # Example
//!
//! ```rust
//! use padflow::bus::{Bus, Message, MessageType, MessageView};
//!
//! let bus = Bus::new("example");
//! assert!(bus.post(Message::new(Some("src"), MessageView::Eos)));
//!
//! let message = bus.pop_filtered(MessageType::EOS).unwrap();
//! assert_eq!(message.src(), Some("src"));
//! ```

use crate::element::State;
use crate::error::{Error, Result};
use crate::event::{SegmentFormat, TagList};
use crate::lock;
use crate::observability::{record_bus_dropped, record_bus_pending, record_bus_posted};
use futures::Stream;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Process-wide message sequence numbers.
static NEXT_SEQNUM: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Messages
// ============================================================================

/// Subsystem an error, warning or info message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// Core framework failures (state changes, pads, negotiation).
    Core,
    /// Failures in a supporting library.
    Library,
    /// Failures opening, reading or writing a resource.
    Resource,
    /// Failures in the data stream (decode, format, streaming stopped).
    Stream,
}

/// Error code within an [`ErrorDomain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Generic failure.
    Failed,
    /// Functionality not implemented.
    NotImplemented,
    /// A state change failed.
    StateChange,
    /// A pad operation failed.
    Pad,
    /// Resource not found.
    NotFound,
    /// Resource busy.
    Busy,
    /// Reading failed.
    Read,
    /// Writing failed.
    Write,
    /// Seeking failed.
    Seek,
    /// Data could not be decoded.
    Decode,
    /// Data has the wrong format.
    Format,
    /// Collaborator-defined code.
    Custom(u32),
}

/// Payload of error, warning and info messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Subsystem.
    pub domain: ErrorDomain,
    /// Code within the domain.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Details for developers.
    pub debug: Option<String>,
}

impl ErrorInfo {
    /// Create an error payload.
    pub fn new(domain: ErrorDomain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            message: message.into(),
            debug: None,
        }
    }

    /// Attach debug details.
    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}: {}", self.domain, self.code, self.message)?;
        if let Some(debug) = &self.debug {
            write!(f, " ({debug})")?;
        }
        Ok(())
    }
}

/// Whether a streaming thread is entering or leaving its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamStatusType {
    /// The task of `pad` started.
    Enter,
    /// The task of `pad` stopped.
    Leave,
}

/// Contents of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageView {
    /// A sink element received end-of-stream.
    Eos,
    /// Fatal error; the controller should bring the pipeline down.
    Error(ErrorInfo),
    /// Non-fatal problem.
    Warning(ErrorInfo),
    /// Informational message.
    Info(ErrorInfo),
    /// An element committed a state change.
    StateChanged {
        /// State before the step.
        old: State,
        /// State after the step.
        new: State,
        /// Final target, if further steps follow.
        pending: Option<State>,
    },
    /// A streaming task started or stopped.
    StreamStatus {
        /// Enter or leave.
        status: StreamStatusType,
        /// Name of the pad owning the task.
        pad: String,
    },
    /// A segment seek reached its stop position.
    SegmentDone {
        /// Format of `position`.
        format: SegmentFormat,
        /// Stop position reached.
        position: u64,
    },
    /// Duration is known or changed; query it again.
    DurationChanged,
    /// Latency changed; the pipeline should recompute it.
    Latency,
    /// Application-defined message.
    Application {
        /// Message name.
        name: String,
        /// Payload.
        data: TagList,
    },
}

/// Filter over message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageType(u32);

impl MessageType {
    /// Matches nothing.
    pub const NONE: Self = Self(0);
    /// End-of-stream messages.
    pub const EOS: Self = Self(1 << 0);
    /// Error messages.
    pub const ERROR: Self = Self(1 << 1);
    /// Warning messages.
    pub const WARNING: Self = Self(1 << 2);
    /// Info messages.
    pub const INFO: Self = Self(1 << 3);
    /// State change messages.
    pub const STATE_CHANGED: Self = Self(1 << 4);
    /// Stream status messages.
    pub const STREAM_STATUS: Self = Self(1 << 5);
    /// Segment done messages.
    pub const SEGMENT_DONE: Self = Self(1 << 6);
    /// Duration changed messages.
    pub const DURATION_CHANGED: Self = Self(1 << 7);
    /// Latency messages.
    pub const LATENCY: Self = Self(1 << 8);
    /// Application messages.
    pub const APPLICATION: Self = Self(1 << 9);
    /// Matches everything.
    pub const ANY: Self = Self(u32::MAX);

    /// Check if contains a flag.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any flag is shared.
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Union of flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for MessageType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

struct MessageInner {
    seqnum: u64,
    src: Option<String>,
    timestamp: Instant,
    view: MessageView,
    /// Fired when the last reference is released (async delivery).
    reply: Mutex<Option<kanal::Sender<()>>>,
}

impl Drop for MessageInner {
    fn drop(&mut self) {
        let reply = self
            .reply
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reply) = reply {
            let _ = reply.try_send(());
        }
    }
}

/// A message on the bus. Cloning shares the message.
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

impl Message {
    /// Create a message from `src` (an element name).
    pub fn new(src: Option<&str>, view: MessageView) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                seqnum: NEXT_SEQNUM.fetch_add(1, Ordering::Relaxed),
                src: src.map(str::to_owned),
                timestamp: Instant::now(),
                view,
                reply: Mutex::new(None),
            }),
        }
    }

    /// Create an error message.
    pub fn error(src: Option<&str>, info: ErrorInfo) -> Self {
        Self::new(src, MessageView::Error(info))
    }

    /// Create a warning message.
    pub fn warning(src: Option<&str>, info: ErrorInfo) -> Self {
        Self::new(src, MessageView::Warning(info))
    }

    /// Create an application message.
    pub fn application(src: Option<&str>, name: impl Into<String>, data: TagList) -> Self {
        Self::new(
            src,
            MessageView::Application {
                name: name.into(),
                data,
            },
        )
    }

    /// Unique, increasing sequence number.
    pub fn seqnum(&self) -> u64 {
        self.inner.seqnum
    }

    /// Name of the posting element.
    pub fn src(&self) -> Option<&str> {
        self.inner.src.as_deref()
    }

    /// Creation time.
    pub fn timestamp(&self) -> Instant {
        self.inner.timestamp
    }

    /// Contents.
    pub fn view(&self) -> &MessageView {
        &self.inner.view
    }

    /// Kind of this message.
    pub fn message_type(&self) -> MessageType {
        match self.inner.view {
            MessageView::Eos => MessageType::EOS,
            MessageView::Error(_) => MessageType::ERROR,
            MessageView::Warning(_) => MessageType::WARNING,
            MessageView::Info(_) => MessageType::INFO,
            MessageView::StateChanged { .. } => MessageType::STATE_CHANGED,
            MessageView::StreamStatus { .. } => MessageType::STREAM_STATUS,
            MessageView::SegmentDone { .. } => MessageType::SEGMENT_DONE,
            MessageView::DurationChanged => MessageType::DURATION_CHANGED,
            MessageView::Latency => MessageType::LATENCY,
            MessageView::Application { .. } => MessageType::APPLICATION,
        }
    }

    /// Number of live references.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn set_reply(&self, reply: kanal::Sender<()>) {
        *lock(&self.inner.reply) = Some(reply);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("seqnum", &self.inner.seqnum)
            .field("src", &self.inner.src)
            .field("view", &self.inner.view)
            .finish()
    }
}

// ============================================================================
// Bus
// ============================================================================

/// Reply of a synchronous bus handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSyncReply {
    /// Discard the message.
    Drop,
    /// Queue the message.
    Pass,
    /// Queue the message and block the poster until it is released.
    Async,
}

/// Decision of a watch handler for the delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// Pop the message and keep watching.
    Consume,
    /// Leave the message queued for re-delivery.
    Retain,
    /// Pop the message and end the watch.
    Remove,
}

type SyncHandler = dyn Fn(&Bus, &Message) -> BusSyncReply + Send + Sync;
type WatchHandler = dyn FnMut(&Bus, &Message) -> WatchAction + Send;

/// Configuration for a bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Queue length above which a warning is logged once.
    pub pending_warning: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            pending_warning: 1024,
        }
    }
}

#[derive(Default)]
struct BusQueue {
    messages: VecDeque<Message>,
    flushing: bool,
    warned: bool,
    /// Reply senders of posters blocked in async delivery.
    pending_async: HashMap<u64, kanal::Sender<()>>,
}

struct BusInner {
    name: String,
    config: BusConfig,
    queue: Mutex<BusQueue>,
    available: Condvar,
    notify: Notify,
    sync_handler: Mutex<Option<Arc<SyncHandler>>>,
    watch_active: AtomicBool,
}

/// Message queue shared by a pipeline and its elements.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Create a bus with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, BusConfig::default())
    }

    /// Create a bus.
    pub fn with_config(name: impl Into<String>, config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name: name.into(),
                config,
                queue: Mutex::new(BusQueue::default()),
                available: Condvar::new(),
                notify: Notify::new(),
                sync_handler: Mutex::new(None),
                watch_active: AtomicBool::new(false),
            }),
        }
    }

    /// Name of the bus.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Install the synchronous handler, replacing any previous one.
    ///
    /// The handler runs on the posting thread, often a streaming thread.
    /// Setting the state of the element whose pad task posted the message is
    /// allowed; deactivating a pad whose stream lock the posting call holds
    /// further up the stack (a downstream `chain` in progress) deadlocks.
    pub fn set_sync_handler<F>(&self, handler: F)
    where
        F: Fn(&Bus, &Message) -> BusSyncReply + Send + Sync + 'static,
    {
        *lock(&self.inner.sync_handler) = Some(Arc::new(handler));
    }

    /// Remove the synchronous handler.
    pub fn unset_sync_handler(&self) {
        *lock(&self.inner.sync_handler) = None;
    }

    /// Post a message.
    ///
    /// Returns `false` and drops the message while the bus is flushing. With
    /// an `Async` sync reply this blocks until the consumer releases the
    /// message or the bus starts flushing.
    pub fn post(&self, message: Message) -> bool {
        if lock(&self.inner.queue).flushing {
            trace!(bus = %self.inner.name, seqnum = message.seqnum(), "bus flushing, message dropped");
            record_bus_dropped(&self.inner.name, "flushing");
            return false;
        }

        let handler = lock(&self.inner.sync_handler).clone();
        let reply = match handler {
            Some(handler) => handler(self, &message),
            None => BusSyncReply::Pass,
        };

        match reply {
            BusSyncReply::Drop => {
                trace!(bus = %self.inner.name, seqnum = message.seqnum(), "message dropped by sync handler");
                record_bus_dropped(&self.inner.name, "sync-handler");
                true
            }
            BusSyncReply::Pass => self.enqueue(message, None),
            BusSyncReply::Async => {
                let seqnum = message.seqnum();
                let (tx, rx) = kanal::bounded::<()>(1);
                message.set_reply(tx.clone());
                if !self.enqueue(message, Some(tx)) {
                    return false;
                }
                debug!(bus = %self.inner.name, seqnum, "waiting for async message release");
                let _ = rx.recv();
                lock(&self.inner.queue).pending_async.remove(&seqnum);
                true
            }
        }
    }

    fn enqueue(&self, message: Message, reply: Option<kanal::Sender<()>>) -> bool {
        let pending = {
            let mut queue = lock(&self.inner.queue);
            if queue.flushing {
                drop(queue);
                record_bus_dropped(&self.inner.name, "flushing");
                return false;
            }
            if let Some(reply) = reply {
                queue.pending_async.insert(message.seqnum(), reply);
            }
            queue.messages.push_back(message);
            let pending = queue.messages.len();
            if pending > self.inner.config.pending_warning && !queue.warned {
                queue.warned = true;
                warn!(bus = %self.inner.name, pending, "bus queue is growing, is anyone consuming?");
            }
            pending
        };
        self.inner.available.notify_all();
        self.inner.notify.notify_one();
        record_bus_posted(&self.inner.name);
        record_bus_pending(&self.inner.name, pending);
        true
    }

    /// Remove the oldest message without waiting.
    pub fn pop(&self) -> Option<Message> {
        self.timed_pop_filtered(Some(Duration::ZERO), MessageType::ANY)
    }

    /// Return the oldest message without removing it.
    pub fn peek(&self) -> Option<Message> {
        lock(&self.inner.queue).messages.front().cloned()
    }

    /// Remove the oldest message, waiting up to `timeout` (`None` waits
    /// forever). Returns `None` on timeout or when the bus starts flushing.
    pub fn timed_pop(&self, timeout: Option<Duration>) -> Option<Message> {
        self.timed_pop_filtered(timeout, MessageType::ANY)
    }

    /// Remove the first message matching `types` without waiting.
    /// Non-matching messages in front of it are discarded.
    pub fn pop_filtered(&self, types: MessageType) -> Option<Message> {
        self.timed_pop_filtered(Some(Duration::ZERO), types)
    }

    /// Remove the first message matching `types`, waiting up to `timeout`.
    /// Non-matching messages are discarded.
    pub fn timed_pop_filtered(
        &self,
        timeout: Option<Duration>,
        types: MessageType,
    ) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = lock(&self.inner.queue);
        loop {
            while let Some(message) = queue.messages.pop_front() {
                let pending = queue.messages.len();
                if types.intersects(message.message_type()) {
                    drop(queue);
                    record_bus_pending(&self.inner.name, pending);
                    return Some(message);
                }
                trace!(bus = %self.inner.name, seqnum = message.seqnum(), "discarding filtered message");
            }
            if queue.flushing {
                return None;
            }
            queue = match deadline {
                None => self
                    .inner
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.inner
                        .available
                        .wait_timeout(queue, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Check if messages are queued.
    pub fn have_pending(&self) -> bool {
        !lock(&self.inner.queue).messages.is_empty()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        lock(&self.inner.queue).messages.len()
    }

    /// Check if no messages are queued.
    pub fn is_empty(&self) -> bool {
        !self.have_pending()
    }

    /// Check if the bus drops posts.
    pub fn is_flushing(&self) -> bool {
        lock(&self.inner.queue).flushing
    }

    /// Enter or leave flushing mode.
    ///
    /// Entering drains the queue and unblocks every poster waiting in async
    /// delivery; posts fail until flushing is switched off again.
    pub fn set_flushing(&self, flushing: bool) {
        let drained = {
            let mut queue = lock(&self.inner.queue);
            queue.flushing = flushing;
            if !flushing {
                queue.warned = false;
                return;
            }
            for reply in queue.pending_async.values() {
                let _ = reply.try_send(());
            }
            std::mem::take(&mut queue.messages)
        };
        debug!(bus = %self.inner.name, dropped = drained.len(), "bus flushing");
        drop(drained);
        record_bus_pending(&self.inner.name, 0);
        self.inner.available.notify_all();
        self.inner.notify.notify_one();
    }

    /// Attach the bus watch.
    ///
    /// A bus has at most one watch; a second call fails with
    /// [`Error::WatchExists`] until the first watch is dropped.
    pub fn add_watch<F>(&self, handler: F) -> Result<BusWatch>
    where
        F: FnMut(&Bus, &Message) -> WatchAction + Send + 'static,
    {
        if self.inner.watch_active.swap(true, Ordering::AcqRel) {
            return Err(Error::WatchExists(self.inner.name.clone()));
        }
        Ok(BusWatch {
            bus: self.clone(),
            handler: Box::new(handler),
        })
    }

    /// Stream of messages for async consumers.
    ///
    /// The stream ends when the bus starts flushing. Use one consumer style
    /// per bus: the stream pops messages a watch would otherwise see.
    pub fn stream(&self) -> BusStream {
        BusStream {
            bus: self.clone(),
            waiting: None,
        }
    }

    fn wait_available(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = lock(&self.inner.queue);
        loop {
            if !queue.messages.is_empty() {
                return true;
            }
            if queue.flushing {
                return false;
            }
            queue = match deadline {
                None => self
                    .inner
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.inner
                        .available
                        .wait_timeout(queue, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.inner.name)
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

/// The single watch of a bus.
///
/// Dropping the watch detaches it.
pub struct BusWatch {
    bus: Bus,
    handler: Box<WatchHandler>,
}

impl BusWatch {
    /// Wait up to `timeout` for a message and deliver the front message to
    /// the handler.
    ///
    /// Returns the handler's decision, or `None` when no message arrived or
    /// the bus is flushing.
    pub fn dispatch(&mut self, timeout: Option<Duration>) -> Option<WatchAction> {
        if !self.bus.wait_available(timeout) {
            return None;
        }
        let message = self.bus.peek()?;
        let action = (self.handler)(&self.bus, &message);
        if action != WatchAction::Retain {
            let mut queue = lock(&self.bus.inner.queue);
            if queue
                .messages
                .front()
                .is_some_and(|front| front.seqnum() == message.seqnum())
            {
                queue.messages.pop_front();
            }
        }
        Some(action)
    }

    /// Dispatch until the handler returns [`WatchAction::Remove`] or the bus
    /// starts flushing.
    pub fn run(&mut self) {
        while let Some(action) = self.dispatch(None) {
            if action == WatchAction::Remove {
                break;
            }
        }
    }

    /// The watched bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}

impl Drop for BusWatch {
    fn drop(&mut self) {
        self.bus.inner.watch_active.store(false, Ordering::Release);
    }
}

/// Async stream of bus messages, see [`Bus::stream`].
pub struct BusStream {
    bus: Bus,
    waiting: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
}

impl Stream for BusStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        loop {
            if let Some(message) = self.bus.pop() {
                self.waiting = None;
                return Poll::Ready(Some(message));
            }
            if self.bus.is_flushing() {
                return Poll::Ready(None);
            }
            let inner = Arc::clone(&self.bus.inner);
            let waiting = self
                .waiting
                .get_or_insert_with(|| Box::pin(async move { inner.notify.notified().await }));
            match waiting.as_mut().poll(cx) {
                Poll::Ready(()) => self.waiting = None,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn app(name: &str) -> Message {
        Message::application(Some("test"), name, TagList::new())
    }

    #[test]
    fn test_fifo_order() {
        let bus = Bus::new("fifo");
        for i in 0..5 {
            assert!(bus.post(app(&format!("m{i}"))));
        }
        assert!(bus.have_pending());
        assert_eq!(bus.len(), 5);

        let mut last = 0;
        for i in 0..5 {
            let message = bus.pop().unwrap();
            assert!(message.seqnum() > last);
            last = message.seqnum();
            match message.view() {
                MessageView::Application { name, .. } => assert_eq!(name, &format!("m{i}")),
                other => panic!("unexpected message {other:?}"),
            }
        }
        assert!(bus.pop().is_none());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let bus = Bus::new("peek");
        bus.post(Message::new(None, MessageView::Eos));
        assert_eq!(bus.peek().unwrap().message_type(), MessageType::EOS);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_flushing_drops_posts() {
        let bus = Bus::new("flush");
        bus.post(app("before"));
        bus.set_flushing(true);
        assert!(!bus.have_pending());
        assert!(!bus.post(app("during")));
        assert!(bus.timed_pop(None).is_none(), "flushing bus must not block");

        bus.set_flushing(false);
        assert!(bus.post(app("after")));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_sync_handler_drop() {
        let bus = Bus::new("drop");
        bus.set_sync_handler(|_, message| {
            if message.message_type() == MessageType::INFO {
                BusSyncReply::Drop
            } else {
                BusSyncReply::Pass
            }
        });
        let info = ErrorInfo::new(ErrorDomain::Core, ErrorCode::Failed, "ignored");
        assert!(bus.post(Message::new(None, MessageView::Info(info))));
        assert!(bus.post(Message::new(None, MessageView::Eos)));
        assert_eq!(bus.len(), 1);

        bus.unset_sync_handler();
        assert!(bus.post(Message::new(None, MessageView::DurationChanged)));
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_async_blocks_until_released() {
        let bus = Bus::new("async");
        bus.set_sync_handler(|_, _| BusSyncReply::Async);

        let poster = {
            let bus = bus.clone();
            thread::spawn(move || bus.post(app("sync")))
        };

        let message = bus.timed_pop(Some(Duration::from_secs(5))).unwrap();
        thread::sleep(Duration::from_millis(10));
        assert!(!poster.is_finished(), "poster must wait for release");

        drop(message);
        assert!(poster.join().unwrap());
    }

    #[test]
    fn test_flushing_unblocks_async_poster() {
        let bus = Bus::new("async-flush");
        bus.set_sync_handler(|_, _| BusSyncReply::Async);

        let poster = {
            let bus = bus.clone();
            thread::spawn(move || bus.post(app("stuck")))
        };

        // Hold a reference so only the flush can release the poster.
        let held = loop {
            if let Some(message) = bus.peek() {
                break message;
            }
            thread::sleep(Duration::from_millis(1));
        };
        bus.set_flushing(true);
        assert!(poster.join().unwrap());
        drop(held);
    }

    #[test]
    fn test_filtered_pop_discards_others() {
        let bus = Bus::new("filter");
        bus.post(app("a"));
        bus.post(Message::new(None, MessageView::Eos));
        bus.post(app("b"));

        let eos = bus.pop_filtered(MessageType::EOS | MessageType::ERROR).unwrap();
        assert_eq!(eos.message_type(), MessageType::EOS);
        assert_eq!(bus.len(), 1);
        assert!(bus.pop_filtered(MessageType::ERROR).is_none());
        assert!(!bus.have_pending());
    }

    #[test]
    fn test_timed_pop_waits_for_post() {
        let bus = Bus::new("timed");
        assert!(bus.timed_pop(Some(Duration::from_millis(5))).is_none());

        let poster = {
            let bus = bus.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                bus.post(Message::new(Some("late"), MessageView::Latency))
            })
        };
        let message = bus.timed_pop(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(message.src(), Some("late"));
        poster.join().unwrap();
    }

    #[test]
    fn test_single_watch() {
        let bus = Bus::new("watch");
        let watch = bus.add_watch(|_, _| WatchAction::Consume).unwrap();
        assert!(matches!(
            bus.add_watch(|_, _| WatchAction::Consume),
            Err(Error::WatchExists(_))
        ));
        drop(watch);
        assert!(bus.add_watch(|_, _| WatchAction::Consume).is_ok());
    }

    #[test]
    fn test_watch_retain_and_remove() {
        let bus = Bus::new("watch-dispatch");
        let mut seen = 0;
        let mut watch = bus
            .add_watch(move |_, _| {
                seen += 1;
                match seen {
                    1 => WatchAction::Retain,
                    2 => WatchAction::Consume,
                    _ => WatchAction::Remove,
                }
            })
            .unwrap();

        assert_eq!(watch.dispatch(Some(Duration::ZERO)), None);
        bus.post(app("one"));
        bus.post(app("two"));

        assert_eq!(watch.dispatch(None), Some(WatchAction::Retain));
        assert_eq!(bus.len(), 2);
        assert_eq!(watch.dispatch(None), Some(WatchAction::Consume));
        assert_eq!(bus.len(), 1);
        watch.run();
        assert!(!bus.have_pending());
    }

    #[test]
    fn test_error_info_display() {
        let info = ErrorInfo::new(ErrorDomain::Stream, ErrorCode::Failed, "streaming stopped")
            .with_debug("reason error");
        assert_eq!(
            info.to_string(),
            "Stream/Failed: streaming stopped (reason error)"
        );
    }
}
