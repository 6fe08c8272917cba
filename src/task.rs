//! Worker threads that drive a pad's streaming loop.
//!
//! A [`Task`] owns one OS thread that repeatedly calls a loop function while
//! the task is [`Started`](TaskState::Started). Every iteration runs with the
//! task's stream lock held, so a control thread that takes the same lock
//! knows the loop is between iterations.
//!
//! Pausing is cooperative: [`Task::pause`] lets the running iteration finish
//! and does not reschedule it. A blocked call inside the loop is not
//! interrupted; long-running operations should watch the
//! [`Cancellation`] token handed out by [`TaskContext::cancellation`].
//!
//! # Example
//!
//! ```rust
//! use padflow::task::{Task, TaskState};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let count = Arc::new(AtomicU32::new(0));
//! let counter = count.clone();
//! let task = Task::new("counter", move |ctx| {
//!     if counter.fetch_add(1, Ordering::SeqCst) == 9 {
//!         ctx.pause();
//!     }
//! });
//!
//! task.start().unwrap();
//! while task.state() != TaskState::Paused {
//!     std::thread::yield_now();
//! }
//! task.stop().unwrap();
//! assert_eq!(count.load(Ordering::SeqCst), 10);
//! ```

use crate::error::TaskError;
use crate::lock;
use crate::observability::{record_task_exited, record_task_started, span_task};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Lock serializing streaming on one pad.
pub type StreamLock = Arc<Mutex<()>>;

/// Loop function of a task.
pub type TaskFunction = Box<dyn FnMut(&TaskContext<'_>) + Send + 'static>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for task worker threads.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Prefix of worker thread names (`<prefix>-<task name>`).
    pub name_prefix: String,
    /// Worker stack size, `None` for the platform default.
    pub stack_size: Option<usize>,
    /// Whether the worker runs inside a `task` tracing span.
    pub span: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name_prefix: "padflow".to_string(),
            stack_size: None,
            span: true,
        }
    }
}

impl TaskConfig {
    /// Workers with a 256 KiB stack, for pipelines with many pads.
    pub fn small_stack() -> Self {
        Self {
            stack_size: Some(256 * 1024),
            ..Self::default()
        }
    }

    /// Set the thread name prefix.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cancellation token checked by long-running loop bodies.
///
/// Triggered when the task is paused or stopped and reset when it starts
/// again.
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancellationInner>,
}

#[derive(Default)]
struct CancellationInner {
    cancelled: Mutex<bool>,
    changed: Condvar,
}

impl Cancellation {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *lock(&self.inner.cancelled)
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        *lock(&self.inner.cancelled) = true;
        self.inner.changed.notify_all();
    }

    pub(crate) fn reset(&self) {
        *lock(&self.inner.cancelled) = false;
    }

    /// Sleep for up to `timeout`, returning early when cancelled.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = lock(&self.inner.cancelled);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = self
                .inner
                .changed
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *cancelled
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Task
// ============================================================================

/// State of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// No worker is iterating; the worker exits if it exists.
    #[default]
    Stopped,
    /// The worker calls the loop function repeatedly.
    Started,
    /// The worker waits for the next start.
    Paused,
}

struct TaskShared {
    name: String,
    state: Mutex<TaskState>,
    state_changed: Condvar,
    cancellation: Cancellation,
    stream_lock: StreamLock,
    func: Mutex<Option<TaskFunction>>,
}

impl TaskShared {
    fn set_state(&self, new: TaskState) -> TaskState {
        let mut state = lock(&self.state);
        let old = *state;
        *state = new;
        if new != TaskState::Started {
            self.cancellation.cancel();
        }
        self.state_changed.notify_all();
        old
    }
}

/// Handed to every iteration of the loop function.
pub struct TaskContext<'a> {
    shared: &'a TaskShared,
}

impl TaskContext<'_> {
    /// Name of the running task.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Pause the task after this iteration.
    pub fn pause(&self) {
        let mut state = lock(&self.shared.state);
        if *state == TaskState::Started {
            *state = TaskState::Paused;
            self.shared.cancellation.cancel();
        }
    }

    /// Check if the task is still started.
    pub fn is_started(&self) -> bool {
        *lock(&self.shared.state) == TaskState::Started
    }

    /// Token triggered when the task is paused or stopped.
    pub fn cancellation(&self) -> &Cancellation {
        &self.shared.cancellation
    }
}

/// A worker thread repeatedly running a loop function.
pub struct Task {
    shared: Arc<TaskShared>,
    config: TaskConfig,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Task {
    /// Create a stopped task with its own stream lock.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&TaskContext<'_>) + Send + 'static,
    {
        Self::with_lock(name, Arc::new(Mutex::new(())), func)
    }

    /// Create a stopped task that runs every iteration under `stream_lock`.
    pub fn with_lock<F>(name: impl Into<String>, stream_lock: StreamLock, func: F) -> Self
    where
        F: FnMut(&TaskContext<'_>) + Send + 'static,
    {
        Self {
            shared: Arc::new(TaskShared {
                name: name.into(),
                state: Mutex::new(TaskState::Stopped),
                state_changed: Condvar::new(),
                cancellation: Cancellation::new(),
                stream_lock,
                func: Mutex::new(Some(Box::new(func))),
            }),
            config: TaskConfig::default(),
            handle: Mutex::new(None),
        }
    }

    /// Replace the worker thread configuration. Applies to the next spawn.
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Name of the task.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        *lock(&self.shared.state)
    }

    /// The lock held around every iteration.
    pub fn stream_lock(&self) -> &StreamLock {
        &self.shared.stream_lock
    }

    /// Token triggered when the task is paused or stopped.
    pub fn cancellation(&self) -> &Cancellation {
        &self.shared.cancellation
    }

    /// Start iterating, spawning the worker thread if needed.
    pub fn start(&self) -> Result<(), TaskError> {
        let mut handle = lock(&self.handle);
        {
            let mut state = lock(&self.shared.state);
            match *state {
                TaskState::Started => return Ok(()),
                TaskState::Paused if handle.is_some() => {
                    *state = TaskState::Started;
                    self.shared.cancellation.reset();
                    self.shared.state_changed.notify_all();
                    debug!(task = %self.shared.name, "task resumed");
                    return Ok(());
                }
                _ => {}
            }
        }

        // A stopped worker may still be finishing; it hands the loop
        // function back when it exits.
        if let Some(old) = handle.take() {
            if old.thread().id() == thread::current().id() {
                *handle = Some(old);
                return Err(TaskError::JoinFromTaskThread(self.shared.name.clone()));
            }
            old.join()
                .map_err(|_| TaskError::Panicked(self.shared.name.clone()))?;
        }

        let func = lock(&self.shared.func)
            .take()
            .ok_or_else(|| TaskError::Spawn(format!("{} has no loop function", self.shared.name)))?;

        *lock(&self.shared.state) = TaskState::Started;
        self.shared.cancellation.reset();

        let shared = Arc::clone(&self.shared);
        let span = self.config.span;
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.name_prefix, self.shared.name));
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        match builder.spawn(move || run(shared, func, span)) {
            Ok(join_handle) => {
                *handle = Some(join_handle);
                debug!(task = %self.shared.name, "task started");
                Ok(())
            }
            Err(e) => {
                *lock(&self.shared.state) = TaskState::Stopped;
                Err(TaskError::Spawn(e.to_string()))
            }
        }
    }

    /// Pause after the running iteration.
    ///
    /// A task that was never started becomes paused without a worker; the
    /// next [`start`](Self::start) spawns it.
    pub fn pause(&self) {
        let handle = lock(&self.handle);
        let mut state = lock(&self.shared.state);
        match *state {
            TaskState::Started => {
                *state = TaskState::Paused;
                self.shared.cancellation.cancel();
                debug!(task = %self.shared.name, "task paused");
            }
            TaskState::Stopped if handle.is_none() => *state = TaskState::Paused,
            _ => {}
        }
    }

    /// Stop the task and wait for the worker to exit.
    ///
    /// After this returns the loop function is not running. Called from the
    /// task's own thread, it only marks the task stopped; the worker exits
    /// when the current iteration returns.
    pub fn stop(&self) -> Result<(), TaskError> {
        self.shared.set_state(TaskState::Stopped);
        match self.join() {
            Err(TaskError::JoinFromTaskThread(_)) => Ok(()),
            other => other,
        }
    }

    /// Stop the task and join the worker thread.
    ///
    /// Refused with [`TaskError::JoinFromTaskThread`] when called from the
    /// task's own thread.
    pub fn join(&self) -> Result<(), TaskError> {
        let mut handle = lock(&self.handle);
        if handle
            .as_ref()
            .is_some_and(|worker| worker.thread().id() == thread::current().id())
        {
            return Err(TaskError::JoinFromTaskThread(self.shared.name.clone()));
        }
        self.shared.set_state(TaskState::Stopped);
        let Some(worker) = handle.take() else {
            return Ok(());
        };
        drop(handle);
        worker
            .join()
            .map_err(|_| TaskError::Panicked(self.shared.name.clone()))?;
        trace!(task = %self.shared.name, "task joined");
        Ok(())
    }

    /// Thread id of the worker, if one is alive.
    pub fn thread_id(&self) -> Option<ThreadId> {
        lock(&self.handle).as_ref().map(|h| h.thread().id())
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!(task = %self.shared.name, error = %e, "task worker ended abnormally");
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Marks the task stopped if the loop function unwinds the worker.
struct WorkerExit<'a> {
    shared: &'a TaskShared,
}

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.set_state(TaskState::Stopped);
            warn!(task = %self.shared.name, "loop function panicked, task stopped");
        }
        record_task_exited();
    }
}

fn run(shared: Arc<TaskShared>, mut func: TaskFunction, span: bool) {
    let _span = span.then(|| span_task(&shared.name).entered());
    record_task_started();
    let _exit = WorkerExit { shared: &shared };
    trace!(task = %shared.name, "worker thread running");

    'outer: loop {
        {
            let mut state = lock(&shared.state);
            loop {
                match *state {
                    TaskState::Started => break,
                    TaskState::Paused => {
                        state = shared
                            .state_changed
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    TaskState::Stopped => break 'outer,
                }
            }
        }

        let _stream = lock(&shared.stream_lock);
        // A control thread may have paused or stopped the task while it
        // held the stream lock.
        if *lock(&shared.state) != TaskState::Started {
            continue;
        }
        let ctx = TaskContext { shared: &shared };
        func(&ctx);
    }

    *lock(&shared.func) = Some(func);
    trace!(task = %shared.name, "worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_stop_waits_for_iteration() {
        let running = Arc::new(AtomicU32::new(0));
        let iterations = Arc::new(AtomicU32::new(0));
        let (r, i) = (running.clone(), iterations.clone());
        let task = Task::new("sentinel", move |_| {
            r.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            i.fetch_add(1, Ordering::SeqCst);
            r.fetch_sub(1, Ordering::SeqCst);
        });

        task.start().unwrap();
        wait_for(|| iterations.load(Ordering::SeqCst) > 0);
        task.stop().unwrap();

        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert_eq!(task.state(), TaskState::Stopped);
        let after = iterations.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(iterations.load(Ordering::SeqCst), after);
    }

    #[test]
    fn test_panicking_loop_stops_task() {
        let task = Task::new("boom", |_| panic!("loop function bug"));
        task.start().unwrap();
        wait_for(|| task.state() == TaskState::Stopped);

        // The dead worker is reported instead of being resumed.
        assert!(matches!(task.start(), Err(TaskError::Panicked(_))));
        assert_eq!(task.state(), TaskState::Stopped);
        assert!(task.thread_id().is_none());
        assert!(task.stop().is_ok());
    }

    #[test]
    fn test_pause_and_resume() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = Task::new("pausable", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        });

        task.start().unwrap();
        wait_for(|| count.load(Ordering::SeqCst) > 2);
        task.pause();
        assert_eq!(task.state(), TaskState::Paused);
        assert!(task.cancellation().is_cancelled());

        // Take the stream lock: the paused worker is between iterations.
        let frozen = {
            let _guard = task.stream_lock().lock().unwrap();
            count.load(Ordering::SeqCst)
        };
        thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), frozen);

        task.start().unwrap();
        assert!(!task.cancellation().is_cancelled());
        wait_for(|| count.load(Ordering::SeqCst) > frozen);
        task.join().unwrap();
    }

    #[test]
    fn test_self_pause_from_context() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = Task::new("self-pause", move |ctx| {
            if c.fetch_add(1, Ordering::SeqCst) == 4 {
                ctx.pause();
                assert!(!ctx.is_started());
            }
        });

        task.start().unwrap();
        wait_for(|| task.state() == TaskState::Paused);
        thread::sleep(Duration::from_millis(5));
        assert_eq!(count.load(Ordering::SeqCst), 5);
        task.stop().unwrap();
    }

    #[test]
    fn test_join_from_own_thread_is_refused() {
        let slot: Arc<Mutex<Option<Arc<Task>>>> = Arc::new(Mutex::new(None));
        let (tx, rx) = std::sync::mpsc::channel();
        let s = slot.clone();
        let task = Arc::new(Task::new("self-join", move |ctx| {
            let task = s.lock().unwrap().clone();
            if let Some(task) = task {
                tx.send(task.join()).unwrap();
            }
            ctx.pause();
        }));
        *slot.lock().unwrap() = Some(task.clone());

        task.start().unwrap();
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            result,
            Err(TaskError::JoinFromTaskThread("self-join".to_string()))
        );

        slot.lock().unwrap().take();
        task.stop().unwrap();
    }

    #[test]
    fn test_restart_after_stop() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = Task::new("restart", move |ctx| {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.pause();
        });

        task.start().unwrap();
        wait_for(|| count.load(Ordering::SeqCst) == 1);
        task.stop().unwrap();
        task.start().unwrap();
        wait_for(|| count.load(Ordering::SeqCst) == 2);
        task.stop().unwrap();
    }

    #[test]
    fn test_cancellation_unblocks_wait() {
        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (e, f) = (entered.clone(), finished.clone());
        let task = Task::new("blocking", move |ctx| {
            e.store(true, Ordering::SeqCst);
            if ctx.cancellation().wait_timeout(Duration::from_secs(30)) {
                f.store(true, Ordering::SeqCst);
            }
        });

        task.start().unwrap();
        wait_for(|| entered.load(Ordering::SeqCst));
        task.stop().unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = Cancellation::new();
        assert!(!token.wait_timeout(Duration::from_millis(2)));
        token.cancel();
        assert!(token.wait_timeout(Duration::from_secs(30)));
    }

    #[test]
    fn test_config_applies() {
        let (tx, rx) = std::sync::mpsc::channel();
        let task = Task::new("named", move |ctx| {
            tx.send(thread::current().name().map(str::to_owned)).unwrap();
            ctx.pause();
        })
        .with_config(TaskConfig::small_stack().with_name_prefix("pf"));

        task.start().unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("pf-named"));
        assert!(task.thread_id().is_some());
        task.stop().unwrap();
        assert!(task.thread_id().is_none());
    }
}
