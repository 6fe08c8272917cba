//! Integration tests for streaming tasks.
//!
//! Set `RUST_LOG=padflow=trace` to see the task lifecycle while these run.

use padflow::task::{Task, TaskConfig, TaskState};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached");
}

/// Test that the loop never runs again once stop returns.
#[test]
fn test_stop_then_loop_not_running() {
    init_tracing();
    let iterations = Arc::new(AtomicUsize::new(0));
    let task = Task::new("counter", {
        let iterations = Arc::clone(&iterations);
        move |_| {
            iterations.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        }
    });

    task.start().unwrap();
    wait_for(|| iterations.load(Ordering::SeqCst) > 3);
    task.stop().unwrap();
    assert_eq!(task.state(), TaskState::Stopped);
    assert!(task.thread_id().is_none());

    let after_stop = iterations.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(iterations.load(Ordering::SeqCst), after_stop);
}

/// Test stopping right after starting, before the first iteration may run.
#[test]
fn test_immediate_stop_after_start() {
    init_tracing();
    let inside = Arc::new(AtomicUsize::new(0));
    let task = Task::new("flicker", {
        let inside = Arc::clone(&inside);
        move |_| {
            inside.fetch_add(1, Ordering::SeqCst);
            thread::yield_now();
            inside.fetch_sub(1, Ordering::SeqCst);
        }
    });

    for round in 0..200 {
        task.start().unwrap();
        task.stop().unwrap();
        assert_eq!(inside.load(Ordering::SeqCst), 0, "loop running after stop, round {round}");
        assert_eq!(task.state(), TaskState::Stopped);
        assert!(task.thread_id().is_none());
    }
}

/// Test that pause lets a blocked iteration finish instead of interrupting it.
#[test]
fn test_pause_does_not_interrupt_blocked_iteration() {
    init_tracing();
    let (unblock, blocked) = mpsc::channel::<()>();
    let blocked = Mutex::new(blocked);
    let entered = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicUsize::new(0));

    let task = Task::new("blocked", {
        let entered = Arc::clone(&entered);
        let finished = Arc::clone(&finished);
        move |_| {
            entered.store(true, Ordering::SeqCst);
            let _ = blocked.lock().unwrap().recv();
            finished.fetch_add(1, Ordering::SeqCst);
        }
    });

    task.start().unwrap();
    wait_for(|| entered.load(Ordering::SeqCst));

    // Returns at once although the iteration is stuck.
    task.pause();
    assert_eq!(task.state(), TaskState::Paused);
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    unblock.send(()).unwrap();
    wait_for(|| finished.load(Ordering::SeqCst) == 1);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    drop(unblock);
    task.stop().unwrap();
}

/// Test that holding the stream lock keeps the loop out.
#[test]
fn test_stream_lock_excludes_iterations() {
    init_tracing();
    let stream_lock = Arc::new(Mutex::new(()));
    let iterations = Arc::new(AtomicUsize::new(0));
    let task = Task::with_lock("locked", Arc::clone(&stream_lock), {
        let iterations = Arc::clone(&iterations);
        move |_| {
            iterations.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
        }
    });

    task.start().unwrap();
    wait_for(|| iterations.load(Ordering::SeqCst) > 0);

    {
        let _guard = stream_lock.lock().unwrap();
        let frozen = iterations.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(iterations.load(Ordering::SeqCst), frozen);
    }

    let resumed_from = iterations.load(Ordering::SeqCst);
    wait_for(|| iterations.load(Ordering::SeqCst) > resumed_from);
    task.stop().unwrap();
}

/// Test that the worker thread is named from the config.
#[test]
fn test_worker_thread_name() {
    init_tracing();
    let (tx, rx) = mpsc::channel();
    let task = Task::new("named", move |ctx| {
        let _ = tx.send(thread::current().name().map(str::to_string));
        ctx.pause();
    })
    .with_config(TaskConfig::small_stack().with_name_prefix("worker"));

    task.start().unwrap();
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("worker-named"));
    task.stop().unwrap();
}
