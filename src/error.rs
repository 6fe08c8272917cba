//! Error types for padflow.
//!
//! Data-flow failures are [`FlowError`](crate::flow::FlowError) values.
//! The enums here cover the control plane: linking, activation, state changes
//! and task management.

use crate::element::{State, StateChange};
use crate::pad::PadMode;
use thiserror::Error;

/// Result type alias using padflow's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for padflow control operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Linking two pads failed.
    #[error(transparent)]
    Link(#[from] PadLinkError),

    /// Pad activation failed.
    #[error(transparent)]
    Activation(#[from] ActivationError),

    /// A state change failed.
    #[error(transparent)]
    StateChange(#[from] StateChangeError),

    /// Task management failed.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// An element with this name is already in the pipeline.
    #[error("element name already in use: {0}")]
    DuplicateElement(String),

    /// No element with this name.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// No pad with this name.
    #[error("pad not found: {0}")]
    PadNotFound(String),

    /// A pad with this name already belongs to the element.
    #[error("pad name already in use: {0}")]
    DuplicatePad(String),

    /// The pad already belongs to an element.
    #[error("pad {0} already has a parent")]
    PadHasParent(String),

    /// Only one watch may consume a bus.
    #[error("bus {0} already has a watch")]
    WatchExists(String),
}

/// Reasons a pad link is refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadLinkError {
    /// Links go from a source pad to a sink pad.
    #[error("pads have wrong direction")]
    WrongDirection,
    /// One of the pads already has a peer.
    #[error("pad was already linked")]
    WasLinked,
    /// One of the pads does not belong to an element.
    #[error("pad has no parent element")]
    NoParent,
    /// Both pads belong to the same element.
    #[error("pads belong to the same element")]
    SameElement,
}

/// Reasons pad activation fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// The element cannot operate its pad in this mode.
    #[error("pad {pad} does not support {mode:?} mode")]
    ModeNotSupported {
        /// Name of the pad.
        pad: String,
        /// Requested mode.
        mode: PadMode,
    },
    /// Pull activation needs a linked peer.
    #[error("pad {0} has no peer to activate")]
    NotLinked(String),
    /// Element-specific failure.
    #[error("activation failed: {0}")]
    Failed(String),
}

/// A failed state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("state change {transition:?} failed for {element}: {reason}")]
pub struct StateChangeError {
    /// Name of the element that failed.
    pub element: String,
    /// Transition that failed.
    pub transition: StateChange,
    /// State the element remains in.
    pub current: State,
    /// Why it failed.
    pub reason: String,
}

impl StateChangeError {
    /// Create an error for an element-specific failure.
    ///
    /// `current` is filled in by the state machine; hooks may pass any value.
    pub fn new(element: impl Into<String>, transition: StateChange, reason: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            transition,
            current: transition.current(),
            reason: reason.into(),
        }
    }
}

/// Task management failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A task cannot join itself.
    #[error("task {0} cannot be joined from its own thread")]
    JoinFromTaskThread(String),
    /// The worker thread could not be spawned.
    #[error("failed to spawn task thread: {0}")]
    Spawn(String),
    /// The worker thread panicked.
    #[error("task {0} panicked")]
    Panicked(String),
}
