//! Element states and the transitions between them.

use crate::error::StateChangeError;
use std::fmt;

/// Lifecycle state of an element.
///
/// States are ordered: `Null < Ready < Paused < Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum State {
    /// Initial state; no resources held.
    #[default]
    Null,
    /// Resources allocated, pads inactive.
    Ready,
    /// Pads active, tasks bound but not running.
    Paused,
    /// Tasks running.
    Playing,
}

impl State {
    /// The adjacent state one step towards `target`, or `self` if already
    /// there.
    pub fn step_towards(self, target: State) -> State {
        use State::*;
        match self.cmp(&target) {
            std::cmp::Ordering::Equal => self,
            std::cmp::Ordering::Less => match self {
                Null => Ready,
                Ready => Paused,
                Paused | Playing => Playing,
            },
            std::cmp::Ordering::Greater => match self {
                Playing => Paused,
                Paused => Ready,
                Ready | Null => Null,
            },
        }
    }

    /// Lowercase state name.
    pub fn name(self) -> &'static str {
        match self {
            State::Null => "null",
            State::Ready => "ready",
            State::Paused => "paused",
            State::Playing => "playing",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single step between adjacent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    /// Allocate resources.
    NullToReady,
    /// Activate pads and bind tasks.
    ReadyToPaused,
    /// Start tasks.
    PausedToPlaying,
    /// Pause tasks.
    PlayingToPaused,
    /// Deactivate pads and stop tasks.
    PausedToReady,
    /// Release resources.
    ReadyToNull,
}

impl StateChange {
    /// The transition from `current` to the adjacent state `next`.
    pub fn from_states(current: State, next: State) -> Option<Self> {
        use State::*;
        match (current, next) {
            (Null, Ready) => Some(Self::NullToReady),
            (Ready, Paused) => Some(Self::ReadyToPaused),
            (Paused, Playing) => Some(Self::PausedToPlaying),
            (Playing, Paused) => Some(Self::PlayingToPaused),
            (Paused, Ready) => Some(Self::PausedToReady),
            (Ready, Null) => Some(Self::ReadyToNull),
            _ => None,
        }
    }

    /// State before the step.
    pub fn current(self) -> State {
        match self {
            Self::NullToReady => State::Null,
            Self::ReadyToPaused | Self::ReadyToNull => State::Ready,
            Self::PausedToPlaying | Self::PausedToReady => State::Paused,
            Self::PlayingToPaused => State::Playing,
        }
    }

    /// State after the step.
    pub fn next(self) -> State {
        match self {
            Self::ReadyToNull => State::Null,
            Self::NullToReady | Self::PausedToReady => State::Ready,
            Self::ReadyToPaused | Self::PlayingToPaused => State::Paused,
            Self::PausedToPlaying => State::Playing,
        }
    }

    /// Check if the step goes towards `Playing`.
    pub fn is_upward(self) -> bool {
        self.next() > self.current()
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.current(), self.next())
    }
}

/// Successful outcome of a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateChangeSuccess {
    /// The change completed.
    #[default]
    Success,
    /// The change completed, and the element produces data only while
    /// playing (a live source), so it cannot preroll in `Paused`.
    NoPreroll,
}

impl StateChangeSuccess {
    /// Combine outcomes: `NoPreroll` wins.
    pub fn merge(self, other: StateChangeSuccess) -> StateChangeSuccess {
        if self == Self::NoPreroll || other == Self::NoPreroll {
            Self::NoPreroll
        } else {
            Self::Success
        }
    }
}

/// Result of a state change.
pub type StateChangeResult = Result<StateChangeSuccess, StateChangeError>;
