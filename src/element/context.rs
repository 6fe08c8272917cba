//! Pipeline context shared by the elements of a pipeline.
//!
//! An element receives the context when it is added to a
//! [`Pipeline`](crate::pipeline::Pipeline). Through it the element reaches the
//! pipeline's bus, its configuration and any installed [`PipelineHook`]s.
//! A standalone element has no context: it posts no messages and uses
//! default task settings.

use crate::bus::{Bus, Message};
use crate::element::{Element, StateChange, StateChangeResult};
use crate::flow::FlowResult;
use crate::pad::Pad;
use crate::pipeline::PipelineConfig;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Observer of pipeline activity.
///
/// Hooks run synchronously on the thread doing the work, streaming threads
/// included, and must not block.
pub trait PipelineHook: Send + Sync {
    /// A source pad pushed a buffer of `size` bytes.
    fn on_push(&self, pad: &Pad, size: usize, result: &FlowResult) {
        let _ = (pad, size, result);
    }

    /// An element finished a single state-change step.
    fn on_state_change(&self, element: &Element, transition: StateChange, result: &StateChangeResult) {
        let _ = (element, transition, result);
    }

    /// An element is about to post `message` on the bus.
    fn on_message(&self, message: &Message) {
        let _ = message;
    }
}

/// Runtime context of a pipeline.
pub struct PipelineContext {
    bus: Bus,
    config: PipelineConfig,
    hooks: RwLock<Vec<Arc<dyn PipelineHook>>>,
}

impl PipelineContext {
    /// Create a context posting to `bus`.
    pub fn new(bus: Bus, config: PipelineConfig) -> Self {
        Self {
            bus,
            config,
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Bus of the pipeline.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Configuration of the pipeline.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Install a hook.
    pub fn add_hook(&self, hook: Arc<dyn PipelineHook>) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    fn hooks(&self) -> Vec<Arc<dyn PipelineHook>> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn notify_push(&self, pad: &Pad, size: usize, result: &FlowResult) {
        for hook in self.hooks() {
            hook.on_push(pad, size, result);
        }
    }

    pub(crate) fn notify_state_change(
        &self,
        element: &Element,
        transition: StateChange,
        result: &StateChangeResult,
    ) {
        for hook in self.hooks() {
            hook.on_state_change(element, transition, result);
        }
    }

    pub(crate) fn notify_message(&self, message: &Message) {
        for hook in self.hooks() {
            hook.on_message(message);
        }
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("bus", &self.bus.name())
            .field("config", &self.config)
            .field("hooks", &self.hooks().len())
            .finish()
    }
}
