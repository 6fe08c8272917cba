//! Pipelines: top-level containers of linked elements.
//!
//! A [`Pipeline`] owns its elements and a [`Bus`]. Adding an element hands
//! it the pipeline's [`PipelineContext`], which is how elements post
//! messages and pick up task and tracing settings. State changes on the
//! pipeline reach every element, one adjacent step at a time, from sinks to
//! sources.
//!
//! # Example
//!
//! ```rust
//! use padflow::elements::{AppSink, DataSrc};
//! use padflow::element::State;
//! use padflow::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::new("demo");
//! pipeline.add(DataSrc::element("src", vec![7u8; 4096])).unwrap();
//! pipeline.add(AppSink::element("sink")).unwrap();
//! pipeline.link("src", "sink").unwrap();
//!
//! pipeline.set_state(State::Playing).unwrap();
//! let done = pipeline.wait_eos(None);
//! pipeline.set_state(State::Null).unwrap();
//! assert!(done.is_some());
//! ```

use crate::bus::{Bus, BusConfig, Message, MessageType, MessageView};
use crate::element::{
    Element, ElementImpl, PipelineContext, PipelineHook, State, StateChangeResult,
};
use crate::error::{Error, Result};
use crate::event::{Event, SeekEvent, SegmentFormat};
use crate::observability::{TracingConfig, init_metrics, span_pipeline};
use crate::pad::{Pad, PadDirection};
use crate::query::Query;
use crate::task::TaskConfig;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Bus settings.
    pub bus: BusConfig,
    /// Worker thread settings for pad tasks.
    pub task: TaskConfig,
    /// Span and event settings.
    pub tracing: TracingConfig,
}

impl PipelineConfig {
    /// Config for pipelines with many pads: small task stacks.
    pub fn many_pads() -> Self {
        Self {
            task: TaskConfig::small_stack(),
            ..Default::default()
        }
    }

    /// Config logging every buffer and running everything in spans.
    pub fn verbose() -> Self {
        Self {
            tracing: TracingConfig::all(),
            ..Default::default()
        }
    }

    /// Config without spans, for benchmarks.
    pub fn quiet() -> Self {
        Self {
            task: TaskConfig {
                span: false,
                ..Default::default()
            },
            tracing: TracingConfig::none(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Behavior of the pipeline's own element: a container without pads.
struct Bin;

impl ElementImpl for Bin {}

/// Top-level container of elements.
pub struct Pipeline {
    element: Element,
    context: Arc<PipelineContext>,
}

impl Pipeline {
    /// Create an empty pipeline in the `Null` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, PipelineConfig::default())
    }

    /// Create an empty pipeline with `config`.
    pub fn with_config(name: impl Into<String>, config: PipelineConfig) -> Self {
        init_metrics();
        let name = name.into();
        let bus = Bus::with_config(name.clone(), config.bus.clone());
        let context = Arc::new(PipelineContext::new(bus, config));
        let element = Element::new(name, Bin);
        element.set_context(Some(Arc::clone(&context)));
        Self { element, context }
    }

    /// Name of the pipeline.
    pub fn name(&self) -> &str {
        self.element.name()
    }

    /// Bus receiving the messages of all elements.
    pub fn bus(&self) -> &Bus {
        self.context.bus()
    }

    /// Configuration.
    pub fn config(&self) -> &PipelineConfig {
        self.context.config()
    }

    /// The pipeline as an element.
    pub fn as_element(&self) -> &Element {
        &self.element
    }

    /// Install a hook observing pushes, state changes and messages.
    pub fn add_hook(&self, hook: Arc<dyn PipelineHook>) {
        self.context.add_hook(hook);
    }

    // ========================================================================
    // Elements
    // ========================================================================

    /// Add `element`. Names are unique within a pipeline.
    pub fn add(&self, element: Element) -> Result<()> {
        if self.element(element.name()).is_some() {
            return Err(Error::DuplicateElement(element.name().to_string()));
        }
        if element.context().is_some() {
            return Err(Error::DuplicateElement(format!(
                "{} belongs to another pipeline",
                element.name()
            )));
        }
        debug!(pipeline = %self.name(), element = %element.name(), "element added");
        self.element.add_child(element);
        Ok(())
    }

    /// Add several elements.
    pub fn add_many(&self, elements: impl IntoIterator<Item = Element>) -> Result<()> {
        for element in elements {
            self.add(element)?;
        }
        Ok(())
    }

    /// Remove the element named `name`, bringing it to `Null` first.
    pub fn remove(&self, name: &str) -> Result<Element> {
        let element = self
            .element(name)
            .ok_or_else(|| Error::ElementNotFound(name.to_string()))?;
        element.set_state(State::Null)?;
        for pad in element.pads() {
            if let Some(peer) = pad.peer() {
                match pad.direction() {
                    PadDirection::Src => pad.unlink(&peer),
                    PadDirection::Sink => peer.unlink(&pad),
                };
            }
        }
        self.element
            .remove_child(name)
            .ok_or_else(|| Error::ElementNotFound(name.to_string()))
    }

    /// The element named `name`.
    pub fn element(&self, name: &str) -> Option<Element> {
        self.element.children().into_iter().find(|e| e.name() == name)
    }

    /// All elements, in insertion order.
    pub fn elements(&self) -> Vec<Element> {
        self.element.children()
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.element.children().len()
    }

    /// Elements without sink pads.
    pub fn sources(&self) -> Vec<Element> {
        self.elements()
            .into_iter()
            .filter(|e| e.sink_pads().is_empty())
            .collect()
    }

    /// Elements without source pads.
    pub fn sinks(&self) -> Vec<Element> {
        self.elements()
            .into_iter()
            .filter(|e| e.src_pads().is_empty())
            .collect()
    }

    fn require(&self, name: &str) -> Result<Element> {
        self.element(name)
            .ok_or_else(|| Error::ElementNotFound(name.to_string()))
    }

    // ========================================================================
    // Linking
    // ========================================================================

    /// Link the first free source pad of `src` to the first free sink pad of
    /// `sink`, requesting pads from either element when none is free.
    pub fn link(&self, src: &str, sink: &str) -> Result<()> {
        let src_element = self.require(src)?;
        let sink_element = self.require(sink)?;
        let src_pad = free_pad(&src_element, PadDirection::Src)?;
        let sink_pad = free_pad(&sink_element, PadDirection::Sink)?;
        src_pad.link(&sink_pad)?;
        Ok(())
    }

    /// Link the named pads of two elements.
    pub fn link_pads(&self, src: &str, src_pad: &str, sink: &str, sink_pad: &str) -> Result<()> {
        let src_pad = named_pad(&self.require(src)?, src_pad)?;
        let sink_pad = named_pad(&self.require(sink)?, sink_pad)?;
        src_pad.link(&sink_pad)?;
        Ok(())
    }

    /// Link elements in a chain: `names[0] -> names[1] -> ...`.
    pub fn link_many(&self, names: &[&str]) -> Result<()> {
        for pair in names.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Bring every element to `target`.
    pub fn set_state(&self, target: State) -> StateChangeResult {
        let span = self
            .config()
            .tracing
            .state_spans
            .then(|| span_pipeline(self.name()));
        let _entered = span.as_ref().map(tracing::Span::enter);

        info!(pipeline = %self.name(), %target, "setting state");
        self.element.set_state(target)
    }

    /// Current state and pending target.
    pub fn state(&self) -> (State, Option<State>) {
        self.element.state()
    }

    /// Current state.
    pub fn current_state(&self) -> State {
        self.element.current_state()
    }

    // ========================================================================
    // Events and queries
    // ========================================================================

    /// Send `event` into the pipeline: upstream events enter at the sinks,
    /// downstream events at the sources.
    pub fn send_event(&self, event: Event) -> bool {
        self.element.send_event(event)
    }

    /// Seek every stream.
    pub fn seek(&self, seek: SeekEvent) -> bool {
        self.send_event(Event::Seek(seek))
    }

    /// Answer `query` through the sinks.
    pub fn query(&self, query: &mut Query) -> bool {
        self.element.query(query)
    }

    /// Current position in `format`.
    pub fn query_position(&self, format: SegmentFormat) -> Option<u64> {
        let mut query = Query::new_position(format);
        if self.query(&mut query) {
            query.position()
        } else {
            None
        }
    }

    /// Total duration in `format`.
    pub fn query_duration(&self, format: SegmentFormat) -> Option<u64> {
        let mut query = Query::new_duration(format);
        if self.query(&mut query) {
            query.duration()
        } else {
            None
        }
    }

    /// Wait until every sink posted EOS, or for the first Error message.
    ///
    /// Returns the last EOS or the Error, or `None` on timeout. Other
    /// messages popped meanwhile are discarded.
    pub fn wait_eos(&self, timeout: Option<Duration>) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let sinks: HashSet<String> = self.sinks().iter().map(|e| e.name().to_string()).collect();
        let mut reached = HashSet::new();

        loop {
            let remaining = match deadline {
                Some(deadline) => Some(deadline.checked_duration_since(Instant::now())?),
                None => None,
            };
            let message = self
                .bus()
                .timed_pop_filtered(remaining, MessageType::EOS | MessageType::ERROR)?;

            match message.view() {
                MessageView::Error(info) => {
                    warn!(pipeline = %self.name(), error = %info, "error while waiting for EOS");
                    return Some(message);
                }
                _ => {
                    if let Some(src) = message.src() {
                        reached.insert(src.to_string());
                    }
                    if sinks.iter().all(|sink| reached.contains(sink)) {
                        return Some(message);
                    }
                }
            }
        }
    }
}

fn free_pad(element: &Element, direction: PadDirection) -> Result<Pad> {
    let existing = element
        .pads()
        .into_iter()
        .find(|pad| pad.direction() == direction && !pad.is_linked());
    match existing {
        Some(pad) => Ok(pad),
        None => element.request_pad(direction),
    }
}

fn named_pad(element: &Element, name: &str) -> Result<Pad> {
    element
        .static_pad(name)
        .ok_or_else(|| Error::PadNotFound(format!("{}:{}", element.name(), name)))
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.current_state() != State::Null {
            if let Err(e) = self.set_state(State::Null) {
                warn!(pipeline = %self.name(), error = %e, "failed to shut down pipeline");
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name())
            .field("state", &self.current_state())
            .field("elements", &self.element_count())
            .finish()
    }
}
