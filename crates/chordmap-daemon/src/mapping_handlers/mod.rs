//! Mapping handlers and how they compose
//!
//! Handling an input event happens in three steps, and every handler kind
//! covers one or more of them:
//!
//! 1. *Input handling*: receive raw events from the event reader
//!    ([`HierarchyHandler`], [`AbsToBtnHandler`], [`RelToBtnHandler`],
//!    [`AxisSwitchHandler`], [`CombinationHandler`]).
//! 2. *Transformation*: combine events, turn axes into buttons and back
//!    ([`CombinationHandler`], [`AbsToBtnHandler`], [`RelToBtnHandler`],
//!    [`AbsToRelHandler`], [`RelToRelHandler`]).
//! 3. *Injection*: write the result to the output device ([`KeyHandler`],
//!    [`MacroHandler`], [`AbsToRelHandler`], [`RelToRelHandler`]).
//!
//! A mapping starts out as its output handler. Whatever that handler declares
//! in [`MappingHandler::wrap_with`] is layered on top of it, and handlers
//! whose triggers overlap are ranked under a [`HierarchyHandler`]. See
//! [`crate::mapping_parser`] for the assembly.

mod abs_to_btn;
mod abs_to_rel;
mod axis_switch;
mod combination;
mod hierarchy;
mod key;
mod macro_handler;
mod null;
mod rel_to_btn;
mod rel_to_rel;

use std::fmt;
use std::sync::Arc;

use chordmap_config::{
    EventAction, EventCombination, InputEvent, Mapping, MappingOutput, EV_ABS, EV_REL,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::device::DeviceInfo;
use crate::error::{MappingParsingError, OcclusionError};
use crate::injector::OutputSink;

pub use abs_to_btn::AbsToBtnHandler;
pub use abs_to_rel::AbsToRelHandler;
pub use axis_switch::AxisSwitchHandler;
pub use combination::CombinationHandler;
pub use hierarchy::HierarchyHandler;
pub use key::KeyHandler;
pub use macro_handler::MacroHandler;
pub use null::NullHandler;
pub use rel_to_btn::RelToBtnHandler;
pub use rel_to_rel::RelToRelHandler;

/// A handler shared between the places of the graph that reach it.
///
/// Locks are only ever taken from a parent towards its children, and a
/// combination only resets strictly shorter combinations, so no lock is
/// taken twice on one call path.
pub type HandlerRef = Arc<Mutex<dyn MappingHandler>>;

/// Wrap a handler for use in the graph.
pub fn handler_ref(handler: impl MappingHandler + 'static) -> HandlerRef {
    Arc::new(Mutex::new(handler))
}

/// Everything a handler can do to the world besides returning.
#[derive(Debug, Clone)]
pub struct Context {
    /// The injection path, shared by all devices
    pub output: OutputSink,
    /// Events sent here are fed back into the owning device's event reader.
    /// They are routed like input but never forwarded.
    pub feedback: mpsc::UnboundedSender<InputEvent>,
}

impl Context {
    pub fn new(output: OutputSink, feedback: mpsc::UnboundedSender<InputEvent>) -> Self {
        Self { output, feedback }
    }

    /// Queue an event for the event reader.
    pub fn feed_back(&self, event: InputEvent) {
        if self.feedback.send(event).is_err() {
            tracing::debug!("Event reader is gone, dropping feedback {}", event);
        }
    }
}

/// The closed set of handler kinds the graph builder can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    // converting to buttons
    AbsToBtn,
    RelToBtn,

    // output
    Key,
    Macro,
    Disable,

    // converting to relative motion
    AbsToRel,
    RelToRel,

    // structure
    Combination,
    Hierarchy,
    AxisSwitch,
}

/// The part every node of a handler graph has to support.
pub trait InputEventHandler: Send {
    /// Process one event. Returns whether it was consumed; the event reader
    /// forwards events nobody consumed.
    ///
    /// `suppress` asks the handler to update its state without producing
    /// output, because a higher ranked handler already took the event.
    fn notify(
        &mut self,
        event: InputEvent,
        source: &DeviceInfo,
        forward: &OutputSink,
        suppress: bool,
    ) -> bool;

    /// Release everything that is held. Calling it twice does nothing more.
    fn reset(&mut self);
}

/// A handler that the graph builder can compose.
pub trait MappingHandler: InputEventHandler {
    fn kind(&self) -> HandlerKind;

    fn base(&self) -> &HandlerBase;

    fn base_mut(&mut self) -> &mut HandlerBase;

    fn mapping(&self) -> &Mapping {
        &self.base().mapping
    }

    /// Events this handler still receives straight from the event reader.
    fn input_events(&self) -> &[InputEvent] {
        &self.base().input_events
    }

    /// Handlers to layer on top of this one, with the events each of them
    /// takes over.
    fn wrap_with(&self) -> Vec<(EventCombination, HandlerKind)> {
        Vec::new()
    }

    fn needs_wrapping(&self) -> bool {
        !self.wrap_with().is_empty()
    }

    /// Whether this handler has to compete with others for its events.
    fn needs_ranking(&self) -> bool {
        false
    }

    /// The events this handler competes for.
    fn rank_by(&self) -> Option<EventCombination> {
        None
    }

    fn set_sub_handler(&mut self, handler: HandlerRef) {
        self.base_mut().sub_handler = Some(handler);
    }

    /// Stop receiving `event` directly, because a wrapping handler took it.
    fn occlude_input_event(&mut self, event: &InputEvent) -> Result<(), OcclusionError> {
        let position = self
            .base()
            .input_events
            .iter()
            .position(|watched| watched == event);

        match position {
            Some(index) => {
                self.base_mut().input_events.remove(index);
                Ok(())
            }
            None => Err(OcclusionError {
                handler: self.describe(),
                event: *event,
            }),
        }
    }

    /// Lower ranked handlers that lose their claim when this one triggers.
    fn set_shadowed(&mut self, _handlers: Vec<HandlerRef>) {}

    fn describe(&self) -> String {
        format!("{:?}({})", self.kind(), self.mapping().event_combination())
    }
}

/// State shared by all handler kinds
pub struct HandlerBase {
    pub mapping: Arc<Mapping>,
    pub input_events: Vec<InputEvent>,
    pub sub_handler: Option<HandlerRef>,
}

impl HandlerBase {
    /// Events with a value other than zero take part in combinations as
    /// buttons, even when they come from an axis.
    pub fn new(combination: &EventCombination, mapping: Arc<Mapping>) -> Self {
        let input_events = combination
            .iter()
            .map(|event| {
                if event.value() != 0 {
                    event.with_action(EventAction::AsKey)
                } else {
                    *event
                }
            })
            .collect();

        Self {
            mapping,
            input_events,
            sub_handler: None,
        }
    }

    /// Pass an event on to the sub handler. A missing sub handler means the
    /// graph was assembled wrong, the event is dropped.
    pub fn notify_sub(
        &self,
        event: InputEvent,
        source: &DeviceInfo,
        forward: &OutputSink,
        suppress: bool,
    ) -> bool {
        match &self.sub_handler {
            Some(sub) => sub.lock().notify(event, source, forward, suppress),
            None => {
                tracing::error!(
                    "No sub handler for {}, dropping {}",
                    self.mapping.event_combination(),
                    event
                );
                false
            }
        }
    }

    pub fn reset_sub(&self) {
        if let Some(sub) = &self.sub_handler {
            sub.lock().reset();
        }
    }
}

impl fmt::Debug for HandlerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBase")
            .field("combination", self.mapping.event_combination())
            .field("input_events", &self.input_events)
            .field("has_sub_handler", &self.sub_handler.is_some())
            .finish()
    }
}

/// Create a wrapping handler of the given kind for `combination`.
///
/// Output handlers come from [`create_output_handler`], hierarchy handlers
/// only from the ranking step.
pub fn create_handler(
    kind: HandlerKind,
    combination: &EventCombination,
    mapping: Arc<Mapping>,
    context: &Context,
) -> Result<HandlerRef, MappingParsingError> {
    let handler = match kind {
        HandlerKind::Combination => Some(handler_ref(CombinationHandler::new(combination, mapping))),
        HandlerKind::AbsToBtn => AbsToBtnHandler::new(combination, mapping).map(handler_ref),
        HandlerKind::RelToBtn => {
            RelToBtnHandler::new(combination, mapping, context.clone()).map(handler_ref)
        }
        HandlerKind::AxisSwitch => AxisSwitchHandler::new(combination, mapping).map(handler_ref),
        HandlerKind::Key
        | HandlerKind::Macro
        | HandlerKind::Disable
        | HandlerKind::AbsToRel
        | HandlerKind::RelToRel
        | HandlerKind::Hierarchy => None,
    };

    handler.ok_or_else(|| MappingParsingError::CannotWrap {
        kind,
        combination: combination.to_string(),
    })
}

/// Create the handler that produces a mapping's output.
pub fn create_output_handler(
    mapping: Arc<Mapping>,
    context: &Context,
) -> Result<HandlerRef, String> {
    let combination = mapping.event_combination().clone();
    let handler = match mapping.output()? {
        MappingOutput::Disable => handler_ref(NullHandler::new(&combination, mapping)),
        MappingOutput::Key(code) => {
            handler_ref(KeyHandler::new(&combination, mapping, code, context.clone()))
        }
        MappingOutput::Macro(program) => handler_ref(MacroHandler::new(
            &combination,
            mapping,
            program,
            context.clone(),
        )),
        MappingOutput::Axis {
            event_type: EV_REL,
            code,
        } => match mapping.analog_input() {
            Some(axis) if axis.event_type() == EV_ABS => handler_ref(AbsToRelHandler::new(
                &combination,
                mapping,
                axis,
                code,
                context.clone(),
            )),
            Some(axis) if axis.event_type() == EV_REL => handler_ref(RelToRelHandler::new(
                &combination,
                mapping,
                axis,
                code,
                context.clone(),
            )),
            _ => return Err("an axis output needs one analog input".to_string()),
        },
        MappingOutput::Axis { event_type, .. } => {
            return Err(format!("no handler produces output of type {}", event_type))
        }
    };
    Ok(handler)
}

/// The input events of a combination that behave like buttons.
pub(crate) fn key_like(events: &[InputEvent]) -> Vec<InputEvent> {
    events
        .iter()
        .filter(|event| event.is_key_event())
        .copied()
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::injector::SinkCommand;
    use chordmap_config::EV_KEY;

    /// Sinks and context whose output can be inspected.
    pub struct Harness {
        pub context: Context,
        pub output: mpsc::UnboundedReceiver<SinkCommand>,
        pub forward: OutputSink,
        pub forwarded: mpsc::UnboundedReceiver<SinkCommand>,
        pub feedback: mpsc::UnboundedReceiver<InputEvent>,
        pub source: DeviceInfo,
    }

    impl Harness {
        pub fn new() -> Self {
            let (output, output_rx) = OutputSink::channel("output");
            let (forward, forward_rx) = OutputSink::channel("forward");
            let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
            let mut source = DeviceInfo {
                name: "test device".to_string(),
                ..Default::default()
            };
            for code in 0..2 {
                source
                    .abs_ranges
                    .insert(code, crate::device::AbsRange { min: -100, max: 100 });
            }
            Self {
                context: Context::new(output, feedback_tx),
                output: output_rx,
                forward,
                forwarded: forward_rx,
                feedback: feedback_rx,
                source,
            }
        }

        pub fn notify(&self, handler: &HandlerRef, event: InputEvent) -> bool {
            handler
                .lock()
                .notify(event, &self.source, &self.forward, false)
        }

        pub fn injected(&mut self) -> Vec<(u16, u16, i32)> {
            crate::injector::testing::written(&mut self.output)
        }

        pub fn forwarded(&mut self) -> Vec<(u16, u16, i32)> {
            crate::injector::testing::written(&mut self.forwarded)
        }
    }

    pub fn key(code: u16, value: i32) -> InputEvent {
        InputEvent::from_tuple(EV_KEY, code, value)
    }

    pub fn abs(code: u16, value: i32) -> InputEvent {
        InputEvent::from_tuple(EV_ABS, code, value)
    }

    pub fn rel(code: u16, value: i32) -> InputEvent {
        InputEvent::from_tuple(EV_REL, code, value)
    }

    pub fn key_mapping(combination: &[(u16, u16, i32)], output: &str) -> Arc<Mapping> {
        Arc::new(Mapping::with_symbol(
            EventCombination::from_tuples(combination),
            "keyboard",
            output,
        ))
    }
}
