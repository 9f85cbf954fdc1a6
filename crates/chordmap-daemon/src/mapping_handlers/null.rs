//! Disabled mappings

use std::sync::Arc;

use chordmap_config::{is_analog, EventCombination, InputEvent, Mapping};

use super::{HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

/// Swallows everything, for mappings whose output is `disable`.
pub struct NullHandler {
    base: HandlerBase,
}

impl NullHandler {
    pub fn new(combination: &EventCombination, mapping: Arc<Mapping>) -> Self {
        Self {
            base: HandlerBase::new(combination, mapping),
        }
    }
}

impl InputEventHandler for NullHandler {
    fn notify(
        &mut self,
        _event: InputEvent,
        _source: &DeviceInfo,
        _forward: &OutputSink,
        _suppress: bool,
    ) -> bool {
        true
    }

    fn reset(&mut self) {}
}

impl MappingHandler for NullHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Disable
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    /// Buttons are disabled as a chord. An axis is disabled while the other
    /// events are held, or always when it is the only event.
    fn wrap_with(&self) -> Vec<(EventCombination, HandlerKind)> {
        let events = &self.base.input_events;
        if events.is_empty() {
            return Vec::new();
        }

        let combination = EventCombination::new(events.iter().copied());
        if !events.iter().any(is_analog) {
            vec![(combination, HandlerKind::Combination)]
        } else if events.len() > 1 {
            vec![(combination, HandlerKind::AxisSwitch)]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordmap_config::{EV_ABS, EV_KEY};

    fn handler(tuples: &[(u16, u16, i32)]) -> NullHandler {
        let mapping = Arc::new(Mapping::with_symbol(
            EventCombination::from_tuples(tuples),
            "keyboard",
            "disable",
        ));
        NullHandler::new(mapping.event_combination(), mapping.clone())
    }

    #[test]
    fn test_wrapping_depends_on_analog_input() {
        let keys = handler(&[(EV_KEY, 30, 1), (EV_KEY, 48, 1)]);
        assert_eq!(keys.wrap_with()[0].1, HandlerKind::Combination);

        let switched = handler(&[(EV_KEY, 30, 1), (EV_ABS, 0, 0)]);
        assert_eq!(switched.wrap_with()[0].1, HandlerKind::AxisSwitch);

        let axis = handler(&[(EV_ABS, 0, 0)]);
        assert!(!axis.needs_wrapping());
    }

    #[test]
    fn test_swallows_events() {
        let mut null = handler(&[(EV_ABS, 0, 0)]);
        let (forward, _rx) = OutputSink::channel("forward");
        let event = InputEvent::from_tuple(EV_ABS, 0, 1234);
        assert!(null.notify(event, &DeviceInfo::default(), &forward, false));
    }
}
