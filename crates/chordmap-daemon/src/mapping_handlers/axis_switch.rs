//! Axes gated by held keys

use std::sync::Arc;

use chordmap_config::{is_analog, EventAction, EventCombination, InputEvent, Mapping, EV_ABS};

use super::{key_like, HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

/// Lets an axis through only while the rest of its combination is held.
///
/// The buttons of the combination arrive as one chord from a wrapping
/// [`CombinationHandler`](super::CombinationHandler). When the chord is
/// released, the sub handler receives a recenter event so that continuous
/// output stops.
pub struct AxisSwitchHandler {
    base: HandlerBase,
    axis: InputEvent,
    active: bool,
    /// Last seen position of an absolute axis
    last_value: Option<i32>,
}

impl AxisSwitchHandler {
    /// Returns `None` unless `combination` has one analog event and at least
    /// one button.
    pub fn new(combination: &EventCombination, mapping: Arc<Mapping>) -> Option<Self> {
        let mut analog = combination.iter().filter(|event| is_analog(event));
        let axis = *analog.next()?;
        if analog.next().is_some() || combination.len() < 2 {
            return None;
        }

        Some(Self {
            base: HandlerBase::new(combination, mapping),
            axis,
            active: false,
            last_value: None,
        })
    }

    fn switch(
        &mut self,
        on: bool,
        source: &DeviceInfo,
        forward: &OutputSink,
        suppress: bool,
    ) -> bool {
        if on == self.active {
            return true;
        }
        self.active = on;
        tracing::debug!(
            "Axis {} switched {}",
            self.axis.code_name(),
            if on { "on" } else { "off" }
        );

        if on {
            // an absolute axis may already be deflected
            if let (EV_ABS, Some(value)) = (self.axis.event_type(), self.last_value) {
                let event = self.axis.with_value(value);
                self.base.notify_sub(event, source, forward, suppress);
            }
        } else {
            let event = self.axis.with_value(0).with_action(EventAction::Recenter);
            self.base.notify_sub(event, source, forward, false);
        }
        true
    }
}

impl InputEventHandler for AxisSwitchHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        source: &DeviceInfo,
        forward: &OutputSink,
        suppress: bool,
    ) -> bool {
        if event.is_key_event() {
            return self.switch(event.value() != 0, source, forward, suppress);
        }

        if event.type_and_code() != self.axis.type_and_code() {
            return false;
        }
        if event.event_type() == EV_ABS {
            self.last_value = Some(event.value());
        }
        if !self.active {
            return false;
        }
        self.base.notify_sub(event, source, forward, suppress)
    }

    fn reset(&mut self) {
        self.active = false;
        self.base.reset_sub();
    }
}

impl MappingHandler for AxisSwitchHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::AxisSwitch
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    fn wrap_with(&self) -> Vec<(EventCombination, HandlerKind)> {
        let buttons = key_like(&self.base.input_events);
        if buttons.is_empty() {
            return Vec::new();
        }
        vec![(EventCombination::new(buttons), HandlerKind::Combination)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_handlers::testing::{abs, key, Harness};
    use crate::mapping_handlers::{handler_ref, CombinationHandler, HandlerRef, NullHandler};
    use chordmap_config::EV_KEY;
    use parking_lot::Mutex;

    const KEY_A: u16 = 30;

    /// Records everything it receives.
    struct Recorder {
        base: HandlerBase,
        seen: Arc<Mutex<Vec<(i32, EventAction)>>>,
    }

    impl InputEventHandler for Recorder {
        fn notify(&mut self, event: InputEvent, _: &DeviceInfo, _: &OutputSink, _: bool) -> bool {
            self.seen.lock().push((event.value(), event.action()));
            true
        }

        fn reset(&mut self) {}
    }

    impl MappingHandler for Recorder {
        fn kind(&self) -> HandlerKind {
            HandlerKind::AbsToRel
        }

        fn base(&self) -> &HandlerBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut HandlerBase {
            &mut self.base
        }
    }

    fn mapping() -> Arc<Mapping> {
        Arc::new(Mapping::with_output_event(
            EventCombination::from_tuples(&[(EV_KEY, KEY_A, 1), (EV_ABS, 0, 0)]),
            "mouse",
            2,
            0,
        ))
    }

    fn switched_axis() -> (HandlerRef, HandlerRef, Arc<Mutex<Vec<(i32, EventAction)>>>) {
        let mapping = mapping();
        let combination = mapping.event_combination().clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut switch = AxisSwitchHandler::new(&combination, mapping.clone()).unwrap();
        switch.set_sub_handler(handler_ref(Recorder {
            base: HandlerBase::new(&combination, mapping.clone()),
            seen: seen.clone(),
        }));
        let buttons = switch.wrap_with().remove(0).0;
        for event in buttons.iter() {
            switch.occlude_input_event(event).unwrap();
        }
        let switch = handler_ref(switch);

        let mut chord = CombinationHandler::new(&buttons, mapping);
        chord.set_sub_handler(switch.clone());
        (handler_ref(chord), switch, seen)
    }

    #[test]
    fn test_requires_axis_and_button() {
        let mapping = mapping();
        let axis_only = EventCombination::from_tuples(&[(EV_ABS, 0, 0)]);
        let buttons = EventCombination::from_tuples(&[(EV_KEY, KEY_A, 1)]);
        assert!(AxisSwitchHandler::new(&axis_only, mapping.clone()).is_none());
        assert!(AxisSwitchHandler::new(&buttons, mapping.clone()).is_none());
        assert!(AxisSwitchHandler::new(mapping.event_combination(), mapping.clone()).is_some());
    }

    #[test]
    fn test_axis_passes_only_while_switched_on() {
        let harness = Harness::new();
        let (chord, switch, seen) = switched_axis();
        assert_eq!(switch.lock().input_events(), &[abs(0, 0)]);

        assert!(!harness.notify(&switch, abs(0, 40)));
        assert!(seen.lock().is_empty());

        harness.notify(&chord, key(KEY_A, 1));
        // the cached deflection is sent on activation
        assert_eq!(seen.lock().as_slice(), &[(40, EventAction::None)]);

        assert!(harness.notify(&switch, abs(0, 60)));
        harness.notify(&chord, key(KEY_A, 0));
        assert_eq!(
            seen.lock().as_slice(),
            &[
                (40, EventAction::None),
                (60, EventAction::None),
                (0, EventAction::Recenter)
            ]
        );

        assert!(!harness.notify(&switch, abs(0, 70)));
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_disabling_switched_axis() {
        let harness = Harness::new();
        let mapping = Arc::new(Mapping::with_symbol(
            EventCombination::from_tuples(&[(EV_KEY, KEY_A, 1), (EV_ABS, 0, 0)]),
            "keyboard",
            "disable",
        ));
        let combination = mapping.event_combination().clone();
        let mut switch = AxisSwitchHandler::new(&combination, mapping.clone()).unwrap();
        switch.set_sub_handler(handler_ref(NullHandler::new(&combination, mapping)));
        let switch = handler_ref(switch);

        harness.notify(&switch, key(KEY_A, 1).with_action(EventAction::AsKey));
        assert!(harness.notify(&switch, abs(0, 50)));
        harness.notify(&switch, key(KEY_A, 0).with_action(EventAction::AsKey));
        assert!(!harness.notify(&switch, abs(0, 50)));
    }
}
