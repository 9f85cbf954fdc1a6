//! Chord detection

use std::sync::Arc;

use chordmap_config::{
    value, EventAction, EventCombination, InputEvent, Mapping, EV_ABS, EV_KEY, EV_REL,
};

use super::{HandlerBase, HandlerKind, HandlerRef, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

/// Tracks which events of a combination are held and tells its sub handler
/// when all of them are (value 1) and when that stops (value 0).
///
/// Releases can arrive in any order; the chord is released once, by the
/// first of its events that goes up.
pub struct CombinationHandler {
    base: HandlerBase,
    /// Held state of every event, in combination order
    pressed: Vec<((u16, u16), bool)>,
    output_state: bool,
    /// Shorter overlapping combinations to reset when this one triggers
    shadowed: Vec<HandlerRef>,
}

impl CombinationHandler {
    pub fn new(combination: &EventCombination, mapping: Arc<Mapping>) -> Self {
        let pressed = combination
            .iter()
            .map(|event| (event.type_and_code(), false))
            .collect();

        Self {
            base: HandlerBase::new(combination, mapping),
            pressed,
            output_state: false,
            shadowed: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.pressed.iter().all(|(_, pressed)| *pressed)
    }

    /// Once a chord triggers, its keys were already forwarded as they went
    /// down. Release them on the forward device so they don't stay held.
    fn forward_release(&self, forward: &OutputSink) {
        let combination = self.base.mapping.event_combination();
        if combination.len() == 1 || !self.base.mapping.release_combination_keys {
            return;
        }

        for event in combination.iter().filter(|e| e.event_type() == EV_KEY) {
            forward.write(EV_KEY, event.code(), value::RELEASE);
        }
        forward.sync();
    }
}

impl InputEventHandler for CombinationHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        source: &DeviceInfo,
        forward: &OutputSink,
        mut suppress: bool,
    ) -> bool {
        let type_and_code = event.type_and_code();
        let index = match self.pressed.iter().position(|(tc, _)| *tc == type_and_code) {
            Some(index) => index,
            None => return false,
        };

        if event.value() == value::REPEAT {
            return self.output_state;
        }

        let pressed = event.value() == value::PRESS;
        if self.pressed[index].1 == pressed {
            return self.output_state;
        }
        self.pressed[index].1 = pressed;

        let active = self.is_active();
        if active == self.output_state {
            return self.output_state;
        }

        let output_value = if active {
            value::PRESS
        } else {
            // a release always has to reach the output
            suppress = false;
            value::RELEASE
        };

        if suppress {
            return false;
        }

        tracing::debug!(
            "Combination {} is {}",
            self.base.mapping.event_combination(),
            if active { "active" } else { "released" }
        );

        if active {
            for handler in &self.shadowed {
                handler.lock().reset();
            }
            self.forward_release(forward);
        }

        self.output_state = active;
        let event = event
            .with_value(output_value)
            .with_action(EventAction::AsKey);
        self.base.notify_sub(event, source, forward, false)
    }

    fn reset(&mut self) {
        self.base.reset_sub();
        for (_, pressed) in &mut self.pressed {
            *pressed = false;
        }
        self.output_state = false;
    }
}

impl MappingHandler for CombinationHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Combination
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    /// Axis events have to be turned into buttons before they can be part
    /// of a chord.
    fn wrap_with(&self) -> Vec<(EventCombination, HandlerKind)> {
        self.base
            .input_events
            .iter()
            .filter(|event| event.value() != 0)
            .filter_map(|event| match event.event_type() {
                EV_ABS => Some((EventCombination::from(*event), HandlerKind::AbsToBtn)),
                EV_REL => Some((EventCombination::from(*event), HandlerKind::RelToBtn)),
                _ => None,
            })
            .collect()
    }

    fn needs_ranking(&self) -> bool {
        !self.base.input_events.is_empty()
    }

    fn rank_by(&self) -> Option<EventCombination> {
        if self.base.input_events.is_empty() {
            None
        } else {
            Some(EventCombination::new(self.base.input_events.iter().copied()))
        }
    }

    fn set_shadowed(&mut self, handlers: Vec<HandlerRef>) {
        self.shadowed.extend(handlers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_handlers::testing::{key, key_mapping, Harness};
    use crate::mapping_handlers::{handler_ref, KeyHandler};

    const KEY_A: u16 = 30;
    const KEY_B: u16 = 48;
    const KEY_X: u16 = 45;

    /// A combination of `keys` that presses KEY_X.
    fn chord(harness: &Harness, keys: &[u16]) -> HandlerRef {
        let tuples: Vec<_> = keys.iter().map(|&code| (EV_KEY, code, 1)).collect();
        let mapping = key_mapping(&tuples, "x");
        let combination = mapping.event_combination().clone();
        let key_handler = handler_ref(KeyHandler::new(
            &combination,
            mapping.clone(),
            KEY_X,
            harness.context.clone(),
        ));
        let mut handler = CombinationHandler::new(&combination, mapping);
        handler.set_sub_handler(key_handler);
        handler_ref(handler)
    }

    #[test]
    fn test_chord_released_in_reverse_order_releases_once() {
        let mut harness = Harness::new();
        let handler = chord(&harness, &[KEY_A, KEY_B]);

        assert!(!harness.notify(&handler, key(KEY_A, 1)));
        assert!(harness.injected().is_empty());

        assert!(harness.notify(&handler, key(KEY_B, 1)));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1)]);

        assert!(harness.notify(&handler, key(KEY_B, 0)));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 0)]);

        assert!(!harness.notify(&handler, key(KEY_A, 0)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_trigger_releases_forwarded_keys() {
        let mut harness = Harness::new();
        let handler = chord(&harness, &[KEY_A, KEY_B]);

        harness.notify(&handler, key(KEY_A, 1));
        harness.notify(&handler, key(KEY_B, 1));
        assert_eq!(
            harness.forwarded(),
            vec![(EV_KEY, KEY_A, 0), (EV_KEY, KEY_B, 0)]
        );
    }

    #[test]
    fn test_single_key_does_not_release_forwarded_key() {
        let mut harness = Harness::new();
        let handler = chord(&harness, &[KEY_A]);

        assert!(harness.notify(&handler, key(KEY_A, 1)));
        assert!(harness.forwarded().is_empty());
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1)]);
    }

    #[test]
    fn test_repeat_does_not_retrigger() {
        let mut harness = Harness::new();
        let handler = chord(&harness, &[KEY_A]);

        assert!(!harness.notify(&handler, key(KEY_A, 2)));
        harness.notify(&handler, key(KEY_A, 1));
        harness.injected();

        assert!(harness.notify(&handler, key(KEY_A, 2)));
        assert!(harness.notify(&handler, key(KEY_A, 2)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let mut harness = Harness::new();
        let handler = chord(&harness, &[KEY_A]);

        assert!(!harness.notify(&handler, key(KEY_B, 1)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_suppressed_press_produces_no_output() {
        let mut harness = Harness::new();
        let handler = chord(&harness, &[KEY_A]);

        let handled = handler
            .lock()
            .notify(key(KEY_A, 1), &harness.source, &harness.forward, true);
        assert!(!handled);
        assert!(harness.injected().is_empty());

        // nothing was pressed on the output, so nothing to release
        assert!(!harness.notify(&handler, key(KEY_A, 0)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_reset_releases_output() {
        let mut harness = Harness::new();
        let handler = chord(&harness, &[KEY_A, KEY_B]);

        harness.notify(&handler, key(KEY_A, 1));
        harness.notify(&handler, key(KEY_B, 1));
        harness.injected();

        handler.lock().reset();
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 0)]);
        handler.lock().reset();
        assert!(harness.injected().is_empty());

        // the chord has to be pressed again from scratch
        assert!(!harness.notify(&handler, key(KEY_B, 1)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_trigger_resets_shadowed_handlers() {
        let mut harness = Harness::new();
        let short = chord(&harness, &[KEY_A]);
        let long = chord(&harness, &[KEY_A, KEY_B]);
        long.lock().set_shadowed(vec![short.clone()]);

        harness.notify(&long, key(KEY_A, 1));
        assert!(harness.notify(&short, key(KEY_A, 1)));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1)]);

        assert!(harness.notify(&long, key(KEY_B, 1)));
        assert_eq!(
            harness.injected(),
            vec![(EV_KEY, KEY_X, 0), (EV_KEY, KEY_X, 1)]
        );
    }

    #[test]
    fn test_rank_by_and_wrapping() {
        let mapping = Arc::new(Mapping::with_symbol(
            EventCombination::from_tuples(&[(EV_ABS, 0, 50), (EV_KEY, KEY_A, 1), (EV_REL, 8, -1)]),
            "keyboard",
            "x",
        ));
        let handler = CombinationHandler::new(mapping.event_combination(), mapping.clone());

        assert!(handler.needs_ranking());
        assert_eq!(handler.rank_by().map(|c| c.len()), Some(3));

        let kinds: Vec<_> = handler.wrap_with().into_iter().map(|(_, kind)| kind).collect();
        assert_eq!(kinds, vec![HandlerKind::AbsToBtn, HandlerKind::RelToBtn]);
        assert!(handler
            .input_events()
            .iter()
            .all(|event| event.action() == EventAction::AsKey));
    }
}
