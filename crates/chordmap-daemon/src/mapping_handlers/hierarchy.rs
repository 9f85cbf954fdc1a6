//! Overlapping chords
//!
//! Competing handlers see a shared event longest chord first.

use std::sync::Arc;

use chordmap_config::{EventCombination, InputEvent, Mapping, EV_ABS, EV_REL};

use super::{HandlerBase, HandlerKind, HandlerRef, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

/// Gives handlers that compete for the same event a fixed order.
///
/// The first handler that consumes the event wins. All later ones are still
/// notified, with `suppress` set, so their state stays in sync with the
/// physical device.
pub struct HierarchyHandler {
    base: HandlerBase,
    event: InputEvent,
    handlers: Vec<HandlerRef>,
}

impl HierarchyHandler {
    /// `handlers` must already be ordered, highest rank first, and not be
    /// empty.
    pub fn new(handlers: Vec<HandlerRef>, event: InputEvent, mapping: Arc<Mapping>) -> Self {
        Self {
            base: HandlerBase::new(&EventCombination::from(event), mapping),
            event,
            handlers,
        }
    }

    pub fn handlers(&self) -> &[HandlerRef] {
        &self.handlers
    }
}

impl InputEventHandler for HierarchyHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        source: &DeviceInfo,
        forward: &OutputSink,
        suppress: bool,
    ) -> bool {
        if event.type_and_code() != self.event.type_and_code() {
            return false;
        }

        let mut handled = false;
        for handler in &self.handlers {
            if handled {
                handler.lock().notify(event, source, forward, true);
            } else {
                handled = handler.lock().notify(event, source, forward, suppress);
            }
        }
        handled
    }

    fn reset(&mut self) {
        for handler in &self.handlers {
            handler.lock().reset();
        }
    }
}

impl MappingHandler for HierarchyHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Hierarchy
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    fn wrap_with(&self) -> Vec<(EventCombination, HandlerKind)> {
        let event = match self.base.input_events.first() {
            Some(event) if event.value() != 0 => *event,
            _ => return Vec::new(),
        };
        match event.event_type() {
            EV_ABS => vec![(EventCombination::from(event), HandlerKind::AbsToBtn)],
            EV_REL => vec![(EventCombination::from(event), HandlerKind::RelToBtn)],
            _ => Vec::new(),
        }
    }

    fn describe(&self) -> String {
        format!("Hierarchy({}, {} handlers)", self.event, self.handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_handlers::testing::{key, key_mapping, Harness};
    use crate::mapping_handlers::{handler_ref, CombinationHandler, KeyHandler};
    use chordmap_config::EV_KEY;

    const KEY_A: u16 = 30;
    const KEY_B: u16 = 48;

    fn chord(harness: &Harness, keys: &[u16], output: u16) -> HandlerRef {
        let tuples: Vec<_> = keys.iter().map(|&code| (EV_KEY, code, 1)).collect();
        let mapping = key_mapping(&tuples, "x");
        let combination = mapping.event_combination().clone();
        let mut handler = CombinationHandler::new(&combination, mapping.clone());
        handler.set_sub_handler(handler_ref(KeyHandler::new(
            &combination,
            mapping,
            output,
            harness.context.clone(),
        )));
        handler_ref(handler)
    }

    /// {A} and {A, B} ranked on A, {A, B} also receiving B directly.
    fn overlapping(harness: &Harness) -> (HandlerRef, HandlerRef, HandlerRef) {
        let short = chord(harness, &[KEY_A], 1);
        let long = chord(harness, &[KEY_A, KEY_B], 2);
        long.lock().set_shadowed(vec![short.clone()]);
        let mapping = key_mapping(&[(EV_KEY, KEY_A, 1), (EV_KEY, KEY_B, 1)], "x");
        let hierarchy = handler_ref(HierarchyHandler::new(
            vec![long.clone(), short.clone()],
            key(KEY_A, 1),
            mapping,
        ));
        (hierarchy, long, short)
    }

    #[test]
    fn test_single_key_claimed_by_short_handler() {
        let mut harness = Harness::new();
        let (hierarchy, _, _) = overlapping(&harness);

        assert!(harness.notify(&hierarchy, key(KEY_A, 1)));
        assert_eq!(harness.injected(), vec![(EV_KEY, 1, 1)]);

        assert!(harness.notify(&hierarchy, key(KEY_A, 0)));
        assert_eq!(harness.injected(), vec![(EV_KEY, 1, 0)]);
    }

    #[test]
    fn test_longer_chord_takes_over() {
        let mut harness = Harness::new();
        let (hierarchy, long, _) = overlapping(&harness);

        harness.notify(&hierarchy, key(KEY_A, 1));
        assert_eq!(harness.injected(), vec![(EV_KEY, 1, 1)]);

        assert!(harness.notify(&long, key(KEY_B, 1)));
        assert_eq!(harness.injected(), vec![(EV_KEY, 1, 0), (EV_KEY, 2, 1)]);

        // releasing A ends the chord, the reset short handler stays quiet
        assert!(harness.notify(&hierarchy, key(KEY_A, 0)));
        assert_eq!(harness.injected(), vec![(EV_KEY, 2, 0)]);

        assert!(!harness.notify(&long, key(KEY_B, 0)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_ignores_other_events() {
        let mut harness = Harness::new();
        let (hierarchy, _, _) = overlapping(&harness);

        assert!(!harness.notify(&hierarchy, key(KEY_B, 1)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_reset_reaches_all_handlers() {
        let mut harness = Harness::new();
        let (hierarchy, long, _) = overlapping(&harness);

        harness.notify(&hierarchy, key(KEY_A, 1));
        harness.notify(&long, key(KEY_B, 1));
        harness.injected();

        hierarchy.lock().reset();
        assert_eq!(harness.injected(), vec![(EV_KEY, 2, 0)]);
    }
}
