//! Analog sticks and triggers as buttons

use std::sync::Arc;

use chordmap_config::{value, EventAction, EventCombination, InputEvent, Mapping, EV_ABS};

use super::{HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::{AbsRange, DeviceInfo};
use crate::injector::OutputSink;

/// Threshold used when the trigger value doesn't carry a percentage
const DEFAULT_THRESHOLD_PERCENT: f64 = 50.0;

/// Turns an absolute axis into a button.
///
/// The value of the trigger event selects the direction by its sign and the
/// threshold by its magnitude, as a percentage of the half range between the
/// center and the end of the axis. Values of 1 and -1 mean the default of
/// 50%.
pub struct AbsToBtnHandler {
    base: HandlerBase,
    trigger: InputEvent,
    active: bool,
}

impl AbsToBtnHandler {
    /// Returns `None` unless `combination` is a single absolute event with a
    /// direction.
    pub fn new(combination: &EventCombination, mapping: Arc<Mapping>) -> Option<Self> {
        let trigger = match combination.events() {
            [event] if event.event_type() == EV_ABS && event.value() != 0 => *event,
            _ => return None,
        };

        Some(Self {
            base: HandlerBase::new(combination, mapping),
            trigger,
            active: false,
        })
    }

    fn threshold(&self, range: AbsRange) -> f64 {
        let magnitude = self.trigger.value().unsigned_abs();
        let percent = if magnitude > 1 {
            magnitude as f64
        } else {
            DEFAULT_THRESHOLD_PERCENT
        };
        let direction = self.trigger.value().signum() as f64;
        center(range) + half_range(range) * percent / 100.0 * direction
    }

    fn is_past_threshold(&self, value: i32, range: AbsRange) -> bool {
        let value = value as f64;
        let threshold = self.threshold(range);
        let center = center(range);
        if self.trigger.value() > 0 {
            value >= threshold && value > center
        } else {
            value <= threshold && value < center
        }
    }
}

fn center(range: AbsRange) -> f64 {
    (range.min as f64 + range.max as f64) / 2.0
}

fn half_range(range: AbsRange) -> f64 {
    (range.max as f64 - range.min as f64) / 2.0
}

impl InputEventHandler for AbsToBtnHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        source: &DeviceInfo,
        forward: &OutputSink,
        suppress: bool,
    ) -> bool {
        if event.type_and_code() != self.trigger.type_and_code() {
            return false;
        }

        let range = match source.abs_range(event.code()) {
            Some(range) if range.max > range.min => range,
            _ => {
                tracing::warn!(
                    "{} reports no usable range for {}",
                    source.name,
                    event.code_name()
                );
                return false;
            }
        };

        let active = self.is_past_threshold(event.value(), range);
        if active == self.active {
            return true;
        }
        self.active = active;

        let output_value = if active { value::PRESS } else { value::RELEASE };
        let event = event
            .with_value(output_value)
            .with_action(EventAction::AsKey);
        self.base.notify_sub(event, source, forward, suppress);
        true
    }

    fn reset(&mut self) {
        self.active = false;
        self.base.reset_sub();
    }
}

impl MappingHandler for AbsToBtnHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::AbsToBtn
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    fn describe(&self) -> String {
        format!("AbsToBtn({})", self.trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_handlers::testing::{abs, key_mapping, Harness};
    use crate::mapping_handlers::{handler_ref, HandlerRef, KeyHandler};
    use chordmap_config::EV_KEY;

    const KEY_X: u16 = 45;

    /// ABS_X (range -100..100 in the harness) past `trigger_value` presses X.
    fn axis_button(harness: &Harness, trigger_value: i32) -> HandlerRef {
        let mapping = key_mapping(&[(EV_ABS, 0, trigger_value)], "x");
        let combination = mapping.event_combination().clone();
        let mut handler = AbsToBtnHandler::new(&combination, mapping.clone()).unwrap();
        handler.set_sub_handler(handler_ref(KeyHandler::new(
            &combination,
            mapping,
            KEY_X,
            harness.context.clone(),
        )));
        handler_ref(handler)
    }

    #[test]
    fn test_requires_single_directed_abs_event() {
        let mapping = key_mapping(&[(EV_ABS, 0, 1)], "x");
        let two = EventCombination::from_tuples(&[(EV_ABS, 0, 1), (EV_ABS, 1, 1)]);
        let analog = EventCombination::from_tuples(&[(EV_ABS, 0, 0)]);
        let key = EventCombination::from_tuples(&[(EV_KEY, 30, 1)]);
        assert!(AbsToBtnHandler::new(&two, mapping.clone()).is_none());
        assert!(AbsToBtnHandler::new(&analog, mapping.clone()).is_none());
        assert!(AbsToBtnHandler::new(&key, mapping.clone()).is_none());
        assert!(AbsToBtnHandler::new(mapping.event_combination(), mapping.clone()).is_some());
    }

    #[test]
    fn test_default_threshold_is_half_way() {
        let mut harness = Harness::new();
        let handler = axis_button(&harness, 1);

        assert!(harness.notify(&handler, abs(0, 20)));
        assert!(harness.injected().is_empty());

        assert!(harness.notify(&handler, abs(0, 50)));
        assert!(harness.notify(&handler, abs(0, 90)));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1)]);

        assert!(harness.notify(&handler, abs(0, 10)));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 0)]);
    }

    #[test]
    fn test_negative_direction_with_percentage() {
        let mut harness = Harness::new();
        let handler = axis_button(&harness, -30);

        assert!(harness.notify(&handler, abs(0, 90)));
        assert!(harness.notify(&handler, abs(0, -20)));
        assert!(harness.injected().is_empty());

        assert!(harness.notify(&handler, abs(0, -30)));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1)]);

        assert!(harness.notify(&handler, abs(0, 0)));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 0)]);
    }

    #[test]
    fn test_unknown_range_is_not_handled() {
        let mut harness = Harness::new();
        let handler = axis_button(&harness, 1);
        harness.source.abs_ranges.clear();

        assert!(!harness.notify(&handler, abs(0, 100)));
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_other_axis_is_ignored() {
        let mut harness = Harness::new();
        let handler = axis_button(&harness, 1);

        assert!(!harness.notify(&handler, abs(1, 100)));
        assert!(harness.injected().is_empty());
    }
}
