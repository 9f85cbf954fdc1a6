//! Joysticks as mice and scroll wheels

use std::sync::Arc;
use std::time::Duration;

use chordmap_config::{EventAction, EventCombination, InputEvent, Mapping, EV_REL};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{Context, HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

const REL_WHEEL: u16 = 0x08;
const REL_HWHEEL: u16 = 0x06;
const REL_WHEEL_HI_RES: u16 = 0x0b;
const REL_HWHEEL_HI_RES: u16 = 0x0c;

/// Output units per second at full deflection and a gain of 1.
fn full_speed(code: u16) -> f64 {
    match code {
        REL_WHEEL | REL_HWHEEL => 10.0,
        REL_WHEEL_HI_RES | REL_HWHEEL_HI_RES => 1200.0,
        _ => 2400.0,
    }
}

/// Map a normalized deflection in [-1, 1] through deadzone, curve and gain.
pub(crate) fn shape(x: f64, deadzone: f64, expo: f64, gain: f64) -> f64 {
    let x = x.clamp(-1.0, 1.0);
    if x.abs() <= deadzone {
        return 0.0;
    }
    let x = x.signum() * (x.abs() - deadzone) / (1.0 - deadzone);

    let curved = if expo >= 0.0 {
        (1.0 - expo) * x + expo * x.powi(3)
    } else {
        let magnitude = x.abs();
        x.signum() * (magnitude * (1.0 + expo) + magnitude.cbrt() * -expo)
    };
    curved * gain
}

/// Turns the position of an absolute axis into a speed on a relative axis.
///
/// While the axis is deflected, a background task writes relative motion
/// at the mapping's `rel_rate`. Fractions are carried over between ticks so
/// slow speeds still move.
pub struct AbsToRelHandler {
    base: HandlerBase,
    axis: InputEvent,
    code: u16,
    context: Context,
    /// Current speed in output units per second
    speed: watch::Sender<f64>,
    task: Option<JoinHandle<()>>,
}

impl AbsToRelHandler {
    pub fn new(
        combination: &EventCombination,
        mapping: Arc<Mapping>,
        axis: InputEvent,
        code: u16,
        context: Context,
    ) -> Self {
        let (speed, _) = watch::channel(0.0);
        Self {
            base: HandlerBase::new(combination, mapping),
            axis,
            code,
            context,
            speed,
            task: None,
        }
    }

    fn start(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let rate = self.base.mapping.rel_rate.max(1);
        let speed = self.speed.subscribe();
        let sink = self.context.output.clone();
        let code = self.code;
        self.task = Some(tokio::spawn(emit_motion(sink, code, rate, speed)));
    }

    fn set_speed(&mut self, speed: f64) {
        self.speed.send_replace(speed);
        if speed != 0.0 {
            self.start();
        }
    }
}

/// Write motion while the speed is not zero, sleep while it is.
async fn emit_motion(sink: OutputSink, code: u16, rate: u32, mut speed: watch::Receiver<f64>) {
    let tick = Duration::from_secs_f64(1.0 / rate as f64);
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut remainder = 0.0;

    loop {
        let current = *speed.borrow_and_update();
        if current == 0.0 {
            remainder = 0.0;
            if speed.changed().await.is_err() {
                return;
            }
            interval.reset();
            continue;
        }

        interval.tick().await;
        let distance = current / rate as f64 + remainder;
        let whole = distance.trunc();
        remainder = distance - whole;
        if whole != 0.0 {
            sink.emit(EV_REL, code, whole as i32);
        }
    }
}

impl InputEventHandler for AbsToRelHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        source: &DeviceInfo,
        _forward: &OutputSink,
        _suppress: bool,
    ) -> bool {
        if event.type_and_code() != self.axis.type_and_code() {
            return false;
        }

        if event.action() == EventAction::Recenter {
            self.set_speed(0.0);
            return true;
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

        let center = (range.min as f64 + range.max as f64) / 2.0;
        let half = (range.max as f64 - range.min as f64) / 2.0;
        let mapping = &self.base.mapping;
        let shaped = shape(
            (event.value() as f64 - center) / half,
            mapping.deadzone,
            mapping.expo,
            mapping.gain,
        );
        self.set_speed(shaped * full_speed(self.code));
        true
    }

    fn reset(&mut self) {
        self.speed.send_replace(0.0);
    }
}

impl MappingHandler for AbsToRelHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::AbsToRel
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    fn wrap_with(&self) -> Vec<(EventCombination, HandlerKind)> {
        if self.base.input_events.len() > 1 {
            vec![(
                EventCombination::new(self.base.input_events.iter().copied()),
                HandlerKind::AxisSwitch,
            )]
        } else {
            Vec::new()
        }
    }
}

impl Drop for AbsToRelHandler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_handlers::handler_ref;
    use crate::mapping_handlers::testing::{abs, Harness};
    use chordmap_config::{EV_ABS, EV_KEY};

    const REL_X: u16 = 0;

    fn joystick_mapping(deadzone: f64) -> Arc<Mapping> {
        let mut mapping = Mapping::with_output_event(
            EventCombination::from_tuples(&[(EV_ABS, 0, 0)]),
            "mouse",
            EV_REL,
            REL_X,
        );
        mapping.deadzone = deadzone;
        mapping.rel_rate = 100;
        Arc::new(mapping)
    }

    fn handler(harness: &Harness, mapping: Arc<Mapping>) -> AbsToRelHandler {
        let combination = mapping.event_combination().clone();
        let axis = mapping.analog_input().unwrap();
        AbsToRelHandler::new(&combination, mapping, axis, REL_X, harness.context.clone())
    }

    #[test]
    fn test_shape() {
        assert_eq!(shape(0.05, 0.1, 0.0, 1.0), 0.0);
        assert_eq!(shape(1.0, 0.1, 0.0, 1.0), 1.0);
        assert!((shape(0.55, 0.1, 0.0, 1.0) - 0.5).abs() < 1e-9);
        assert!((shape(-0.55, 0.1, 0.0, 2.0) + 1.0).abs() < 1e-9);
        assert_eq!(shape(3.0, 0.0, 0.0, 1.0), 1.0);

        // curves keep the end points
        assert!((shape(1.0, 0.0, 1.0, 1.0) - 1.0).abs() < 1e-9);
        assert!((shape(-1.0, 0.0, -1.0, 1.0) + 1.0).abs() < 1e-9);
        // and bend the middle
        assert!(shape(0.5, 0.0, 0.5, 1.0) < 0.5);
        assert!(shape(0.5, 0.0, -0.5, 1.0) > 0.5);
    }

    #[tokio::test]
    async fn test_deflection_moves_until_centered() {
        let mut harness = Harness::new();
        let handler = handler_ref(handler(&harness, joystick_mapping(0.1)));

        assert!(harness.notify(&handler, abs(0, 100)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let moved = harness.injected();
        assert!(!moved.is_empty());
        assert!(moved
            .iter()
            .all(|&(event_type, code, value)| event_type == EV_REL && code == REL_X && value > 0));

        assert!(harness.notify(&handler, abs(0, 0)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        harness.injected();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.injected().is_empty());
    }

    #[tokio::test]
    async fn test_deadzone_and_recenter() {
        let mut harness = Harness::new();
        let handler = handler_ref(handler(&harness, joystick_mapping(0.5)));

        harness.notify(&handler, abs(0, -40));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.injected().is_empty());

        harness.notify(&handler, abs(0, -100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness
            .injected()
            .iter()
            .all(|&(_, _, value)| value < 0));

        let recenter = abs(0, 0).with_action(EventAction::Recenter);
        assert!(harness.notify(&handler, recenter));
        tokio::time::sleep(Duration::from_millis(30)).await;
        harness.injected();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.injected().is_empty());
    }

    #[test]
    fn test_wrapped_by_axis_switch_with_buttons() {
        let harness = Harness::new();
        let single = handler(&harness, joystick_mapping(0.1));
        assert!(!single.needs_wrapping());

        let mapping = Arc::new(Mapping::with_output_event(
            EventCombination::from_tuples(&[(EV_KEY, 30, 1), (EV_ABS, 0, 0)]),
            "mouse",
            EV_REL,
            REL_X,
        ));
        let switched = handler(&harness, mapping);
        assert_eq!(switched.wrap_with()[0].1, HandlerKind::AxisSwitch);
    }
}
