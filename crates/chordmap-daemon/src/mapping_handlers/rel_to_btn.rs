//! Relative motion as buttons

use std::sync::Arc;
use std::time::{Duration, Instant};

use chordmap_config::{value, EventAction, EventCombination, InputEvent, Mapping, EV_REL};
use tokio::task::JoinHandle;

use super::{Context, HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

/// Turns a relative axis into a button.
///
/// Relative axes have no resting position, so the button is held while
/// motion keeps arriving and released once none came for the mapping's
/// `release_timeout`. The timeout is noticed through a zero valued event the
/// handler feeds back into its own event reader.
pub struct RelToBtnHandler {
    base: HandlerBase,
    trigger: InputEvent,
    context: Context,
    release_timeout: Duration,
    active: bool,
    last_activation: Instant,
    timer: Option<JoinHandle<()>>,
}

impl RelToBtnHandler {
    /// Returns `None` unless `combination` is a single relative event with
    /// a direction and the mapping's `release_timeout` fits a [`Duration`].
    pub fn new(
        combination: &EventCombination,
        mapping: Arc<Mapping>,
        context: Context,
    ) -> Option<Self> {
        let trigger = match combination.events() {
            [event] if event.event_type() == EV_REL && event.value() != 0 => *event,
            _ => return None,
        };
        let release_timeout = Duration::try_from_secs_f64(mapping.release_timeout).ok()?;

        Some(Self {
            base: HandlerBase::new(combination, mapping),
            trigger,
            context,
            release_timeout,
            active: false,
            last_activation: Instant::now(),
            timer: None,
        })
    }

    /// Queue the zero event that releases the button if no further motion
    /// arrives in time.
    fn arm_release_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let context = self.context.clone();
        let timeout = self.release_timeout;
        let release = InputEvent::from_tuple(EV_REL, self.trigger.code(), 0);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            context.feed_back(release);
        }));
    }

    fn release(&mut self, source: &DeviceInfo, forward: &OutputSink) {
        self.active = false;
        let event = self
            .trigger
            .with_value(value::RELEASE)
            .with_action(EventAction::AsKey);
        self.base.notify_sub(event, source, forward, false);
    }
}

impl InputEventHandler for RelToBtnHandler {
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

        if event.value() == 0 {
            if self.active && self.last_activation.elapsed() >= self.release_timeout {
                self.release(source, forward);
            }
            return true;
        }

        let direction = self.trigger.value().signum();
        if event.value().signum() != direction {
            return false;
        }
        if event.value().abs() < self.trigger.value().abs() {
            return true;
        }

        self.last_activation = Instant::now();
        self.arm_release_timer();
        if self.active {
            return true;
        }

        self.active = true;
        let event = event
            .with_value(value::PRESS)
            .with_action(EventAction::AsKey);
        self.base.notify_sub(event, source, forward, suppress);
        true
    }

    fn reset(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.active = false;
        self.base.reset_sub();
    }
}

impl MappingHandler for RelToBtnHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::RelToBtn
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    fn describe(&self) -> String {
        format!("RelToBtn({})", self.trigger)
    }
}

impl Drop for RelToBtnHandler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
