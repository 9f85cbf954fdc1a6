//! Scaled relative motion

use std::sync::Arc;

use chordmap_config::{EventAction, EventCombination, InputEvent, Mapping, EV_REL};

use super::{Context, HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

/// Size of one unit of a relative axis, in mouse movement units.
fn unit(code: u16) -> f64 {
    match code {
        // REL_HWHEEL, REL_WHEEL
        0x06 | 0x08 => 30.0,
        // REL_WHEEL_HI_RES, REL_HWHEEL_HI_RES
        0x0b | 0x0c => 0.25,
        _ => 1.0,
    }
}

/// Converts motion on one relative axis to motion on another, e.g. a mouse
/// axis into scrolling.
pub struct RelToRelHandler {
    base: HandlerBase,
    axis: InputEvent,
    code: u16,
    context: Context,
    /// Fraction of an output unit not written yet
    remainder: f64,
}

impl RelToRelHandler {
    pub fn new(
        combination: &EventCombination,
        mapping: Arc<Mapping>,
        axis: InputEvent,
        code: u16,
        context: Context,
    ) -> Self {
        Self {
            base: HandlerBase::new(combination, mapping),
            axis,
            code,
            context,
            remainder: 0.0,
        }
    }
}

impl InputEventHandler for RelToRelHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        _source: &DeviceInfo,
        _forward: &OutputSink,
        _suppress: bool,
    ) -> bool {
        if event.type_and_code() != self.axis.type_and_code() {
            return false;
        }
        if event.action() == EventAction::Recenter {
            self.remainder = 0.0;
            return true;
        }

        let scale = unit(event.code()) / unit(self.code) * self.base.mapping.gain;
        let distance = event.value() as f64 * scale + self.remainder;
        let whole = distance.trunc();
        self.remainder = distance - whole;

        if whole != 0.0 {
            self.context.output.emit(EV_REL, self.code, whole as i32);
        }
        true
    }

    fn reset(&mut self) {
        self.remainder = 0.0;
    }
}

impl MappingHandler for RelToRelHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::RelToRel
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
