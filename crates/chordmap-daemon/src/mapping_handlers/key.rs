//! Key output

use std::sync::Arc;

use chordmap_config::{value, EventCombination, InputEvent, Mapping, EV_KEY};

use super::{Context, HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;

/// Presses and releases one key on the output device.
pub struct KeyHandler {
    base: HandlerBase,
    code: u16,
    context: Context,
    active: bool,
}

impl KeyHandler {
    pub fn new(
        combination: &EventCombination,
        mapping: Arc<Mapping>,
        code: u16,
        context: Context,
    ) -> Self {
        Self {
            base: HandlerBase::new(combination, mapping),
            code,
            context,
            active: false,
        }
    }
}

impl InputEventHandler for KeyHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        _source: &DeviceInfo,
        _forward: &OutputSink,
        _suppress: bool,
    ) -> bool {
        tracing::debug!(
            "Writing key {} value {} to {}",
            self.code,
            event.value(),
            self.base.mapping.target_uinput
        );
        self.context.output.emit(EV_KEY, self.code, event.value());
        self.active = event.value() != value::RELEASE;
        true
    }

    fn reset(&mut self) {
        if self.active {
            self.context.output.emit(EV_KEY, self.code, value::RELEASE);
            self.active = false;
        }
    }
}

impl MappingHandler for KeyHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Key
    }

    fn base(&self) -> &HandlerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandlerBase {
        &mut self.base
    }

    fn wrap_with(&self) -> Vec<(EventCombination, HandlerKind)> {
        vec![(
            EventCombination::new(self.base.input_events.iter().copied()),
            HandlerKind::Combination,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_handlers::handler_ref;
    use crate::mapping_handlers::testing::{key, key_mapping, Harness};

    #[test]
    fn test_writes_mapped_key() {
        let mut harness = Harness::new();
        let mapping = key_mapping(&[(EV_KEY, 30, 1)], "b");
        let handler = handler_ref(KeyHandler::new(
            mapping.event_combination(),
            mapping.clone(),
            48,
            harness.context.clone(),
        ));

        assert!(harness.notify(&handler, key(30, 1)));
        assert!(harness.notify(&handler, key(30, 0)));
        assert_eq!(harness.injected(), vec![(EV_KEY, 48, 1), (EV_KEY, 48, 0)]);
        assert!(harness.forwarded().is_empty());
    }

    #[test]
    fn test_reset_releases_only_held_key() {
        let mut harness = Harness::new();
        let mapping = key_mapping(&[(EV_KEY, 30, 1)], "b");
        let handler = handler_ref(KeyHandler::new(
            mapping.event_combination(),
            mapping.clone(),
            48,
            harness.context.clone(),
        ));

        handler.lock().reset();
        assert!(harness.injected().is_empty());

        harness.notify(&handler, key(30, 1));
        handler.lock().reset();
        handler.lock().reset();
        assert_eq!(harness.injected(), vec![(EV_KEY, 48, 1), (EV_KEY, 48, 0)]);
    }

    #[test]
    fn test_wraps_with_combination() {
        let harness = Harness::new();
        let mapping = key_mapping(&[(EV_KEY, 29, 1), (EV_KEY, 30, 1)], "b");
        let handler = KeyHandler::new(
            mapping.event_combination(),
            mapping.clone(),
            48,
            harness.context.clone(),
        );

        let wrap = handler.wrap_with();
        assert_eq!(wrap.len(), 1);
        assert_eq!(wrap[0].0, *mapping.event_combination());
        assert_eq!(wrap[0].1, HandlerKind::Combination);
    }
}
