//! Macro output

use std::sync::Arc;
use std::time::Duration;

use chordmap_config::{value, EventCombination, InputEvent, Macro, Mapping};

use super::{Context, HandlerBase, HandlerKind, InputEventHandler, MappingHandler};
use crate::device::DeviceInfo;
use crate::injector::OutputSink;
use crate::macro_executor::{MacroExecutor, MacroRun};

/// Starts a macro when its combination goes down and tells it when the
/// combination is released.
pub struct MacroHandler {
    base: HandlerBase,
    program: Arc<Macro>,
    executor: MacroExecutor,
    run: Option<MacroRun>,
}

impl MacroHandler {
    pub fn new(
        combination: &EventCombination,
        mapping: Arc<Mapping>,
        program: Macro,
        context: Context,
    ) -> Self {
        let key_sleep = Duration::from_millis(mapping.macro_key_sleep_ms);
        Self {
            base: HandlerBase::new(combination, mapping),
            program: Arc::new(program),
            executor: MacroExecutor::new(context.output, key_sleep),
            run: None,
        }
    }
}

impl InputEventHandler for MacroHandler {
    fn notify(
        &mut self,
        event: InputEvent,
        _source: &DeviceInfo,
        _forward: &OutputSink,
        _suppress: bool,
    ) -> bool {
        match event.value() {
            value::PRESS => match &self.run {
                Some(run) if run.is_running() => {
                    tracing::debug!("Macro {} is still running", self.program);
                    run.press();
                }
                _ => {
                    self.run = Some(self.executor.spawn(self.program.clone()));
                }
            },
            value::RELEASE => {
                if let Some(run) = &self.run {
                    run.release();
                }
            }
            _ => {}
        }
        true
    }

    fn reset(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel();
        }
    }
}

impl MappingHandler for MacroHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Macro
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
    use crate::mapping_handlers::testing::{key, Harness};
    use crate::mapping_handlers::{handler_ref, CombinationHandler, HandlerRef};
    use chordmap_config::EV_KEY;

    const KEY_A: u16 = 30;
    const KEY_B: u16 = 48;
    const KEY_X: u16 = 45;

    /// Combination of A and B running `code` with a 5 ms key pause.
    fn chord_macro(harness: &Harness, code: &str) -> HandlerRef {
        let mut mapping = Mapping::with_symbol(
            EventCombination::from_tuples(&[(EV_KEY, KEY_A, 1), (EV_KEY, KEY_B, 1)]),
            "keyboard",
            code,
        );
        mapping.macro_key_sleep_ms = 5;
        let mapping = Arc::new(mapping);
        let combination = mapping.event_combination().clone();

        let program = Macro::parse(code).unwrap();
        let macro_handler = MacroHandler::new(
            &combination,
            mapping.clone(),
            program,
            harness.context.clone(),
        );
        let mut handler = CombinationHandler::new(&combination, mapping);
        handler.set_sub_handler(handler_ref(macro_handler));
        handler_ref(handler)
    }

    fn stuck(events: &[(u16, u16, i32)]) -> bool {
        let mut down = std::collections::HashSet::new();
        for &(_, code, value) in events {
            if value == 0 {
                down.remove(&code);
            } else {
                down.insert(code);
            }
        }
        !down.is_empty()
    }

    #[tokio::test]
    async fn test_release_stops_hold_macro() {
        let mut harness = Harness::new();
        let handler = chord_macro(&harness, "hold(key(x))");

        harness.notify(&handler, key(KEY_A, 1));
        harness.notify(&handler, key(KEY_B, 1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        harness.notify(&handler, key(KEY_A, 0));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = harness.injected();
        assert!(events.contains(&(EV_KEY, KEY_X, 1)));
        assert!(!stuck(&events), "key left down: {:?}", events);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(harness.injected().is_empty());
    }

    #[tokio::test]
    async fn test_reset_cancels_macro() {
        let mut harness = Harness::new();
        let handler = chord_macro(&harness, "key_down(x).wait(5000).key(b)");

        harness.notify(&handler, key(KEY_A, 1));
        harness.notify(&handler, key(KEY_B, 1));
        tokio::time::sleep(Duration::from_millis(20)).await;

        handler.lock().reset();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            harness.injected(),
            vec![(EV_KEY, KEY_X, 1), (EV_KEY, KEY_X, 0)]
        );
    }

    #[tokio::test]
    async fn test_running_macro_is_not_restarted() {
        let mut harness = Harness::new();
        let handler = chord_macro(&harness, "key(x).wait(60)");

        harness.notify(&handler, key(KEY_A, 1));
        harness.notify(&handler, key(KEY_B, 1));
        harness.notify(&handler, key(KEY_B, 0));
        harness.notify(&handler, key(KEY_B, 1));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            harness.injected(),
            vec![(EV_KEY, KEY_X, 1), (EV_KEY, KEY_X, 0)]
        );
    }
}
