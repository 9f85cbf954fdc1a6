//! Per-device event loop
//!
//! An [`EventReader`] owns the handler graph of one grabbed device. It reads
//! the device's events and the events its handlers feed back, in one ordered
//! stream, and forwards whatever no handler consumed to the device's virtual
//! twin.

use chordmap_config::{value, InputEvent, EV_KEY, SYN_REPORT};
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::device::{DeviceInfo, SourceEvent};
use crate::injector::OutputSink;
use crate::mapping_parser::HandlerGraph;

enum Incoming {
    Source(SourceEvent),
    Feedback(InputEvent),
}

pub struct EventReader {
    source: DeviceInfo,
    graph: HandlerGraph,
    forward: OutputSink,
}

impl EventReader {
    pub fn new(source: DeviceInfo, graph: HandlerGraph, forward: OutputSink) -> Self {
        Self {
            source,
            graph,
            forward,
        }
    }

    /// Handle one event read from the device.
    pub fn handle(&self, event: InputEvent) {
        if event.is_syn() {
            if event.code() == SYN_REPORT {
                self.forward.sync();
            }
            return;
        }
        // the forward device repeats keys on its own
        if event.event_type() == EV_KEY && event.value() == value::REPEAT {
            return;
        }

        if !self.graph.notify(event, &self.source, &self.forward) {
            self.forward.write_event(&event);
        }
    }

    /// Handle an event a handler fed back. These are never forwarded.
    pub fn handle_feedback(&self, event: InputEvent) {
        if !self.graph.notify(event, &self.source, &self.forward) {
            tracing::debug!("No handler took feedback {}", event);
        }
    }

    /// Release everything the handlers hold.
    pub fn reset(&self) {
        self.graph.reset();
    }

    /// Process events until the device disconnects or `stop` fires, then
    /// reset all handlers.
    pub async fn run<S>(
        self,
        events: S,
        feedback: mpsc::UnboundedReceiver<InputEvent>,
        mut stop: oneshot::Receiver<()>,
    ) where
        S: Stream<Item = SourceEvent>,
    {
        tracing::info!("Reading events from {}", self.source.name);

        let incoming = events
            .map(Incoming::Source)
            .merge(UnboundedReceiverStream::new(feedback).map(Incoming::Feedback));
        tokio::pin!(incoming);

        loop {
            let next = tokio::select! {
                next = incoming.next() => next,
                _ = &mut stop => {
                    tracing::debug!("Stopping reader of {}", self.source.name);
                    break;
                }
            };

            match next {
                Some(Incoming::Source(SourceEvent::Input(event))) => self.handle(event),
                Some(Incoming::Feedback(event)) => self.handle_feedback(event),
                Some(Incoming::Source(SourceEvent::Disconnected)) | None => {
                    tracing::info!("{} disconnected", self.source.name);
                    break;
                }
            }
        }

        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::SinkCommand;
    use crate::mapping_handlers::testing::{key, Harness};
    use crate::mapping_parser::parse_mappings;
    use chordmap_config::{EventCombination, Mapping, Preset, EV_REL, EV_SYN};

    const KEY_A: u16 = 30;
    const KEY_B: u16 = 48;
    const KEY_X: u16 = 45;

    fn reader(harness: &Harness, entries: &[(&[(u16, u16, i32)], &str)]) -> EventReader {
        let mut preset = Preset::new();
        for (combination, output) in entries {
            preset
                .add(Mapping::with_symbol(
                    EventCombination::from_tuples(combination),
                    "keyboard",
                    *output,
                ))
                .unwrap();
        }
        let graph = parse_mappings(&preset, &harness.context).unwrap();
        EventReader::new(harness.source.clone(), graph, harness.forward.clone())
    }

    fn syn() -> InputEvent {
        InputEvent::from_tuple(EV_SYN, SYN_REPORT, 0)
    }

    #[test]
    fn test_unmapped_events_are_forwarded() {
        let mut harness = Harness::new();
        let reader = reader(&harness, &[(&[(EV_KEY, KEY_A, 1)], "x")]);

        reader.handle(key(KEY_B, 1));
        reader.handle(syn());
        reader.handle(key(KEY_A, 1));
        reader.handle(syn());

        assert_eq!(harness.forwarded(), vec![(EV_KEY, KEY_B, 1)]);
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1)]);
    }

    #[test]
    fn test_syn_report_syncs_forward_device() {
        let harness = Harness::new();
        let reader = reader(&harness, &[]);
        let mut forwarded = harness.forwarded;

        reader.handle(InputEvent::from_tuple(EV_REL, 0, 5));
        reader.handle(syn());
        assert_eq!(
            forwarded.try_recv().unwrap(),
            SinkCommand::Write {
                event_type: EV_REL,
                code: 0,
                value: 5
            }
        );
        assert_eq!(forwarded.try_recv().unwrap(), SinkCommand::Sync);
    }

    #[test]
    fn test_key_repeats_are_dropped() {
        let mut harness = Harness::new();
        let reader = reader(&harness, &[(&[(EV_KEY, KEY_A, 1)], "x")]);

        reader.handle(key(KEY_A, 1));
        reader.handle(key(KEY_A, 2));
        reader.handle(key(KEY_B, 2));
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1)]);
        assert!(harness.forwarded().is_empty());
    }

    #[test]
    fn test_feedback_is_never_forwarded() {
        let mut harness = Harness::new();
        let reader = reader(&harness, &[]);

        reader.handle_feedback(key(KEY_B, 1));
        assert!(harness.forwarded().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_resets_handlers() {
        let mut harness = Harness::new();
        let reader = reader(&harness, &[(&[(EV_KEY, KEY_A, 1)], "x")]);
        let (_feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = oneshot::channel();

        let events = futures::stream::iter(vec![
            SourceEvent::Input(key(KEY_A, 1)),
            SourceEvent::Input(syn()),
            SourceEvent::Disconnected,
            SourceEvent::Input(key(KEY_B, 1)),
        ]);
        reader.run(events, feedback_rx, stop_rx).await;

        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1), (EV_KEY, KEY_X, 0)]);
        assert!(harness.forwarded().is_empty());
    }

    #[tokio::test]
    async fn test_stop_ends_reader() {
        let mut harness = Harness::new();
        let reader = reader(&harness, &[(&[(EV_KEY, KEY_A, 1)], "x")]);
        let (_feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(reader.run(
            UnboundedReceiverStream::new(events_rx),
            feedback_rx,
            stop_rx,
        ));
        events_tx.send(SourceEvent::Input(key(KEY_A, 1))).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        stop_tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(harness.injected(), vec![(EV_KEY, KEY_X, 1), (EV_KEY, KEY_X, 0)]);
    }
}
