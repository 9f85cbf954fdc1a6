//! Macro execution for key sequences with delays
//!
//! This module provides the [`MacroExecutor`] which runs parsed
//! [`Macro`](chordmap_config::Macro)s as tokio tasks. Every pause is a
//! suspension point, so a running macro never blocks event processing. The
//! handler that started a run steers it through its [`MacroRun`]: releasing
//! the trigger ends `hold` blocks, cancelling stops the run. Keys a macro
//! pressed are released whenever and however the run ends.

use std::sync::Arc;
use std::time::Duration;

use chordmap_config::{value, Macro, MacroTask, EV_KEY};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::injector::OutputSink;

/// Pause between two rounds of a `hold` body, so bodies without any pause
/// don't spin.
const HOLD_ROUND_PAUSE: Duration = Duration::from_millis(1);

/// State of the trigger that started a macro run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Held,
    Released,
    /// Stop as soon as possible.
    Cancelled,
}

/// Why a run stopped before the end of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Released,
    Cancelled,
}

/// Spawns macro runs that write through an [`OutputSink`].
///
/// `MacroExecutor` is `Clone` and cheap to clone since it only holds a sink
/// handle. This allows it to be easily passed into spawned async tasks.
///
/// # Example
///
/// ```ignore
/// let executor = MacroExecutor::new(context.output.clone(), Duration::from_millis(20));
/// let run = executor.spawn(Arc::new(Macro::parse("hold(key(a))")?));
/// // ...
/// run.release();
/// ```
#[derive(Debug, Clone)]
pub struct MacroExecutor {
    sink: OutputSink,
    key_sleep: Duration,
}

impl MacroExecutor {
    /// Create a new `MacroExecutor`.
    ///
    /// # Arguments
    ///
    /// * `sink` - Where injected events are written
    /// * `key_sleep` - Pause after each press and each release of `key(..)`
    pub fn new(sink: OutputSink, key_sleep: Duration) -> Self {
        Self { sink, key_sleep }
    }

    /// Start running a macro with its trigger held. Must be called from
    /// within a tokio runtime.
    pub fn spawn(&self, program: Arc<Macro>) -> MacroRun {
        let (trigger, receiver) = watch::channel(Trigger::Held);
        let run = Run {
            sink: self.sink.clone(),
            key_sleep: self.key_sleep,
            trigger: receiver,
            held: Vec::new(),
            hold_depth: 0,
        };
        let task = tokio::spawn(run.execute(program));
        MacroRun { trigger, task }
    }
}

/// Handle to one running macro. Dropping it cancels the run.
#[derive(Debug)]
pub struct MacroRun {
    trigger: watch::Sender<Trigger>,
    task: JoinHandle<()>,
}

impl MacroRun {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// The trigger went down again while the run was still going.
    pub fn press(&self) {
        self.set(Trigger::Held);
    }

    pub fn release(&self) {
        self.set(Trigger::Released);
    }

    pub fn cancel(&self) {
        self.trigger.send_replace(Trigger::Cancelled);
    }

    /// Wait until the run has ended and released its keys.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Macro task failed: {}", e);
        }
    }

    fn set(&self, state: Trigger) {
        // a cancelled run stays cancelled
        self.trigger.send_if_modified(|current| {
            if *current == Trigger::Cancelled || *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// The state of one macro task
struct Run {
    sink: OutputSink,
    key_sleep: Duration,
    trigger: watch::Receiver<Trigger>,
    /// Keys this run pressed and did not release yet, in press order
    held: Vec<u16>,
    /// Releasing the trigger interrupts pauses only inside `hold`.
    hold_depth: usize,
}

impl Run {
    async fn execute(mut self, program: Arc<Macro>) {
        tracing::debug!("Running macro {}", program);

        match self.run_tasks(program.tasks()).await {
            Ok(()) => tracing::debug!("Macro {} finished", program),
            Err(interrupt) => tracing::debug!("Macro {} stopped: {:?}", program, interrupt),
        }

        for code in std::mem::take(&mut self.held).into_iter().rev() {
            self.sink.emit(EV_KEY, code, value::RELEASE);
        }
    }

    fn run_tasks<'a>(&'a mut self, tasks: &'a [MacroTask]) -> BoxFuture<'a, Result<(), Interrupt>> {
        async move {
            for task in tasks {
                self.check()?;
                match task {
                    MacroTask::Key(code) => {
                        self.press(*code);
                        self.sleep(self.key_sleep).await?;
                        self.release(*code);
                        self.sleep(self.key_sleep).await?;
                    }
                    MacroTask::KeyDown(code) => self.press(*code),
                    MacroTask::KeyUp(code) => self.release(*code),
                    MacroTask::Wait(ms) => self.sleep(Duration::from_millis(*ms)).await?,
                    MacroTask::Repeat { count, body } => {
                        for _ in 0..*count {
                            self.run_tasks(body.tasks()).await?;
                        }
                    }
                    MacroTask::Modify { modifier, body } => {
                        self.press(*modifier);
                        let result = self.run_tasks(body.tasks()).await;
                        self.release(*modifier);
                        result?;
                    }
                    MacroTask::HoldKey(code) => {
                        self.press(*code);
                        let result = self.wait_for_release().await;
                        self.release(*code);
                        result?;
                    }
                    MacroTask::Hold(None) => self.wait_for_release().await?,
                    MacroTask::Hold(Some(body)) => self.hold(body).await?,
                    MacroTask::Event {
                        event_type,
                        code,
                        value: event_value,
                    } => {
                        self.sink.emit(*event_type, *code, *event_value);
                        if *event_type == EV_KEY {
                            self.held.retain(|held| held != code);
                            if *event_value != value::RELEASE {
                                self.held.push(*code);
                            }
                        }
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Repeat `body` while the trigger is held. Stops right away on release
    /// and releases whatever the body pressed.
    async fn hold(&mut self, body: &Macro) -> Result<(), Interrupt> {
        let held_before = self.held.clone();
        self.hold_depth += 1;

        let result = loop {
            if *self.trigger.borrow() != Trigger::Held {
                break self.check_cancelled();
            }
            let round = match self.run_tasks(body.tasks()).await {
                Ok(()) => self.sleep(HOLD_ROUND_PAUSE).await,
                Err(interrupt) => Err(interrupt),
            };
            match round {
                Ok(()) => continue,
                Err(Interrupt::Released) => break Ok(()),
                Err(Interrupt::Cancelled) => break Err(Interrupt::Cancelled),
            }
        };

        self.hold_depth -= 1;
        let pressed_inside: Vec<u16> = self
            .held
            .iter()
            .filter(|code| !held_before.contains(code))
            .copied()
            .collect();
        for code in pressed_inside.into_iter().rev() {
            self.release(code);
        }
        result
    }

    async fn wait_for_release(&mut self) -> Result<(), Interrupt> {
        loop {
            let state = *self.trigger.borrow_and_update();
            match state {
                Trigger::Held => {}
                Trigger::Released => return Ok(()),
                Trigger::Cancelled => return Err(Interrupt::Cancelled),
            }
            if self.trigger.changed().await.is_err() {
                return Err(Interrupt::Cancelled);
            }
        }
    }

    async fn sleep(&mut self, duration: Duration) -> Result<(), Interrupt> {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            self.check()?;
            tokio::select! {
                _ = &mut deadline => return Ok(()),
                changed = self.trigger.changed() => {
                    if changed.is_err() {
                        return Err(Interrupt::Cancelled);
                    }
                }
            }
        }
    }

    fn check(&self) -> Result<(), Interrupt> {
        match *self.trigger.borrow() {
            Trigger::Cancelled => Err(Interrupt::Cancelled),
            Trigger::Released if self.hold_depth > 0 => Err(Interrupt::Released),
            _ => Ok(()),
        }
    }

    fn check_cancelled(&self) -> Result<(), Interrupt> {
        match *self.trigger.borrow() {
            Trigger::Cancelled => Err(Interrupt::Cancelled),
            _ => Ok(()),
        }
    }

    fn press(&mut self, code: u16) {
        self.sink.emit(EV_KEY, code, value::PRESS);
        self.held.retain(|held| *held != code);
        self.held.push(code);
    }

    fn release(&mut self, code: u16) {
        self.sink.emit(EV_KEY, code, value::RELEASE);
        self.held.retain(|held| *held != code);
    }
}
