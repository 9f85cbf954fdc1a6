//! The event value type shared by presets and the injection pipeline
//!
//! An [`InputEvent`] is an immutable `(type, code, value)` sample with an
//! informational timestamp and an [`EventAction`] tag. Equality and hashing
//! deliberately ignore both the timestamp and the action: two events are the
//! same event when they have the same type, code and value.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CreationError;
use crate::keys::code_name;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

pub const SYN_REPORT: u16 = 0;

/// Code of the left mouse button.
pub const BTN_LEFT: u16 = 0x110;

/// Key event values.
pub mod value {
    pub const RELEASE: i32 = 0;
    pub const PRESS: i32 = 1;
    pub const REPEAT: i32 = 2;
}

/// Tag changing how downstream handlers interpret an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventAction {
    #[default]
    None,
    /// Treat the event as a discrete key press or release.
    AsKey,
    /// Move the axis back to its resting position.
    Recenter,
}

/// A single input sample.
#[derive(Debug, Clone, Copy)]
pub struct InputEvent {
    sec: i64,
    usec: i64,
    event_type: u16,
    code: u16,
    value: i32,
    action: EventAction,
}

impl InputEvent {
    pub fn new(sec: i64, usec: i64, event_type: u16, code: u16, value: i32) -> Self {
        Self {
            sec,
            usec,
            event_type,
            code,
            value,
            action: EventAction::None,
        }
    }

    /// Event without a timestamp, as synthesized by handlers and presets.
    pub fn from_tuple(event_type: u16, code: u16, value: i32) -> Self {
        Self::new(0, 0, event_type, code, value)
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self::from_tuple(EV_KEY, code, value)
    }

    pub fn btn_left() -> Self {
        Self::key(BTN_LEFT, value::PRESS)
    }

    /// Convert a raw sample read from a device.
    pub fn from_evdev(event: &evdev::InputEvent) -> Self {
        let (sec, usec) = match event.timestamp().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => (elapsed.as_secs() as i64, elapsed.subsec_micros() as i64),
            Err(_) => (0, 0),
        };
        Self::new(sec, usec, event.event_type().0, event.code(), event.value())
    }

    /// Build an event from numeric fields: `[type, code, value]` or
    /// `[sec, usec, type, code, value]`.
    pub fn from_slice(fields: &[i64]) -> Result<Self, CreationError> {
        let describe = || format!("{:?}", fields);
        let (sec, usec, rest) = match fields.len() {
            3 => (0, 0, fields),
            5 => (fields[0], fields[1], &fields[2..]),
            n => {
                return Err(CreationError::new(
                    describe(),
                    format!("expected 3 or 5 fields, got {}", n),
                ))
            }
        };

        let event_type = u16::try_from(rest[0])
            .map_err(|_| CreationError::new(describe(), "type out of range"))?;
        let code = u16::try_from(rest[1])
            .map_err(|_| CreationError::new(describe(), "code out of range"))?;
        let value = i32::try_from(rest[2])
            .map_err(|_| CreationError::new(describe(), "value out of range"))?;

        Ok(Self::new(sec, usec, event_type, code, value))
    }

    /// Parse the canonical `type,code,value` encoding.
    pub fn from_string(input: &str) -> Result<Self, CreationError> {
        let fields = input
            .split(',')
            .map(|field| {
                field.trim().parse::<i64>().map_err(|_| {
                    CreationError::new(input, format!("{:?} is not a number", field.trim()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if fields.len() != 3 {
            return Err(CreationError::new(
                input,
                format!("expected type,code,value but got {} fields", fields.len()),
            ));
        }

        Self::from_slice(&fields)
    }

    pub fn sec(&self) -> i64 {
        self.sec
    }

    pub fn usec(&self) -> i64 {
        self.usec
    }

    pub fn event_type(&self) -> u16 {
        self.event_type
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn action(&self) -> EventAction {
        self.action
    }

    /// Timestamp in seconds.
    pub fn timestamp(&self) -> f64 {
        self.sec as f64 + self.usec as f64 / 1_000_000.0
    }

    pub fn type_and_code(&self) -> (u16, u16) {
        (self.event_type, self.code)
    }

    pub fn event_tuple(&self) -> (u16, u16, i32) {
        (self.event_type, self.code, self.value)
    }

    /// True for native key events and for events tagged [`EventAction::AsKey`].
    pub fn is_key_event(&self) -> bool {
        self.event_type == EV_KEY || self.action == EventAction::AsKey
    }

    pub fn is_syn(&self) -> bool {
        self.event_type == EV_SYN
    }

    pub fn with_value(self, value: i32) -> Self {
        Self { value, ..self }
    }

    pub fn with_action(self, action: EventAction) -> Self {
        Self { action, ..self }
    }

    pub fn with_type_and_code(self, event_type: u16, code: u16) -> Self {
        Self {
            event_type,
            code,
            ..self
        }
    }

    /// Copy carrying the current wall-clock time.
    pub fn stamped(self) -> Self {
        let (sec, usec) = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(now) => (now.as_secs() as i64, now.subsec_micros() as i64),
            Err(_) => (0, 0),
        };
        Self { sec, usec, ..self }
    }

    /// Canonical `type,code,value` encoding used in preset files.
    pub fn json_str(&self) -> String {
        format!("{},{},{}", self.event_type, self.code, self.value)
    }

    /// Name of the code, e.g. `KEY_A` or `ABS_X`.
    pub fn code_name(&self) -> String {
        code_name(self.event_type, self.code)
    }

    /// Direction or state as a short word.
    pub fn describe_value(&self) -> String {
        match (self.event_type, self.value) {
            (EV_KEY, value::RELEASE) => "up".to_string(),
            (EV_KEY, value::PRESS) => "down".to_string(),
            (EV_KEY, value::REPEAT) => "repeat".to_string(),
            (EV_ABS | EV_REL, 0) => "axis".to_string(),
            (EV_ABS | EV_REL, v) if v > 0 => format!("+{}", v),
            (_, v) => v.to_string(),
        }
    }
}

impl PartialEq for InputEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event_tuple() == other.event_tuple()
    }
}

impl Eq for InputEvent {}

impl Hash for InputEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_tuple().hash(state);
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<InputEvent {} ({}) {}>",
            self.code_name(),
            self.code,
            self.describe_value()
        )
    }
}
