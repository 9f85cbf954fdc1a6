//! A single remapping rule

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event_combination::EventCombination;
use crate::input_event::{InputEvent, EV_ABS, EV_KEY, EV_REL};
use crate::keys::{parse_key, DISABLE_SYMBOL};
use crate::macros::{is_macro, Macro};

/// Names of the virtual output devices a mapping can target.
pub const TARGET_UINPUTS: &[&str] = &["keyboard", "mouse", "gamepad", "keyboard + mouse"];

/// Longest accepted `release_timeout`, in seconds.
pub const MAX_RELEASE_TIMEOUT: f64 = 60.0;

/// Default values of the optional mapping fields. Fields holding their
/// default are omitted from preset files.
pub mod defaults {
    pub const MACRO_KEY_SLEEP_MS: u64 = 20;
    pub const RELEASE_TIMEOUT: f64 = 0.05;
    pub const DEADZONE: f64 = 0.1;
    pub const GAIN: f64 = 1.0;
    pub const EXPO: f64 = 0.0;
    pub const REL_RATE: u32 = 60;
    pub const RELEASE_COMBINATION_KEYS: bool = true;
}

fn default_macro_key_sleep_ms() -> u64 {
    defaults::MACRO_KEY_SLEEP_MS
}
fn default_release_timeout() -> f64 {
    defaults::RELEASE_TIMEOUT
}
fn default_deadzone() -> f64 {
    defaults::DEADZONE
}
fn default_gain() -> f64 {
    defaults::GAIN
}
fn default_expo() -> f64 {
    defaults::EXPO
}
fn default_rel_rate() -> u32 {
    defaults::REL_RATE
}
fn default_release_combination_keys() -> bool {
    defaults::RELEASE_COMBINATION_KEYS
}

fn is_default_macro_key_sleep_ms(v: &u64) -> bool {
    *v == defaults::MACRO_KEY_SLEEP_MS
}
fn is_default_release_timeout(v: &f64) -> bool {
    *v == defaults::RELEASE_TIMEOUT
}
fn is_default_deadzone(v: &f64) -> bool {
    *v == defaults::DEADZONE
}
fn is_default_gain(v: &f64) -> bool {
    *v == defaults::GAIN
}
fn is_default_expo(v: &f64) -> bool {
    *v == defaults::EXPO
}
fn is_default_rel_rate(v: &u32) -> bool {
    *v == defaults::REL_RATE
}
fn is_default_release_combination_keys(v: &bool) -> bool {
    *v == defaults::RELEASE_COMBINATION_KEYS
}

/// What a mapping produces once its combination triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingOutput {
    /// Swallow the combination.
    Disable,
    Key(u16),
    Macro(Macro),
    /// Continuous output on a relative or absolute axis.
    Axis { event_type: u16, code: u16 },
}

/// Binds an [`EventCombination`] to an output.
///
/// The combination is the key of the mapping inside a
/// [`Preset`](crate::Preset) and is therefore not part of the serialized
/// body. Once a mapping is stored in a preset, its combination only changes
/// through [`Preset::rename`](crate::Preset::rename).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mapping {
    #[serde(skip)]
    event_combination: EventCombination,

    /// Which virtual device the output is written to.
    pub target_uinput: String,

    /// Key symbol, macro, or `disable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_symbol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_code: Option<u16>,

    /// Pause between the press and release of each macro key.
    #[serde(
        default = "default_macro_key_sleep_ms",
        skip_serializing_if = "is_default_macro_key_sleep_ms"
    )]
    pub macro_key_sleep_ms: u64,

    /// Seconds without relative motion after which a button made from a
    /// relative axis is released.
    #[serde(
        default = "default_release_timeout",
        skip_serializing_if = "is_default_release_timeout"
    )]
    pub release_timeout: f64,

    /// Fraction of the absolute range around the center that is ignored.
    #[serde(default = "default_deadzone", skip_serializing_if = "is_default_deadzone")]
    pub deadzone: f64,

    #[serde(default = "default_gain", skip_serializing_if = "is_default_gain")]
    pub gain: f64,

    /// Response curve between linear (0) and strongly curved (-1 or 1).
    #[serde(default = "default_expo", skip_serializing_if = "is_default_expo")]
    pub expo: f64,

    /// Rate in Hz at which relative motion is emitted for a held axis.
    #[serde(default = "default_rel_rate", skip_serializing_if = "is_default_rel_rate")]
    pub rel_rate: u32,

    /// Release the combination's own keys on the forward device once the
    /// combination triggers.
    #[serde(
        default = "default_release_combination_keys",
        skip_serializing_if = "is_default_release_combination_keys"
    )]
    pub release_combination_keys: bool,
}

impl Mapping {
    pub fn new(event_combination: EventCombination, target_uinput: impl Into<String>) -> Self {
        Self {
            event_combination,
            target_uinput: target_uinput.into(),
            output_symbol: None,
            output_type: None,
            output_code: None,
            macro_key_sleep_ms: defaults::MACRO_KEY_SLEEP_MS,
            release_timeout: defaults::RELEASE_TIMEOUT,
            deadzone: defaults::DEADZONE,
            gain: defaults::GAIN,
            expo: defaults::EXPO,
            rel_rate: defaults::REL_RATE,
            release_combination_keys: defaults::RELEASE_COMBINATION_KEYS,
        }
    }

    /// Mapping producing a key symbol or macro.
    pub fn with_symbol(
        event_combination: EventCombination,
        target_uinput: impl Into<String>,
        output_symbol: impl Into<String>,
    ) -> Self {
        Self {
            output_symbol: Some(output_symbol.into()),
            ..Self::new(event_combination, target_uinput)
        }
    }

    /// Mapping producing a raw event type and code.
    pub fn with_output_event(
        event_combination: EventCombination,
        target_uinput: impl Into<String>,
        output_type: u16,
        output_code: u16,
    ) -> Self {
        Self {
            output_type: Some(output_type),
            output_code: Some(output_code),
            ..Self::new(event_combination, target_uinput)
        }
    }

    /// Decode the body of a preset entry.
    pub fn from_json(
        event_combination: EventCombination,
        body: serde_json::Value,
    ) -> Result<Self, ValidationError> {
        let mut mapping: Mapping =
            serde_json::from_value(body).map_err(|e| ValidationError {
                combination: event_combination.json_str(),
                message: e.to_string(),
            })?;
        mapping.event_combination = event_combination;
        Ok(mapping)
    }

    pub fn event_combination(&self) -> &EventCombination {
        &self.event_combination
    }

    pub(crate) fn set_event_combination(&mut self, event_combination: EventCombination) {
        self.event_combination = event_combination;
    }

    /// The input event that drives an axis output: an analog event with value 0.
    pub fn analog_input(&self) -> Option<InputEvent> {
        self.event_combination
            .iter()
            .find(|event| is_analog(event))
            .copied()
    }

    pub fn is_axis_mapping(&self) -> bool {
        matches!(self.output_type, Some(EV_REL) | Some(EV_ABS))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check every rule required to build handlers for this mapping.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fail = |message: String| {
            Err(ValidationError {
                combination: self.event_combination.json_str(),
                message,
            })
        };

        if self.event_combination.is_empty() {
            return fail("the combination is empty".to_string());
        }
        if !TARGET_UINPUTS.contains(&self.target_uinput.as_str()) {
            return fail(format!("unknown target {:?}", self.target_uinput));
        }
        if !(0.0..1.0).contains(&self.deadzone) {
            return fail(format!("deadzone {} is outside [0, 1)", self.deadzone));
        }
        if !(-1.0..=1.0).contains(&self.expo) {
            return fail(format!("expo {} is outside [-1, 1]", self.expo));
        }
        if self.rel_rate == 0 {
            return fail("rel_rate must be positive".to_string());
        }
        if !(self.release_timeout > 0.0 && self.release_timeout <= MAX_RELEASE_TIMEOUT) {
            return fail(format!(
                "release_timeout {} is outside (0, {}]",
                self.release_timeout, MAX_RELEASE_TIMEOUT
            ));
        }

        let analog_inputs = self
            .event_combination
            .iter()
            .filter(|event| is_analog(event))
            .count();

        match self.output() {
            Err(message) => fail(message),
            Ok(MappingOutput::Axis { .. }) if analog_inputs != 1 => fail(format!(
                "an axis output needs exactly one analog input, found {}",
                analog_inputs
            )),
            Ok(MappingOutput::Key(_) | MappingOutput::Macro(_)) if analog_inputs > 0 => {
                fail("analog inputs can only be mapped to an axis or disabled".to_string())
            }
            Ok(MappingOutput::Disable) if analog_inputs > 1 => {
                fail("only one analog input can be disabled per mapping".to_string())
            }
            Ok(_) => Ok(()),
        }
    }

    /// Resolve the configured output.
    pub fn output(&self) -> Result<MappingOutput, String> {
        match (&self.output_symbol, self.output_type, self.output_code) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                Err("output_symbol and output_type/output_code are mutually exclusive".to_string())
            }
            (Some(symbol), None, None) => {
                let symbol = symbol.trim();
                if symbol == DISABLE_SYMBOL {
                    Ok(MappingOutput::Disable)
                } else if is_macro(symbol) {
                    Macro::parse(symbol)
                        .map(MappingOutput::Macro)
                        .map_err(|e| format!("invalid macro: {}", e))
                } else {
                    parse_key(symbol)
                        .map(|key| MappingOutput::Key(key.code()))
                        .ok_or_else(|| format!("unknown output symbol {:?}", symbol))
                }
            }
            (None, Some(EV_KEY), Some(code)) => Ok(MappingOutput::Key(code)),
            (None, Some(EV_REL), Some(code)) => Ok(MappingOutput::Axis {
                event_type: EV_REL,
                code,
            }),
            (None, Some(EV_ABS), Some(_)) => {
                Err("absolute axis output is not supported".to_string())
            }
            (None, Some(event_type), Some(_)) => {
                Err(format!("unsupported output type {}", event_type))
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                Err("output_type and output_code must be set together".to_string())
            }
            (None, None, None) => Err("no output configured".to_string()),
        }
    }
}

/// An axis event used as continuous input rather than as a button.
pub fn is_analog(event: &InputEvent) -> bool {
    matches!(event.event_type(), EV_ABS | EV_REL) && event.value() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key_combination() -> EventCombination {
        EventCombination::from_tuples(&[(EV_KEY, 30, 1)])
    }

    #[test]
    fn test_key_mapping_is_valid() {
        let mapping = Mapping::with_symbol(key_combination(), "keyboard", "b");
        assert!(mapping.is_valid());
        assert_eq!(mapping.output(), Ok(MappingOutput::Key(48)));
    }

    #[test]
    fn test_macro_and_disable_outputs() {
        let mapping = Mapping::with_symbol(key_combination(), "keyboard", "key(a).key(b)");
        assert!(matches!(mapping.output(), Ok(MappingOutput::Macro(_))));
        assert!(mapping.is_valid());

        let mapping = Mapping::with_symbol(key_combination(), "keyboard", "disable");
        assert_eq!(mapping.output(), Ok(MappingOutput::Disable));
    }

    #[test]
    fn test_missing_output_is_invalid() {
        let mapping = Mapping::new(key_combination(), "keyboard");
        let err = mapping.validate().unwrap_err();
        assert_eq!(err.combination, "1,30,1");
        assert!(err.message.contains("no output"));
    }

    #[test]
    fn test_conflicting_outputs_are_invalid() {
        let mut mapping = Mapping::with_symbol(key_combination(), "keyboard", "a");
        mapping.output_type = Some(EV_KEY);
        mapping.output_code = Some(30);
        assert!(!mapping.is_valid());
    }

    #[test]
    fn test_unknown_target_and_symbol() {
        assert!(!Mapping::with_symbol(key_combination(), "joystick", "a").is_valid());
        assert!(!Mapping::with_symbol(key_combination(), "keyboard", "nope").is_valid());
        assert!(!Mapping::with_symbol(key_combination(), "keyboard", "key(").is_valid());
    }

    #[test]
    fn test_axis_mapping_requires_one_analog_input() {
        let joystick = EventCombination::from_tuples(&[(EV_ABS, 0, 0)]);
        let mapping = Mapping::with_output_event(joystick, "mouse", EV_REL, 0);
        assert!(mapping.is_axis_mapping());
        assert!(mapping.is_valid());
        assert_eq!(mapping.analog_input(), Some(InputEvent::from_tuple(EV_ABS, 0, 0)));

        let button = EventCombination::from_tuples(&[(EV_KEY, 304, 1)]);
        assert!(!Mapping::with_output_event(button, "mouse", EV_REL, 0).is_valid());
    }

    #[test]
    fn test_analog_input_cannot_produce_key() {
        let joystick = EventCombination::from_tuples(&[(EV_ABS, 0, 0)]);
        assert!(!Mapping::with_symbol(joystick.clone(), "keyboard", "a").is_valid());
        assert!(Mapping::with_symbol(joystick, "keyboard", "disable").is_valid());
    }

    #[test]
    fn test_numeric_ranges() {
        let mut mapping = Mapping::with_symbol(key_combination(), "keyboard", "a");
        mapping.deadzone = 1.0;
        assert!(!mapping.is_valid());
        mapping.deadzone = 0.2;
        mapping.expo = 1.5;
        assert!(!mapping.is_valid());
        mapping.expo = -0.5;
        mapping.rel_rate = 0;
        assert!(!mapping.is_valid());
    }

    #[test]
    fn test_release_timeout_range() {
        let wheel = EventCombination::from_tuples(&[(EV_KEY, 30, 1), (EV_REL, 8, -1)]);
        let mut mapping = Mapping::with_symbol(wheel, "keyboard", "x");
        assert!(mapping.is_valid());

        mapping.release_timeout = MAX_RELEASE_TIMEOUT;
        assert!(mapping.is_valid());
        mapping.release_timeout = 1e30;
        assert!(mapping.validate().unwrap_err().message.contains("release_timeout"));
        mapping.release_timeout = f64::INFINITY;
        assert!(!mapping.is_valid());
        mapping.release_timeout = f64::NAN;
        assert!(!mapping.is_valid());
        mapping.release_timeout = 0.0;
        assert!(!mapping.is_valid());
    }

    #[test]
    fn test_defaults_are_omitted_when_serializing() {
        let mut mapping = Mapping::with_symbol(key_combination(), "keyboard", "a");
        assert_eq!(
            serde_json::to_value(&mapping).unwrap(),
            json!({"target_uinput": "keyboard", "output_symbol": "a"})
        );

        mapping.gain = 2.0;
        mapping.release_combination_keys = false;
        assert_eq!(
            serde_json::to_value(&mapping).unwrap(),
            json!({
                "target_uinput": "keyboard",
                "output_symbol": "a",
                "gain": 2.0,
                "release_combination_keys": false
            })
        );
    }

    #[test]
    fn test_from_json() {
        let mapping = Mapping::from_json(
            key_combination(),
            json!({"target_uinput": "keyboard", "output_symbol": "b", "deadzone": 0.3}),
        )
        .unwrap();
        assert_eq!(mapping.event_combination(), &key_combination());
        assert_eq!(mapping.deadzone, 0.3);
        assert_eq!(mapping.macro_key_sleep_ms, defaults::MACRO_KEY_SLEEP_MS);
    }

    #[test]
    fn test_from_json_rejects_schema_violations() {
        assert!(Mapping::from_json(key_combination(), json!({"output_symbol": "b"})).is_err());
        assert!(Mapping::from_json(
            key_combination(),
            json!({"target_uinput": "keyboard", "bogus": 1})
        )
        .is_err());
        assert!(Mapping::from_json(
            key_combination(),
            json!({"target_uinput": "keyboard", "gain": "high"})
        )
        .is_err());
        assert!(Mapping::from_json(key_combination(), json!("keyboard")).is_err());
    }
}
