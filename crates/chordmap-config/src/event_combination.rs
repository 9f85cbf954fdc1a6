//! Ordered groups of events that trigger one mapping

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CreationError;
use crate::input_event::{InputEvent, EV_KEY};
use crate::keys::Modifier;

/// An ordered sequence of events that have to be active together.
///
/// Each `(type, code)` appears at most once; when constructed from a list
/// that repeats one, the first occurrence wins. Equality is order sensitive,
/// use [`EventCombination::permutations`] to match chords pressed in a
/// different order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventCombination {
    events: Vec<InputEvent>,
}

impl EventCombination {
    pub fn new(events: impl IntoIterator<Item = InputEvent>) -> Self {
        let mut deduplicated: Vec<InputEvent> = Vec::new();
        for event in events {
            if deduplicated
                .iter()
                .any(|existing| existing.type_and_code() == event.type_and_code())
            {
                tracing::debug!("Dropping repeated {} from combination", event);
                continue;
            }
            deduplicated.push(event);
        }
        Self {
            events: deduplicated,
        }
    }

    pub fn from_tuples(tuples: &[(u16, u16, i32)]) -> Self {
        Self::new(
            tuples
                .iter()
                .map(|&(event_type, code, value)| InputEvent::from_tuple(event_type, code, value)),
        )
    }

    /// Parse `type,code,value[+type,code,value...]`.
    pub fn from_string(input: &str) -> Result<Self, CreationError> {
        if input.trim().is_empty() {
            return Err(CreationError::new(input, "empty combination"));
        }
        let events = input
            .split('+')
            .map(InputEvent::from_string)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(events))
    }

    pub fn events(&self) -> &[InputEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InputEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, event: &InputEvent) -> bool {
        self.events.contains(event)
    }

    pub fn contains_type_and_code(&self, type_and_code: (u16, u16)) -> bool {
        self.events
            .iter()
            .any(|event| event.type_and_code() == type_and_code)
    }

    /// Every distinct ordering of the events, starting with the stored one.
    ///
    /// Orderings are produced on demand; there are `n!` of them.
    pub fn permutations(&self) -> impl Iterator<Item = EventCombination> + '_ {
        let mut indices: Option<Vec<usize>> = Some((0..self.events.len()).collect());
        std::iter::from_fn(move || {
            let current = indices.as_mut()?;
            let permutation = Self {
                events: current.iter().map(|&i| self.events[i]).collect(),
            };
            if !next_permutation(current) {
                indices = None;
            }
            Some(permutation)
        })
    }

    /// Whether `other` holds the same events in any order.
    pub fn is_permutation_of(&self, other: &EventCombination) -> bool {
        self.len() == other.len() && self.events.iter().all(|event| other.contains(event))
    }

    /// A chord of several events that includes a modifier key. The modifier
    /// is typically already pressed when the rest arrives, which leaks it to
    /// the focused application.
    pub fn is_problematic(&self) -> bool {
        self.len() > 1
            && self.events.iter().any(|event| {
                event.event_type() == EV_KEY && Modifier::from_code(event.code()).is_some()
            })
    }

    /// Canonical encoding used as key in preset files.
    pub fn json_str(&self) -> String {
        self.events
            .iter()
            .map(InputEvent::json_str)
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Advance `indices` to the next lexicographic permutation.
fn next_permutation(indices: &mut [usize]) -> bool {
    if indices.len() < 2 {
        return false;
    }
    let mut i = indices.len() - 1;
    while i > 0 && indices[i - 1] >= indices[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = indices.len() - 1;
    while indices[j] <= indices[i - 1] {
        j -= 1;
    }
    indices.swap(i - 1, j);
    indices[i..].reverse();
    true
}

impl FromStr for EventCombination {
    type Err = CreationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl From<InputEvent> for EventCombination {
    fn from(event: InputEvent) -> Self {
        Self::new([event])
    }
}

impl FromIterator<InputEvent> for EventCombination {
    fn from_iter<T: IntoIterator<Item = InputEvent>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a EventCombination {
    type Item = &'a InputEvent;
    type IntoIter = std::slice::Iter<'a, InputEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl fmt::Display for EventCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .events
            .iter()
            .map(|event| match event.event_type() {
                EV_KEY => event.code_name(),
                _ => format!("{} {}", event.code_name(), event.describe_value()),
            })
            .collect();
        f.write_str(&names.join(" + "))
    }
}

impl Serialize for EventCombination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.json_str())
    }
}

impl<'de> Deserialize<'de> for EventCombination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_string(&encoded).map_err(serde::de::Error::custom)
    }
}
