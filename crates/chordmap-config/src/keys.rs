//! Key symbol resolution
//!
//! Output symbols in presets and macros are written the way users know them from
//! xkb (`Control_L`, `BackSpace`, `a`) or from the kernel headers (`KEY_A`,
//! `BTN_LEFT`). Both spellings resolve to an evdev [`Key`].

use std::fmt;
use std::str::FromStr;

use evdev::{AbsoluteAxisType, Key, RelativeAxisType};

use crate::input_event::{EV_ABS, EV_KEY, EV_REL};

/// Aliases that do not follow the `KEY_<NAME>` pattern.
///
/// Lookup is case-insensitive, so every entry is lowercase.
const ALIASES: &[(&str, Key)] = &[
    // Modifiers
    ("control_l", Key::KEY_LEFTCTRL),
    ("control_r", Key::KEY_RIGHTCTRL),
    ("ctrl", Key::KEY_LEFTCTRL),
    ("lctrl", Key::KEY_LEFTCTRL),
    ("rctrl", Key::KEY_RIGHTCTRL),
    ("shift_l", Key::KEY_LEFTSHIFT),
    ("shift_r", Key::KEY_RIGHTSHIFT),
    ("shift", Key::KEY_LEFTSHIFT),
    ("alt_l", Key::KEY_LEFTALT),
    ("alt_r", Key::KEY_RIGHTALT),
    ("iso_level3_shift", Key::KEY_RIGHTALT),
    ("alt", Key::KEY_LEFTALT),
    ("super_l", Key::KEY_LEFTMETA),
    ("super_r", Key::KEY_RIGHTMETA),
    ("super", Key::KEY_LEFTMETA),
    ("meta", Key::KEY_LEFTMETA),
    // Editing and whitespace
    ("escape", Key::KEY_ESC),
    ("return", Key::KEY_ENTER),
    ("caps_lock", Key::KEY_CAPSLOCK),
    ("caps", Key::KEY_CAPSLOCK),
    ("num_lock", Key::KEY_NUMLOCK),
    ("scroll_lock", Key::KEY_SCROLLLOCK),
    ("del", Key::KEY_DELETE),
    ("ins", Key::KEY_INSERT),
    ("page_up", Key::KEY_PAGEUP),
    ("prior", Key::KEY_PAGEUP),
    ("page_down", Key::KEY_PAGEDOWN),
    ("next", Key::KEY_PAGEDOWN),
    ("print", Key::KEY_SYSRQ),
    ("menu", Key::KEY_COMPOSE),
    // Punctuation
    ("-", Key::KEY_MINUS),
    ("=", Key::KEY_EQUAL),
    ("equals", Key::KEY_EQUAL),
    ("[", Key::KEY_LEFTBRACE),
    ("bracketleft", Key::KEY_LEFTBRACE),
    ("]", Key::KEY_RIGHTBRACE),
    ("bracketright", Key::KEY_RIGHTBRACE),
    (";", Key::KEY_SEMICOLON),
    ("'", Key::KEY_APOSTROPHE),
    ("`", Key::KEY_GRAVE),
    ("\\", Key::KEY_BACKSLASH),
    (",", Key::KEY_COMMA),
    (".", Key::KEY_DOT),
    ("period", Key::KEY_DOT),
    ("/", Key::KEY_SLASH),
    // Media
    ("xf86audioraisevolume", Key::KEY_VOLUMEUP),
    ("xf86audiolowervolume", Key::KEY_VOLUMEDOWN),
    ("xf86audiomute", Key::KEY_MUTE),
    ("xf86audioplay", Key::KEY_PLAYPAUSE),
    ("xf86audionext", Key::KEY_NEXTSONG),
    ("xf86audioprev", Key::KEY_PREVIOUSSONG),
    ("xf86back", Key::KEY_BACK),
    ("xf86forward", Key::KEY_FORWARD),
    // Mouse buttons
    ("mouse_left", Key::BTN_LEFT),
    ("mouse_right", Key::BTN_RIGHT),
    ("mouse_middle", Key::BTN_MIDDLE),
];

/// Symbol that swallows the combination instead of producing output.
pub const DISABLE_SYMBOL: &str = "disable";

/// Resolve a key symbol to an evdev key.
///
/// Accepts xkb-style names (`Control_L`, `Escape`, `a`), kernel names with
/// or without prefix (`KEY_A`, `leftctrl`, `BTN_LEFT`), and the aliases in
/// [`ALIASES`]. Returns `None` for anything unknown.
///
/// # Example
///
/// ```ignore
/// assert_eq!(parse_key("Control_L"), Some(Key::KEY_LEFTCTRL));
/// assert_eq!(parse_key("btn_left"), Some(Key::BTN_LEFT));
/// ```
pub fn parse_key(name: &str) -> Option<Key> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let lower = name.to_lowercase();
    if let Some((_, key)) = ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return Some(*key);
    }

    let upper = name.to_uppercase();
    if upper.starts_with("KEY_") || upper.starts_with("BTN_") {
        return Key::from_str(&upper).ok();
    }

    Key::from_str(&format!("KEY_{}", upper)).ok()
}

/// Resolve a key symbol directly to its event code.
pub fn symbol_to_code(name: &str) -> Option<u16> {
    parse_key(name).map(|key| key.code())
}

/// Human readable name of an event code, e.g. `KEY_A` or `REL_WHEEL`.
pub fn code_name(event_type: u16, code: u16) -> String {
    match event_type {
        EV_KEY => format!("{:?}", Key::new(code)),
        EV_REL => format!("{:?}", RelativeAxisType(code)),
        EV_ABS => format!("{:?}", AbsoluteAxisType(code)),
        _ => format!("{}:{}", event_type, code),
    }
}

// ============================================================================
// Modifiers
// ============================================================================

/// Normalized modifier key; left and right variants collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    AltGr,
    Super,
}

impl Modifier {
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => Some(Modifier::Ctrl),
            Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => Some(Modifier::Shift),
            Key::KEY_LEFTALT => Some(Modifier::Alt),
            Key::KEY_RIGHTALT => Some(Modifier::AltGr),
            Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => Some(Modifier::Super),
            _ => None,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::from_key(Key::new(code))
    }

    /// The left-hand key used when a modifier has to be injected.
    pub fn to_key(self) -> Key {
        match self {
            Modifier::Ctrl => Key::KEY_LEFTCTRL,
            Modifier::Shift => Key::KEY_LEFTSHIFT,
            Modifier::Alt => Key::KEY_LEFTALT,
            Modifier::AltGr => Key::KEY_RIGHTALT,
            Modifier::Super => Key::KEY_LEFTMETA,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Shift => "Shift",
            Modifier::Alt => "Alt",
            Modifier::AltGr => "AltGr",
            Modifier::Super => "Super",
        };
        f.write_str(name)
    }
}
