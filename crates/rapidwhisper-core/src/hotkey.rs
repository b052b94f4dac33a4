use crossbeam_channel::Sender;
use rdev::{listen, Event, EventType, Key};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::state::AppEvent;

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("Empty key combination")]
    Empty,
    #[error("Unknown key name: {0}")]
    UnknownKey(String),
    #[error("Combination '{0}' must contain exactly one non-modifier key")]
    BadShape(String),
}

/// A parsed key combination: zero or more modifiers plus one main key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyCombo {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    pub key: Key,
}

impl HotkeyCombo {
    /// Parse a combo string like "ctrl+space", "esc", "ctrl+alt+space".
    pub fn parse(combo: &str) -> Result<Self, HotkeyError> {
        let mut parsed = Self {
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
            key: Key::Space,
        };
        let mut main_key = None;

        for part in combo.split('+') {
            let part = part.trim().to_ascii_lowercase();
            match part.as_str() {
                "" => return Err(HotkeyError::Empty),
                "ctrl" | "control" => parsed.ctrl = true,
                "alt" | "option" => parsed.alt = true,
                "shift" => parsed.shift = true,
                "meta" | "cmd" | "command" | "super" | "win" => parsed.meta = true,
                name => {
                    let key = key_from_name(name)
                        .ok_or_else(|| HotkeyError::UnknownKey(name.to_string()))?;
                    if main_key.replace(key).is_some() {
                        return Err(HotkeyError::BadShape(combo.to_string()));
                    }
                }
            }
        }

        parsed.key = main_key.ok_or_else(|| HotkeyError::BadShape(combo.to_string()))?;
        Ok(parsed)
    }
}

/// Whether a combo string parses: at most the four known modifiers plus
/// exactly one main key.
pub fn is_valid_combo(combo: &str) -> bool {
    HotkeyCombo::parse(combo).is_ok()
}

fn key_from_name(name: &str) -> Option<Key> {
    let key = match name {
        "space" => Key::Space,
        "esc" | "escape" => Key::Escape,
        "tab" => Key::Tab,
        "enter" | "return" => Key::Return,
        "backspace" => Key::Backspace,
        "delete" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "a" => Key::KeyA,
        "b" => Key::KeyB,
        "c" => Key::KeyC,
        "d" => Key::KeyD,
        "e" => Key::KeyE,
        "f" => Key::KeyF,
        "g" => Key::KeyG,
        "h" => Key::KeyH,
        "i" => Key::KeyI,
        "j" => Key::KeyJ,
        "k" => Key::KeyK,
        "l" => Key::KeyL,
        "m" => Key::KeyM,
        "n" => Key::KeyN,
        "o" => Key::KeyO,
        "p" => Key::KeyP,
        "q" => Key::KeyQ,
        "r" => Key::KeyR,
        "s" => Key::KeyS,
        "t" => Key::KeyT,
        "u" => Key::KeyU,
        "v" => Key::KeyV,
        "w" => Key::KeyW,
        "x" => Key::KeyX,
        "y" => Key::KeyY,
        "z" => Key::KeyZ,
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => return None,
    };
    Some(key)
}

/// The three registered combinations and the events they post.
#[derive(Debug, Clone)]
pub struct HotkeyBindings {
    pub primary: HotkeyCombo,
    pub cancel: HotkeyCombo,
    pub format: Option<HotkeyCombo>,
}

impl HotkeyBindings {
    pub fn from_strs(
        primary: &str,
        cancel: &str,
        format: Option<&str>,
    ) -> Result<Self, HotkeyError> {
        Ok(Self {
            primary: HotkeyCombo::parse(primary)?,
            cancel: HotkeyCombo::parse(cancel)?,
            format: format.map(HotkeyCombo::parse).transpose()?,
        })
    }
}

/// Live modifier state plus per-binding latches so holding a combo fires
/// once rather than auto-repeating.
struct ListenerState {
    ctrl: bool,
    alt: bool,
    shift: bool,
    meta: bool,
    latched: [bool; 3],
}

impl ListenerState {
    fn matches(&self, combo: &HotkeyCombo, pressed: Key) -> bool {
        pressed == combo.key
            && self.ctrl == combo.ctrl
            && self.alt == combo.alt
            && self.shift == combo.shift
            && self.meta == combo.meta
    }

    fn track_modifier(&mut self, key: Key, down: bool) {
        match key {
            Key::ControlLeft | Key::ControlRight => self.ctrl = down,
            Key::Alt | Key::AltGr => self.alt = down,
            Key::ShiftLeft | Key::ShiftRight => self.shift = down,
            Key::MetaLeft | Key::MetaRight => self.meta = down,
            _ => {}
        }
    }
}

/// Start the global keyboard listener on its own thread. Matching combos
/// post events onto the application queue; the thread lives for the rest of
/// the process.
pub fn spawn_listener(
    bindings: HotkeyBindings,
    events: Sender<AppEvent>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        info!("hotkey listener started");
        let mut state = ListenerState {
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
            latched: [false; 3],
        };

        let callback = move |event: Event| match event.event_type {
            EventType::KeyPress(key) => {
                state.track_modifier(key, true);

                let combos: [(usize, Option<&HotkeyCombo>, AppEvent); 3] = [
                    (0, Some(&bindings.primary), AppEvent::HotkeyPressed),
                    (1, Some(&bindings.cancel), AppEvent::CancelPressed),
                    (2, bindings.format.as_ref(), AppEvent::FormatSelectionRequested),
                ];
                for (slot, combo, app_event) in combos {
                    let Some(combo) = combo else { continue };
                    if state.matches(combo, key) && !state.latched[slot] {
                        state.latched[slot] = true;
                        debug!("hotkey matched: {app_event:?}");
                        let _ = events.send(app_event);
                    }
                }
            }
            EventType::KeyRelease(key) => {
                state.track_modifier(key, false);
                if key == bindings.primary.key {
                    state.latched[0] = false;
                }
                if key == bindings.cancel.key {
                    state.latched[1] = false;
                }
                if bindings.format.as_ref().is_some_and(|c| c.key == key) {
                    state.latched[2] = false;
                }
            }
            _ => {}
        };

        if let Err(e) = listen(callback) {
            error!("hotkey listener failed: {e:?}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_combos() {
        let combo = HotkeyCombo::parse("ctrl+space").unwrap();
        assert!(combo.ctrl && !combo.alt && !combo.shift && !combo.meta);
        assert_eq!(combo.key, Key::Space);

        let combo = HotkeyCombo::parse("esc").unwrap();
        assert!(!combo.ctrl);
        assert_eq!(combo.key, Key::Escape);

        let combo = HotkeyCombo::parse("ctrl+alt+space").unwrap();
        assert!(combo.ctrl && combo.alt);
    }

    #[test]
    fn test_invalid_combos_rejected() {
        assert!(!is_valid_combo(""));
        assert!(!is_valid_combo("ctrl+"));
        assert!(!is_valid_combo("ctrl"));
        assert!(!is_valid_combo("ctrl+space+a"));
        assert!(!is_valid_combo("hyper+space"));
    }
}
