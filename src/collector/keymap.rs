//! Key naming and modifier diffing shared by the keyboard adapters.
//!
//! The tables here are plain data so they can be exercised on every platform,
//! even though the keycodes and flag masks are the macOS virtual keycodes and
//! `NX_DEVICE*` masks delivered by a CGEventTap.

/// Fixed keycode to symbolic name table (macOS virtual keycodes).
pub const KEYCODE_NAMES: &[(u16, &str)] = &[
    (0x24, "enter"),
    (0x30, "tab"),
    (0x31, "space"),
    (0x33, "backspace"),
    (0x35, "esc"),
    (0x36, "right_cmd"),
    (0x37, "left_cmd"),
    (0x38, "left_shift"),
    (0x39, "caps_lock"),
    (0x3A, "left_alt"),
    (0x3B, "left_ctrl"),
    (0x3C, "right_shift"),
    (0x3D, "right_alt"),
    (0x3E, "right_ctrl"),
    (0x3F, "fn"),
    (0x48, "volume_up"),
    (0x49, "volume_down"),
    (0x4A, "mute"),
    (0x4C, "enter"),
    (0x60, "f5"),
    (0x61, "f6"),
    (0x62, "f7"),
    (0x63, "f3"),
    (0x64, "f8"),
    (0x65, "f9"),
    (0x67, "f11"),
    (0x6D, "f10"),
    (0x6F, "f12"),
    (0x72, "insert"),
    (0x73, "home"),
    (0x74, "page_up"),
    (0x75, "delete"),
    (0x76, "f4"),
    (0x77, "end"),
    (0x78, "f2"),
    (0x79, "page_down"),
    (0x7A, "f1"),
    (0x7B, "left"),
    (0x7C, "right"),
    (0x7D, "down"),
    (0x7E, "up"),
];

/// Known modifier flag bits and the key each one stands for.
///
/// The OS only reports the new aggregate mask on a flags-changed event, so the
/// specific key is recovered by diffing against this table.
pub const MODIFIER_MASKS: &[(u64, &str)] = &[
    (0x0000_0001, "left_ctrl"),
    (0x0000_0002, "left_shift"),
    (0x0000_0004, "right_shift"),
    (0x0000_0008, "left_cmd"),
    (0x0000_0010, "right_cmd"),
    (0x0000_0020, "left_alt"),
    (0x0000_0040, "right_alt"),
    (0x0000_2000, "right_ctrl"),
    (0x0001_0000, "caps_lock"),
    (0x0080_0000, "fn"),
];

/// Look up the symbolic name for a keycode.
pub fn keycode_name(keycode: u16) -> Option<&'static str> {
    KEYCODE_NAMES
        .iter()
        .find(|(code, _)| *code == keycode)
        .map(|(_, name)| *name)
}

/// True when `text` is exactly one visible character.
pub fn is_printable(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => !c.is_control() && !c.is_whitespace(),
        _ => false,
    }
}

/// Resolve the name logged for a key.
///
/// Printable single characters are used verbatim, everything else goes through
/// the keycode table, and unmapped codes fall back to `keycode_<n>`.
pub fn resolve_key_name(text: Option<&str>, keycode: u16) -> String {
    if let Some(text) = text {
        if is_printable(text) {
            return text.to_string();
        }
    }
    match keycode_name(keycode) {
        Some(name) => name.to_string(),
        None => format!("keycode_{keycode}"),
    }
}

/// One modifier edge recovered from a flags-changed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierTransition {
    pub name: &'static str,
    pub pressed: bool,
}

/// Diffs successive modifier masks into per-key transitions.
#[derive(Debug, Default, Clone)]
pub struct ModifierTracker {
    previous_mask: u64,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known mask, e.g. the flags held when the monitor installs.
    pub fn with_mask(mask: u64) -> Self {
        Self {
            previous_mask: mask,
        }
    }

    pub fn previous_mask(&self) -> u64 {
        self.previous_mask
    }

    /// Record a new aggregate mask and return the modifiers that changed.
    pub fn update(&mut self, mask: u64) -> Vec<ModifierTransition> {
        let changed = self.previous_mask ^ mask;
        self.previous_mask = mask;

        MODIFIER_MASKS
            .iter()
            .filter(|(bit, _)| changed & bit != 0)
            .map(|(bit, name)| ModifierTransition {
                name,
                pressed: mask & bit != 0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_characters_are_verbatim() {
        assert_eq!(resolve_key_name(Some("a"), 0x00), "a");
        assert_eq!(resolve_key_name(Some("É"), 0x0E), "É");
    }

    #[test]
    fn test_non_printable_uses_table() {
        assert_eq!(resolve_key_name(Some("\u{1b}"), 0x35), "esc");
        assert_eq!(resolve_key_name(Some(" "), 0x31), "space");
        assert_eq!(resolve_key_name(Some("\r"), 0x24), "enter");
        assert_eq!(resolve_key_name(None, 0x7B), "left");
    }

    #[test]
    fn test_multi_character_uses_table() {
        assert_eq!(resolve_key_name(Some("ab"), 0x30), "tab");
    }

    #[test]
    fn test_unmapped_keycode_fallback() {
        assert_eq!(resolve_key_name(None, 0x5F), "keycode_95");
    }

    #[test]
    fn test_modifier_press_and_release() {
        let mut tracker = ModifierTracker::new();

        let pressed = tracker.update(0x0002);
        assert_eq!(
            pressed,
            vec![ModifierTransition {
                name: "left_shift",
                pressed: true
            }]
        );

        let released = tracker.update(0x0000);
        assert_eq!(
            released,
            vec![ModifierTransition {
                name: "left_shift",
                pressed: false
            }]
        );
        assert_eq!(tracker.previous_mask(), 0);
    }

    #[test]
    fn test_left_and_right_are_distinguished() {
        let mut tracker = ModifierTracker::with_mask(0x0002);
        let transitions = tracker.update(0x0002 | 0x0004);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].name, "right_shift");
        assert!(transitions[0].pressed);
    }

    #[test]
    fn test_modifier_held_before_install() {
        // Left command already down when monitoring starts
        let mut seeded = ModifierTracker::with_mask(0x0008);
        assert_eq!(
            seeded.update(0x0008 | 0x0002),
            vec![ModifierTransition {
                name: "left_shift",
                pressed: true
            }]
        );
        assert_eq!(
            seeded.update(0x0000),
            vec![
                ModifierTransition {
                    name: "left_shift",
                    pressed: false
                },
                ModifierTransition {
                    name: "left_cmd",
                    pressed: false
                },
            ]
        );

        // Unseeded, the first flags event reports a press that never happened
        let mut unseeded = ModifierTracker::new();
        assert_eq!(unseeded.update(0x0008 | 0x0002).len(), 2);
    }

    #[test]
    fn test_aggregate_bits_are_ignored() {
        // 0x20000 is the device-independent shift bit that accompanies 0x2
        let mut tracker = ModifierTracker::new();
        let transitions = tracker.update(0x0002_0002);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].name, "left_shift");
    }
}
