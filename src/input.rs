use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::BackdropKind;

/// Identifier for a keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            return Some(Self::Character(ch.to_ascii_uppercase()));
        }
        if ch.is_ascii_digit() {
            return Some(Self::Digit(ch as u8 - b'0'));
        }
        None
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" | " " => Space,
        "Escape" | "Esc" => Escape,
        "Right" => Right,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Non-character keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Escape,
    Right,
}

/// Viewer control triggered by a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    ToggleRotation,
    CycleColors,
    ResetView,
    Backdrop(BackdropKind),
    /// Steps through the backdrop variants in order.
    NextBackdrop,
    Quit,
}

/// Key to command table.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: HashMap<KeyCode, ViewerCommand>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut bindings = HashMap::from([
            (KeyCode::Character('R'), ViewerCommand::ToggleRotation),
            (KeyCode::Named(NamedKey::Space), ViewerCommand::ToggleRotation),
            (KeyCode::Character('C'), ViewerCommand::CycleColors),
            (KeyCode::Character('V'), ViewerCommand::ResetView),
            (KeyCode::Character('B'), ViewerCommand::NextBackdrop),
            (KeyCode::Named(NamedKey::Right), ViewerCommand::NextBackdrop),
            (KeyCode::Named(NamedKey::Escape), ViewerCommand::Quit),
        ]);
        for (index, kind) in BackdropKind::ALL.into_iter().enumerate() {
            bindings.insert(KeyCode::Digit(index as u8 + 1), ViewerCommand::Backdrop(kind));
        }
        Self { bindings }
    }
}

impl KeyBindings {
    pub fn command_for(&self, key: KeyCode) -> Option<ViewerCommand> {
        self.bindings.get(&key).copied()
    }

    pub fn bind(&mut self, key: KeyCode, command: ViewerCommand) {
        self.bindings.insert(key, command);
    }
}

/// Backdrop after `current` in [`BackdropKind::ALL`], wrapping around.
pub fn next_backdrop(current: Option<BackdropKind>) -> BackdropKind {
    let all = BackdropKind::ALL;
    current
        .and_then(|kind| all.iter().position(|k| *k == kind))
        .map_or(all[0], |index| all[(index + 1) % all.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Escape"),
            Some(KeyCode::Named(NamedKey::Escape))
        );
        assert_eq!(KeyCode::from_name("r"), Some(KeyCode::Character('R')));
        assert_eq!(KeyCode::from_name("3"), Some(KeyCode::Digit(3)));
        assert_eq!(KeyCode::from_name("rr"), None);
        assert_eq!(KeyCode::from_name(""), None);
    }

    #[test]
    fn digits_select_backdrops_in_order() {
        let bindings = KeyBindings::default();
        assert_eq!(
            bindings.command_for(KeyCode::Digit(1)),
            Some(ViewerCommand::Backdrop(BackdropKind::Grid))
        );
        assert_eq!(
            bindings.command_for(KeyCode::Digit(4)),
            Some(ViewerCommand::Backdrop(BackdropKind::LoadedScene))
        );
        assert_eq!(bindings.command_for(KeyCode::Digit(9)), None);
        assert_eq!(
            bindings.command_for(KeyCode::Character('R')),
            Some(ViewerCommand::ToggleRotation)
        );
    }

    #[test]
    fn rebinding_overrides_default() {
        let mut bindings = KeyBindings::default();
        bindings.bind(KeyCode::Character('R'), ViewerCommand::ResetView);
        assert_eq!(
            bindings.command_for(KeyCode::Character('R')),
            Some(ViewerCommand::ResetView)
        );
    }

    #[test]
    fn next_backdrop_wraps() {
        assert_eq!(next_backdrop(None), BackdropKind::Grid);
        assert_eq!(next_backdrop(Some(BackdropKind::Grid)), BackdropKind::Gradient);
        assert_eq!(next_backdrop(Some(BackdropKind::Custom)), BackdropKind::Grid);
    }
}
