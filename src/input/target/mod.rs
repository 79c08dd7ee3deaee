pub mod debug;
pub mod keyboard;
pub mod keymap;

use std::{fmt::Debug, io};

use evdev::KeyCode;
use thiserror::Error;

/// Possible errors emitting synthetic keyboard output
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Permission denied opening uinput")]
    PermissionDenied,
    #[error("Virtual keyboard is not active")]
    DeviceNotActive,
    #[error("Could not write to virtual keyboard: {0}")]
    Io(#[from] io::Error),
    #[error("Keyboard backend error: {0}")]
    Backend(String),
}

/// Modifier keys that can be held by a logical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    Shift,
    Control,
    Alt,
    Meta,
}

impl ModifierKind {
    pub const ALL: [ModifierKind; 4] = [
        ModifierKind::Shift,
        ModifierKind::Control,
        ModifierKind::Alt,
        ModifierKind::Meta,
    ];

    /// Look up a modifier from its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "shift" => Some(ModifierKind::Shift),
            "control" | "ctrl" => Some(ModifierKind::Control),
            "alt" | "option" => Some(ModifierKind::Alt),
            "meta" | "super" | "command" => Some(ModifierKind::Meta),
            _ => None,
        }
    }

    /// The key that is emitted for this modifier
    pub fn key_code(&self) -> KeyCode {
        match self {
            ModifierKind::Shift => KeyCode::KEY_LEFTSHIFT,
            ModifierKind::Control => KeyCode::KEY_LEFTCTRL,
            ModifierKind::Alt => KeyCode::KEY_LEFTALT,
            ModifierKind::Meta => KeyCode::KEY_LEFTMETA,
        }
    }

    fn bit(&self) -> u8 {
        match self {
            ModifierKind::Shift => 0b0001,
            ModifierKind::Control => 0b0010,
            ModifierKind::Alt => 0b0100,
            ModifierKind::Meta => 0b1000,
        }
    }
}

/// Set of active modifiers attached to an emitted key event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);

    pub fn with(self, kind: ModifierKind) -> Self {
        Modifiers(self.0 | kind.bit())
    }

    /// Adds the modifier, returning true if it was not already set
    pub fn insert(&mut self, kind: ModifierKind) -> bool {
        let added = !self.contains(kind);
        self.0 |= kind.bit();
        added
    }

    /// Removes the modifier, returning true if it was set
    pub fn remove(&mut self, kind: ModifierKind) -> bool {
        let removed = self.contains(kind);
        self.0 &= !kind.bit();
        removed
    }

    pub fn contains(&self, kind: ModifierKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ModifierKind> + '_ {
        ModifierKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

/// The output capability used by the rest of the pipeline. Implementations
/// must be safe to call from the input loop and from spawned tasks.
pub trait KeyboardOutput: Send + Sync + Debug {
    /// Press the given key. Modifiers that are not already held are pressed
    /// for the duration of the key.
    fn press_key(&self, key: KeyCode, modifiers: Modifiers) -> Result<(), OutputError>;

    /// Release the given key
    fn release_key(&self, key: KeyCode, modifiers: Modifiers) -> Result<(), OutputError>;

    /// Press and immediately release the given key
    fn tap_key(&self, key: KeyCode, modifiers: Modifiers) -> Result<(), OutputError> {
        self.press_key(key, modifiers)?;
        self.release_key(key, modifiers)
    }

    /// Release every key and modifier this backend is holding
    fn release_all_keys(&self) -> Result<(), OutputError>;

    fn press_modifier(&self, kind: ModifierKind) -> Result<(), OutputError>;

    fn release_modifier(&self, kind: ModifierKind) -> Result<(), OutputError>;
}
