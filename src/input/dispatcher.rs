use std::{collections::HashMap, sync::Arc};

use evdev::KeyCode;

use crate::config::Profile;

use super::{
    event::KeyTransition,
    macros::{MacroHandle, MacroScheduler},
    target::{KeyboardOutput, ModifierKind, Modifiers},
    ActionError,
};

/// What a logical key does when it is pressed
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalAction {
    /// Press and release the key on button down
    Tap(KeyCode),
    /// Press the key on button down and leave it held
    HoldDown(KeyCode),
    /// Release the key on button down
    HoldUp(KeyCode),
    /// Hold the key for as long as the button is held
    Hold(KeyCode),
    RunMacro(String),
    HoldModifier(ModifierKind),
    Disabled,
}

/// Result of handling a single key transition
#[derive(Debug)]
pub enum Dispatch {
    /// Nothing was emitted
    Ignored,
    /// Keyboard output was emitted
    Output,
    /// A macro was started in the background
    MacroStarted(MacroHandle),
}

/// Turns logical key transitions into keyboard output using the current
/// profile.
#[derive(Debug)]
pub struct ActionDispatcher {
    keyboard: Arc<dyn KeyboardOutput>,
    macros: Arc<MacroScheduler>,
    profile: Arc<Profile>,
    /// Pressed keys and the action they resolved to when pressed
    pressed: HashMap<u8, LogicalAction>,
    active_modifiers: Modifiers,
}

impl ActionDispatcher {
    pub fn new(
        keyboard: Arc<dyn KeyboardOutput>,
        macros: Arc<MacroScheduler>,
        profile: Arc<Profile>,
    ) -> Self {
        Self {
            keyboard,
            macros,
            profile,
            pressed: HashMap::new(),
            active_modifiers: Modifiers::NONE,
        }
    }

    /// Swap in a new profile. Keys that are currently pressed keep the
    /// action they were pressed with until they are released.
    pub fn set_profile(&mut self, profile: Arc<Profile>) {
        log::debug!("Dispatcher using profile '{}'", profile.name);
        self.profile = profile;
    }

    pub fn is_pressed(&self, key: u8) -> bool {
        self.pressed.contains_key(&key)
    }

    pub fn active_modifiers(&self) -> Modifiers {
        self.active_modifiers
    }

    /// Handle a single key transition. Duplicate presses and releases of
    /// keys that are not pressed do nothing.
    pub fn handle_transition(
        &mut self,
        transition: KeyTransition,
    ) -> Result<Dispatch, ActionError> {
        if transition.pressed {
            self.handle_press(transition.key)
        } else {
            self.handle_release(transition.key)
        }
    }

    fn handle_press(&mut self, key: u8) -> Result<Dispatch, ActionError> {
        if self.pressed.contains_key(&key) {
            log::trace!("Key {key} already pressed");
            return Ok(Dispatch::Ignored);
        }
        let action = self
            .profile
            .action(key)
            .cloned()
            .unwrap_or(LogicalAction::Disabled);
        log::debug!("Key {key} pressed: {action:?}");
        self.pressed.insert(key, action.clone());

        let modifiers = self.active_modifiers;
        match action {
            LogicalAction::Tap(code) => self.keyboard.tap_key(code, modifiers)?,
            LogicalAction::HoldDown(code) | LogicalAction::Hold(code) => {
                self.keyboard.press_key(code, modifiers)?
            }
            LogicalAction::HoldUp(code) => self.keyboard.release_key(code, modifiers)?,
            LogicalAction::HoldModifier(kind) => {
                if !self.active_modifiers.insert(kind) {
                    return Ok(Dispatch::Ignored);
                }
                if let Err(e) = self.keyboard.press_modifier(kind) {
                    self.active_modifiers.remove(kind);
                    return Err(e.into());
                }
            }
            LogicalAction::RunMacro(name) => {
                let handle = self.macros.execute(&name, None)?;
                return Ok(Dispatch::MacroStarted(handle));
            }
            LogicalAction::Disabled => return Ok(Dispatch::Ignored),
        }

        Ok(Dispatch::Output)
    }

    fn handle_release(&mut self, key: u8) -> Result<Dispatch, ActionError> {
        let Some(action) = self.pressed.remove(&key) else {
            log::trace!("Key {key} released but was not pressed");
            return Ok(Dispatch::Ignored);
        };
        log::debug!("Key {key} released: {action:?}");

        match action {
            LogicalAction::HoldModifier(kind) => {
                if !self.active_modifiers.remove(kind) {
                    return Ok(Dispatch::Ignored);
                }
                self.keyboard.release_modifier(kind)?;
            }
            LogicalAction::Hold(code) => {
                self.keyboard.release_key(code, self.active_modifiers)?;
            }
            _ => return Ok(Dispatch::Ignored),
        }

        Ok(Dispatch::Output)
    }

    /// Release everything held on behalf of pressed keys and forget them.
    /// Errors are logged and otherwise ignored.
    pub fn release_all(&mut self) {
        for (key, action) in self.pressed.drain() {
            if let LogicalAction::Hold(code) = action {
                if let Err(e) = self.keyboard.release_key(code, Modifiers::NONE) {
                    log::warn!("Unable to release key for {key}: {e}");
                }
            }
        }
        for kind in self.active_modifiers.iter() {
            if let Err(e) = self.keyboard.release_modifier(kind) {
                log::warn!("Unable to release modifier {kind:?}: {e}");
            }
        }
        self.active_modifiers = Modifiers::NONE;
        if let Err(e) = self.keyboard.release_all_keys() {
            log::warn!("Unable to release all keys: {e}");
        }
    }
}
