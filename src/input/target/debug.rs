use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use evdev::KeyCode;
use tokio::time::Instant;

use super::{KeyboardOutput, ModifierKind, Modifiers, OutputError};

/// A single output call recorded by the [DebugKeyboard]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    KeyDown(KeyCode, Modifiers),
    KeyUp(KeyCode, Modifiers),
    ModifierDown(ModifierKind),
    ModifierUp(ModifierKind),
    ReleaseAll,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedEvent {
    pub event: OutputEvent,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<RecordedEvent>,
    held_keys: HashSet<KeyCode>,
    held_modifiers: Modifiers,
    failing: bool,
}

/// Keyboard that records output instead of emitting it. Used for dry runs
/// where every event is logged.
#[derive(Debug, Default)]
pub struct DebugKeyboard {
    log_events: bool,
    recording: Mutex<Recording>,
}

impl DebugKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a keyboard that also logs every output call at info level
    pub fn with_logging() -> Self {
        Self {
            log_events: true,
            ..Default::default()
        }
    }

    /// When set, every output call fails with [OutputError::DeviceNotActive]
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Returns all recorded events
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    /// Keys currently held down
    pub fn held_keys(&self) -> HashSet<KeyCode> {
        self.lock().held_keys.clone()
    }

    pub fn held_modifiers(&self) -> Modifiers {
        self.lock().held_modifiers
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: OutputEvent) -> Result<MutexGuard<'_, Recording>, OutputError> {
        let mut recording = self.lock();
        if recording.failing {
            return Err(OutputError::DeviceNotActive);
        }
        if self.log_events {
            log::info!("Keyboard output: {event:?}");
        }
        recording.events.push(RecordedEvent {
            event,
            at: Instant::now(),
        });
        Ok(recording)
    }
}

impl KeyboardOutput for DebugKeyboard {
    fn press_key(&self, key: KeyCode, modifiers: Modifiers) -> Result<(), OutputError> {
        let mut recording = self.record(OutputEvent::KeyDown(key, modifiers))?;
        recording.held_keys.insert(key);
        Ok(())
    }

    fn release_key(&self, key: KeyCode, modifiers: Modifiers) -> Result<(), OutputError> {
        let mut recording = self.record(OutputEvent::KeyUp(key, modifiers))?;
        recording.held_keys.remove(&key);
        Ok(())
    }

    fn release_all_keys(&self) -> Result<(), OutputError> {
        let mut recording = self.record(OutputEvent::ReleaseAll)?;
        recording.held_keys.clear();
        recording.held_modifiers = Modifiers::NONE;
        Ok(())
    }

    fn press_modifier(&self, kind: ModifierKind) -> Result<(), OutputError> {
        let mut recording = self.record(OutputEvent::ModifierDown(kind))?;
        recording.held_modifiers.insert(kind);
        Ok(())
    }

    fn release_modifier(&self, kind: ModifierKind) -> Result<(), OutputError> {
        let mut recording = self.record(OutputEvent::ModifierUp(kind))?;
        recording.held_modifiers.remove(kind);
        Ok(())
    }
}
