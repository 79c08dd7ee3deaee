use std::{
    collections::HashSet,
    io,
    sync::{Mutex, MutexGuard},
};

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AttributeSet, EventType, InputEvent, KeyCode, SynchronizationCode, SynchronizationEvent,
};

use super::{keymap::KEY_NAMES, KeyboardOutput, ModifierKind, Modifiers, OutputError};

const DEVICE_NAME: &str = "padmapper Keyboard";

#[derive(Debug)]
struct DeviceState {
    device: Option<VirtualDevice>,
    held_keys: HashSet<KeyCode>,
    /// Modifiers held through [KeyboardOutput::press_modifier]
    held_modifiers: Modifiers,
}

/// Virtual keyboard backed by a uinput device
#[derive(Debug)]
pub struct KeyboardDevice {
    state: Mutex<DeviceState>,
}

impl KeyboardDevice {
    /// Create the uinput device. Fails with [OutputError::PermissionDenied]
    /// if the process cannot open /dev/uinput.
    pub fn new() -> Result<Self, OutputError> {
        log::debug!("Creating virtual keyboard");
        let device = KeyboardDevice::create_virtual_device().map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => OutputError::PermissionDenied,
            _ => OutputError::Io(e),
        })?;

        Ok(Self {
            state: Mutex::new(DeviceState {
                device: Some(device),
                held_keys: HashSet::new(),
                held_modifiers: Modifiers::NONE,
            }),
        })
    }

    /// Create the virtual device to emulate
    fn create_virtual_device() -> Result<VirtualDevice, io::Error> {
        let mut keys = AttributeSet::<KeyCode>::new();
        for (_, key) in KEY_NAMES {
            keys.insert(*key);
        }
        for kind in ModifierKind::ALL {
            keys.insert(kind.key_code());
        }

        let device = VirtualDeviceBuilder::new()?
            .name(DEVICE_NAME)
            .with_keys(&keys)?
            .build()?;

        Ok(device)
    }

    /// Release everything and destroy the virtual device. Any later output
    /// fails with [OutputError::DeviceNotActive].
    pub fn close(&self) -> Result<(), OutputError> {
        self.release_all_keys()?;
        let mut state = self.lock()?;
        state.device = None;
        log::debug!("Destroyed virtual keyboard");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, DeviceState>, OutputError> {
        self.state
            .lock()
            .map_err(|e| OutputError::Backend(e.to_string()))
    }
}

impl DeviceState {
    fn emit(&mut self, key: KeyCode, value: i32) -> Result<(), OutputError> {
        let Some(device) = self.device.as_mut() else {
            return Err(OutputError::DeviceNotActive);
        };
        log::trace!("Emitting {key:?} value {value}");
        let event = InputEvent::new(EventType::KEY.0, key.0, value);
        let sync: InputEvent = SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into();
        device.emit(&[event, sync])?;
        Ok(())
    }

    /// Modifiers in the given set that are not already held
    fn transient(&self, modifiers: Modifiers) -> impl Iterator<Item = ModifierKind> + '_ {
        let held = self.held_modifiers;
        modifiers
            .iter()
            .filter(move |kind| !held.contains(*kind))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl KeyboardOutput for KeyboardDevice {
    fn press_key(&self, key: KeyCode, modifiers: Modifiers) -> Result<(), OutputError> {
        let mut state = self.lock()?;
        let transient: Vec<ModifierKind> = state.transient(modifiers).collect();
        for kind in transient {
            state.emit(kind.key_code(), 1)?;
        }
        state.emit(key, 1)?;
        state.held_keys.insert(key);
        Ok(())
    }

    fn release_key(&self, key: KeyCode, modifiers: Modifiers) -> Result<(), OutputError> {
        let mut state = self.lock()?;
        state.emit(key, 0)?;
        state.held_keys.remove(&key);
        let transient: Vec<ModifierKind> = state.transient(modifiers).collect();
        for kind in transient {
            state.emit(kind.key_code(), 0)?;
        }
        Ok(())
    }

    fn release_all_keys(&self) -> Result<(), OutputError> {
        let mut state = self.lock()?;
        let keys: Vec<KeyCode> = state.held_keys.drain().collect();
        for key in keys {
            state.emit(key, 0)?;
        }
        let modifiers: Vec<ModifierKind> = state.held_modifiers.iter().collect();
        for kind in modifiers {
            state.emit(kind.key_code(), 0)?;
            state.held_modifiers.remove(kind);
        }
        Ok(())
    }

    fn press_modifier(&self, kind: ModifierKind) -> Result<(), OutputError> {
        let mut state = self.lock()?;
        state.emit(kind.key_code(), 1)?;
        state.held_modifiers.insert(kind);
        Ok(())
    }

    fn release_modifier(&self, kind: ModifierKind) -> Result<(), OutputError> {
        let mut state = self.lock()?;
        state.emit(kind.key_code(), 0)?;
        state.held_modifiers.remove(kind);
        Ok(())
    }
}
