pub mod duty_cycle;
pub mod hold;
#[cfg(test)]
pub mod joystick_test;

use std::sync::Arc;

use evdev::KeyCode;

use crate::config::{DiagonalAssistConfig, DutyCycleConfig, HoldConfig, JoystickMode};

use super::target::{KeyboardOutput, Modifiers, OutputError};
use duty_cycle::{Pulse, PulseTiming};
use hold::HoldTracker;

/// Cardinal stick directions, counter-clockwise from the positive X axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Right,
    Up,
    Left,
    Down,
}

/// Direction of travel around the stick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    CounterClockwise,
    Clockwise,
}

impl Rotation {
    /// Rotation pointing from a cardinal toward the given signed offset
    pub fn toward(offset: f64) -> Rotation {
        if offset >= 0.0 {
            Rotation::CounterClockwise
        } else {
            Rotation::Clockwise
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Rotation::CounterClockwise => 1.0,
            Rotation::Clockwise => -1.0,
        }
    }
}

impl Direction {
    fn from_index(index: i32) -> Direction {
        match index.rem_euclid(4) {
            0 => Direction::Right,
            1 => Direction::Up,
            2 => Direction::Left,
            _ => Direction::Down,
        }
    }

    fn index(&self) -> i32 {
        match self {
            Direction::Right => 0,
            Direction::Up => 1,
            Direction::Left => 2,
            Direction::Down => 3,
        }
    }

    /// Angle of this cardinal in degrees
    pub fn angle(&self) -> f64 {
        self.index() as f64 * 90.0
    }

    /// Nearest cardinal to the given angle. Offsets from the returned
    /// cardinal fall in (-45, 45].
    pub fn nearest(angle: f64) -> Direction {
        Direction::from_index(((angle - 45.0) / 90.0).ceil() as i32)
    }

    /// The neighbouring cardinal in the given rotation
    pub fn adjacent(&self, rotation: Rotation) -> Direction {
        Direction::from_index(self.index() + rotation.sign() as i32)
    }
}

/// Stick angle in degrees in [0, 360). 0 is right and 90 is up.
pub fn angle_of(x: f64, y: f64) -> f64 {
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Signed difference `angle - reference` normalized to (-180, 180]
pub fn signed_delta(angle: f64, reference: f64) -> f64 {
    let delta = (angle - reference).rem_euclid(360.0);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Keys bound to each cardinal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionKeys {
    pub right: KeyCode,
    pub up: KeyCode,
    pub left: KeyCode,
    pub down: KeyCode,
}

impl DirectionKeys {
    pub fn key(&self, direction: Direction) -> KeyCode {
        match direction {
            Direction::Right => self.right,
            Direction::Up => self.up,
            Direction::Left => self.left,
            Direction::Down => self.down,
        }
    }
}

impl Default for DirectionKeys {
    fn default() -> Self {
        Self {
            right: KeyCode::KEY_D,
            up: KeyCode::KEY_W,
            left: KeyCode::KEY_A,
            down: KeyCode::KEY_S,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoystickSettings {
    pub deadzone: f64,
    pub mode: JoystickMode,
    pub keys: DirectionKeys,
    pub duty_cycle: DutyCycleConfig,
    pub hold: HoldConfig,
    pub diagonal_assist: Option<DiagonalAssistConfig>,
}

impl JoystickSettings {
    /// True when both axes are far enough from center for the diagonal
    /// assist to apply
    pub fn both_axes_engaged(&self, x: f64, y: f64) -> bool {
        let Some(assist) = self.diagonal_assist.as_ref() else {
            return false;
        };
        let threshold = assist.axis_threshold_multiplier * self.deadzone;
        x.abs() > threshold && y.abs() > threshold
    }
}

impl Default for JoystickSettings {
    fn default() -> Self {
        Self {
            deadzone: 0.2,
            mode: JoystickMode::DutyCycle,
            keys: DirectionKeys::default(),
            duty_cycle: DutyCycleConfig::default(),
            hold: HoldConfig::default(),
            diagonal_assist: None,
        }
    }
}

/// Directional output computed for a single sample. A secondary ratio of
/// 1.0 means the secondary is held continuously; anything between 0 and 1
/// means it is pulsed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Output {
    pub primary: Option<Direction>,
    pub secondary: Option<Direction>,
    pub ratio: f64,
}

impl Output {
    pub fn single(primary: Direction) -> Self {
        Self {
            primary: Some(primary),
            secondary: None,
            ratio: 0.0,
        }
    }

    pub fn pair(primary: Direction, secondary: Direction, ratio: f64) -> Self {
        Self {
            primary: Some(primary),
            secondary: Some(secondary),
            ratio,
        }
    }

    /// Directions that should be held down continuously
    pub fn continuous(&self) -> Vec<Direction> {
        let mut held: Vec<Direction> = self.primary.into_iter().collect();
        if let Some(secondary) = self.secondary {
            if self.ratio >= 1.0 {
                held.push(secondary);
            }
        }
        held
    }

    /// Direction and ratio of a pulsed secondary, if any
    pub fn pulsed(&self) -> Option<(Direction, f64)> {
        match self.secondary {
            Some(secondary) if self.ratio > 0.0 && self.ratio < 1.0 => {
                Some((secondary, self.ratio))
            }
            _ => None,
        }
    }

    /// Number of keys this output holds, counting a pulsed key
    pub fn key_count(&self) -> usize {
        self.primary.iter().count() + self.secondary.iter().count()
    }
}

/// Converts analog stick samples into one or two held direction keys
#[derive(Debug)]
pub struct JoystickTranslator {
    keyboard: Arc<dyn KeyboardOutput>,
    settings: JoystickSettings,
    hold: HoldTracker,
    /// Directions currently held continuously
    held: Vec<Direction>,
    pulse: Option<Pulse>,
    last: Output,
}

impl JoystickTranslator {
    pub fn new(keyboard: Arc<dyn KeyboardOutput>, settings: JoystickSettings) -> Self {
        Self {
            keyboard,
            settings,
            hold: HoldTracker::default(),
            held: Vec::new(),
            pulse: None,
            last: Output::default(),
        }
    }

    /// Use new settings. Everything held is released first if the settings
    /// changed.
    pub fn set_settings(&mut self, settings: JoystickSettings) {
        if settings == self.settings {
            return;
        }
        self.release_all();
        self.settings = settings;
    }

    pub fn settings(&self) -> &JoystickSettings {
        &self.settings
    }

    /// The last output that was applied
    pub fn output(&self) -> Output {
        self.last
    }

    /// Handle a new stick position. Both axes are in [-1, 1] with positive Y
    /// pointing up.
    pub fn update(&mut self, x: f64, y: f64) -> Result<(), OutputError> {
        let output = self.compute(x, y);
        self.apply(output)
    }

    /// Work out which keys the given stick position should hold
    pub fn compute(&mut self, x: f64, y: f64) -> Output {
        if x.hypot(y) < self.settings.deadzone {
            self.hold.reset();
            return Output::default();
        }
        let angle = angle_of(x, y);

        match self.settings.mode {
            JoystickMode::DutyCycle => {
                let primary = Direction::nearest(angle);
                let offset = signed_delta(angle, primary.angle());
                let ratio = duty_cycle::secondary_ratio(offset, x, y, &self.settings);
                if ratio <= 0.0 {
                    return Output::single(primary);
                }
                let secondary = primary.adjacent(Rotation::toward(offset));
                Output::pair(primary, secondary, ratio)
            }
            JoystickMode::Hold => self.hold.update(angle, x, y, &self.settings),
        }
    }

    /// Diff the given output against what is currently held and emit the
    /// difference
    fn apply(&mut self, output: Output) -> Result<(), OutputError> {
        let want_held = output.continuous();
        let want_pulse = output.pulsed();

        // Retune a pulse that keeps its direction, stop any other
        if let Some(pulse) = self.pulse.take() {
            match want_pulse {
                Some((direction, ratio)) if pulse.direction() == direction => {
                    pulse.retune(self.timing(ratio));
                    self.pulse = Some(pulse);
                }
                _ => {
                    let direction = pulse.direction();
                    let handover = want_held.contains(&direction);
                    let was_down = pulse.stop(!handover);
                    if handover && was_down {
                        log::trace!("Pulsed {direction:?} is now held continuously");
                        self.held.push(direction);
                    }
                }
            }
        }

        let keys = self.settings.keys;
        let released: Vec<Direction> = self
            .held
            .iter()
            .filter(|direction| !want_held.contains(direction))
            .copied()
            .collect();
        for direction in released {
            self.held.retain(|held| *held != direction);
            self.keyboard
                .release_key(keys.key(direction), Modifiers::NONE)?;
        }
        for direction in want_held.iter() {
            if self.held.contains(direction) {
                continue;
            }
            self.keyboard
                .press_key(keys.key(*direction), Modifiers::NONE)?;
            self.held.push(*direction);
        }

        if self.pulse.is_none() {
            if let Some((direction, ratio)) = want_pulse {
                log::trace!("Pulsing {direction:?} at ratio {ratio:.2}");
                self.pulse = Some(Pulse::start(
                    self.keyboard.clone(),
                    direction,
                    keys.key(direction),
                    self.timing(ratio),
                ));
            }
        }

        if output != self.last {
            log::debug!("Joystick output: {output:?}");
        }
        self.last = output;
        Ok(())
    }

    fn timing(&self, ratio: f64) -> PulseTiming {
        PulseTiming::from_ratio(ratio, duty_cycle::period(&self.settings.duty_cycle))
    }

    /// Directions held continuously right now
    pub fn held(&self) -> &[Direction] {
        self.held.as_slice()
    }

    /// Direction being pulsed right now
    pub fn pulsing(&self) -> Option<Direction> {
        self.pulse.as_ref().map(|pulse| pulse.direction())
    }

    /// Stop pulsing and release every held key. Errors are logged.
    pub fn release_all(&mut self) {
        if let Some(pulse) = self.pulse.take() {
            pulse.stop(true);
        }
        let keys = self.settings.keys;
        for direction in self.held.drain(..) {
            if let Err(e) = self
                .keyboard
                .release_key(keys.key(direction), Modifiers::NONE)
            {
                log::warn!("Unable to release {direction:?}: {e}");
            }
        }
        self.hold.reset();
        self.last = Output::default();
    }
}

impl Drop for JoystickTranslator {
    fn drop(&mut self) {
        if let Some(pulse) = self.pulse.take() {
            pulse.stop(true);
        }
    }
}
