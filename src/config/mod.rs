#[cfg(test)]
pub mod config_test;

use std::{collections::BTreeMap, io, path::Path, time::Duration};

use evdev::KeyCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    drivers::keypad::decoder::KEY_COUNT,
    input::{
        dispatcher::LogicalAction,
        joystick::{DirectionKeys, JoystickSettings},
        macros::{MacroDefinition, MacroStep},
        target::{keymap, ModifierKind},
    },
};

/// Represents all possible errors loading a [Profile]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
    #[error("Unknown key name '{name}' in {context}")]
    InvalidKey { context: String, name: String },
    #[error("Invalid action in {context}: {reason}")]
    InvalidAction { context: String, reason: String },
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Profile as it is written in YAML
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProfileConfig {
    pub version: u32,
    pub kind: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub keys: BTreeMap<u8, KeyActionConfig>,
    #[serde(default)]
    pub macros: Vec<MacroConfig>,
    #[serde(default)]
    pub joystick: JoystickConfig,
}

impl ProfileConfig {
    /// Load a [ProfileConfig] from the given YAML string
    pub fn from_yaml(content: String) -> Result<ProfileConfig, LoadError> {
        let profile: ProfileConfig = serde_yaml::from_str(content.as_str())?;
        Ok(profile)
    }

    /// Load a [ProfileConfig] from the given YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<ProfileConfig, LoadError> {
        let file = std::fs::File::open(path)?;
        let profile: ProfileConfig = serde_yaml::from_reader(file)?;
        Ok(profile)
    }

    /// Profile used when none is given: joystick on WASD and no button
    /// actions.
    pub fn default_profile() -> ProfileConfig {
        ProfileConfig {
            version: 1,
            kind: "KeypadProfile".to_string(),
            name: "Default".to_string(),
            description: None,
            keys: BTreeMap::new(),
            macros: Vec::new(),
            joystick: JoystickConfig::default(),
        }
    }
}

/// Action bound to a single logical key. Exactly one field should be set.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct KeyActionConfig {
    pub tap: Option<String>,
    pub hold: Option<String>,
    pub key_down: Option<String>,
    pub key_up: Option<String>,
    pub run_macro: Option<String>,
    pub modifier: Option<String>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MacroConfig {
    pub name: String,
    pub steps: Vec<MacroStepConfig>,
}

/// A single macro step. Exactly one field should be set. Delays are in
/// milliseconds.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MacroStepConfig {
    pub press: Option<String>,
    pub release: Option<String>,
    pub tap: Option<String>,
    pub delay: Option<u64>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoystickMode {
    #[default]
    DutyCycle,
    Hold,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct JoystickConfig {
    pub deadzone: f64,
    pub mode: JoystickMode,
    pub keys: DirectionKeysConfig,
    pub duty_cycle: DutyCycleConfig,
    pub hold: HoldConfig,
    pub diagonal_assist: Option<DiagonalAssistConfig>,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.2,
            mode: JoystickMode::DutyCycle,
            keys: DirectionKeysConfig::default(),
            duty_cycle: DutyCycleConfig::default(),
            hold: HoldConfig::default(),
            diagonal_assist: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct DirectionKeysConfig {
    pub right: String,
    pub up: String,
    pub left: String,
    pub down: String,
}

impl Default for DirectionKeysConfig {
    fn default() -> Self {
        Self {
            right: "d".to_string(),
            up: "w".to_string(),
            left: "a".to_string(),
            down: "s".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct DutyCycleConfig {
    /// Pulses per second of the secondary key
    pub frequency: f64,
    pub ratio_exponent: f64,
    /// Ratios below this are treated as zero
    pub min_ratio: f64,
    /// Upper bound on key transitions per second for the secondary key
    pub max_events_per_second: Option<f64>,
}

impl Default for DutyCycleConfig {
    fn default() -> Self {
        Self {
            frequency: 20.0,
            ratio_exponent: 1.0,
            min_ratio: 0.05,
            max_events_per_second: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct HoldConfig {
    /// Fraction of the 90 degrees between cardinals at which the adjacent
    /// key is added
    pub angle_fraction: f64,
    /// Fraction of the add threshold the stick must fall below before a
    /// two-key segment is abandoned
    pub hysteresis: f64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            angle_fraction: 0.25,
            hysteresis: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct DiagonalAssistConfig {
    pub min_angle: f64,
    pub max_angle: f64,
    pub axis_threshold_multiplier: f64,
}

impl Default for DiagonalAssistConfig {
    fn default() -> Self {
        Self {
            min_angle: 8.0,
            max_angle: 30.0,
            axis_threshold_multiplier: 1.5,
        }
    }
}

/// Validated, immutable configuration snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    /// Action for each logical key, indexed by key - 1
    actions: Vec<LogicalAction>,
    macros: Vec<MacroDefinition>,
    pub joystick: JoystickSettings,
}

impl Profile {
    /// Validate the given config and resolve all key names
    pub fn from_config(config: &ProfileConfig) -> Result<Profile, LoadError> {
        let mut actions = vec![LogicalAction::Disabled; KEY_COUNT];
        for (key, action) in config.keys.iter() {
            let index = (*key as usize).wrapping_sub(1);
            if index >= KEY_COUNT {
                return Err(LoadError::InvalidValue(format!(
                    "key {key} is out of range 1..={KEY_COUNT}"
                )));
            }
            actions[index] = action.to_action(&format!("key {key}"))?;
        }

        let mut macros = Vec::with_capacity(config.macros.len());
        for macro_config in config.macros.iter() {
            if macros
                .iter()
                .any(|m: &MacroDefinition| m.name == macro_config.name)
            {
                return Err(LoadError::InvalidValue(format!(
                    "macro '{}' is defined more than once",
                    macro_config.name
                )));
            }
            macros.push(macro_config.to_definition()?);
        }

        for action in actions.iter() {
            if let LogicalAction::RunMacro(name) = action {
                if !macros.iter().any(|m| &m.name == name) {
                    log::warn!("Profile '{}' runs undefined macro '{name}'", config.name);
                }
            }
        }

        let joystick = config.joystick.to_settings()?;

        Ok(Profile {
            name: config.name.clone(),
            actions,
            macros,
            joystick,
        })
    }

    /// Load and validate a profile from the given YAML string
    pub fn from_yaml(content: String) -> Result<Profile, LoadError> {
        Profile::from_config(&ProfileConfig::from_yaml(content)?)
    }

    /// Load and validate a profile from the given YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Profile, LoadError> {
        Profile::from_config(&ProfileConfig::from_yaml_file(path)?)
    }

    /// Action bound to the given logical key
    pub fn action(&self, key: u8) -> Option<&LogicalAction> {
        self.actions.get((key as usize).checked_sub(1)?)
    }

    pub fn macros(&self) -> &[MacroDefinition] {
        self.macros.as_slice()
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            actions: vec![LogicalAction::Disabled; KEY_COUNT],
            macros: Vec::new(),
            joystick: JoystickSettings::default(),
        }
    }
}

fn resolve(name: &str, context: &str) -> Result<KeyCode, LoadError> {
    keymap::resolve_key(name).map_err(|_| LoadError::InvalidKey {
        context: context.to_string(),
        name: name.to_string(),
    })
}

impl KeyActionConfig {
    fn to_action(&self, context: &str) -> Result<LogicalAction, LoadError> {
        let mut actions = Vec::new();
        if let Some(name) = self.tap.as_ref() {
            actions.push(LogicalAction::Tap(resolve(name, context)?));
        }
        if let Some(name) = self.hold.as_ref() {
            actions.push(LogicalAction::Hold(resolve(name, context)?));
        }
        if let Some(name) = self.key_down.as_ref() {
            actions.push(LogicalAction::HoldDown(resolve(name, context)?));
        }
        if let Some(name) = self.key_up.as_ref() {
            actions.push(LogicalAction::HoldUp(resolve(name, context)?));
        }
        if let Some(name) = self.run_macro.as_ref() {
            actions.push(LogicalAction::RunMacro(name.clone()));
        }
        if let Some(name) = self.modifier.as_ref() {
            let Some(kind) = ModifierKind::from_name(name) else {
                return Err(LoadError::InvalidAction {
                    context: context.to_string(),
                    reason: format!("unknown modifier '{name}'"),
                });
            };
            actions.push(LogicalAction::HoldModifier(kind));
        }
        if self.disabled.unwrap_or_default() {
            actions.push(LogicalAction::Disabled);
        }

        if actions.len() > 1 {
            return Err(LoadError::InvalidAction {
                context: context.to_string(),
                reason: "more than one action is set".to_string(),
            });
        }
        Ok(actions.pop().unwrap_or(LogicalAction::Disabled))
    }
}

impl MacroConfig {
    fn to_definition(&self) -> Result<MacroDefinition, LoadError> {
        let context = format!("macro '{}'", self.name);
        let mut steps = Vec::with_capacity(self.steps.len());
        for step in self.steps.iter() {
            steps.push(step.to_step(&context)?);
        }
        Ok(MacroDefinition::new(&self.name, steps))
    }
}

impl MacroStepConfig {
    fn to_step(&self, context: &str) -> Result<MacroStep, LoadError> {
        let mut steps = Vec::new();
        if let Some(name) = self.press.as_ref() {
            steps.push(MacroStep::Press(resolve(name, context)?));
        }
        if let Some(name) = self.release.as_ref() {
            steps.push(MacroStep::Release(resolve(name, context)?));
        }
        if let Some(name) = self.tap.as_ref() {
            steps.push(MacroStep::Tap(resolve(name, context)?));
        }
        if let Some(ms) = self.delay {
            steps.push(MacroStep::Delay(Duration::from_millis(ms)));
        }
        if let Some(text) = self.text.as_ref() {
            steps.push(MacroStep::TypeText(text.clone()));
        }

        match steps.len() {
            1 => Ok(steps.remove(0)),
            0 => Err(LoadError::InvalidAction {
                context: context.to_string(),
                reason: "macro step has no action".to_string(),
            }),
            _ => Err(LoadError::InvalidAction {
                context: context.to_string(),
                reason: "macro step has more than one action".to_string(),
            }),
        }
    }
}

/// Accepted range for pulse frequencies and transition caps, in Hz
const MIN_FREQUENCY: f64 = 0.1;
const MAX_FREQUENCY: f64 = 1000.0;

/// Finite and above zero. NaN fails.
fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

impl JoystickConfig {
    fn to_settings(&self) -> Result<JoystickSettings, LoadError> {
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(LoadError::InvalidValue(format!(
                "deadzone {} must be in [0, 1)",
                self.deadzone
            )));
        }
        let duty = &self.duty_cycle;
        if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&duty.frequency) {
            return Err(LoadError::InvalidValue(format!(
                "duty cycle frequency {} must be in [{MIN_FREQUENCY}, {MAX_FREQUENCY}]",
                duty.frequency
            )));
        }
        if !is_positive(duty.ratio_exponent) {
            return Err(LoadError::InvalidValue(format!(
                "duty cycle ratio_exponent {} must be positive",
                duty.ratio_exponent
            )));
        }
        if !(0.0..=1.0).contains(&duty.min_ratio) {
            return Err(LoadError::InvalidValue(format!(
                "min_ratio {} must be in [0, 1]",
                duty.min_ratio
            )));
        }
        if duty
            .max_events_per_second
            .is_some_and(|cap| !(MIN_FREQUENCY..=f64::MAX).contains(&cap))
        {
            return Err(LoadError::InvalidValue(format!(
                "max_events_per_second must be at least {MIN_FREQUENCY}"
            )));
        }
        let hold = &self.hold;
        if !(hold.angle_fraction > 0.0 && hold.angle_fraction <= 0.5) {
            return Err(LoadError::InvalidValue(format!(
                "hold angle_fraction {} must be in (0, 0.5]",
                hold.angle_fraction
            )));
        }
        if !(0.0..=1.0).contains(&hold.hysteresis) {
            return Err(LoadError::InvalidValue(format!(
                "hold hysteresis {} must be in [0, 1]",
                hold.hysteresis
            )));
        }
        if let Some(assist) = self.diagonal_assist.as_ref() {
            if !is_positive(assist.max_angle) || !(0.0..=f64::MAX).contains(&assist.min_angle) {
                return Err(LoadError::InvalidValue(
                    "diagonal assist angles must be positive".to_string(),
                ));
            }
            if !(0.0..=f64::MAX).contains(&assist.axis_threshold_multiplier) {
                return Err(LoadError::InvalidValue(format!(
                    "diagonal assist axis_threshold_multiplier {} must not be negative",
                    assist.axis_threshold_multiplier
                )));
            }
        }

        let context = "joystick keys";
        let keys = DirectionKeys {
            right: resolve(&self.keys.right, context)?,
            up: resolve(&self.keys.up, context)?,
            left: resolve(&self.keys.left, context)?,
            down: resolve(&self.keys.down, context)?,
        };

        Ok(JoystickSettings {
            deadzone: self.deadzone,
            mode: self.mode,
            keys,
            duty_cycle: self.duty_cycle,
            hold: self.hold,
            diagonal_assist: self.diagonal_assist,
        })
    }
}
