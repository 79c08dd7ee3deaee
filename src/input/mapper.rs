use std::{error::Error, sync::Arc};

use tokio::sync::{mpsc, oneshot};

use crate::{
    config::Profile,
    drivers::keypad::{
        decoder::{BitReportDecoder, KEY_COUNT},
        driver::{JOY_AXIS_MAX, JOY_AXIS_MIN},
    },
};

use super::{
    dispatcher::{ActionDispatcher, Dispatch},
    event::{
        InputSample, KeyTransition, USAGE_PAGE_BUTTON, USAGE_PAGE_GENERIC_DESKTOP, USAGE_X, USAGE_Y,
    },
    joystick::JoystickTranslator,
    macros::MacroScheduler,
    target::KeyboardOutput,
    ActionError,
};

const BUFFER_SIZE: usize = 2048;

/// Mapper commands define all the different ways to interact with [Mapper]
/// over a channel. These commands are processed in an asyncronous thread and
/// dispatched as they come in.
#[derive(Debug)]
pub enum Command {
    /// Samples read from a single report
    ProcessSamples(Vec<InputSample>),
    SetProfile(Arc<Profile>),
    GetProfileName(oneshot::Sender<String>),
    Stop,
}

/// Owns the input pipeline: decodes button reports, dispatches key actions
/// and drives the joystick translator
#[derive(Debug)]
pub struct Mapper {
    profile: Arc<Profile>,
    decoder: BitReportDecoder,
    dispatcher: ActionDispatcher,
    joystick: JoystickTranslator,
    macros: Arc<MacroScheduler>,
    /// Last normalized stick position
    axes: (f64, f64),
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
}

impl Mapper {
    pub fn new(keyboard: Arc<dyn KeyboardOutput>, profile: Arc<Profile>) -> Self {
        let (tx, rx) = mpsc::channel(BUFFER_SIZE);
        let macros = Arc::new(MacroScheduler::new(keyboard.clone()));
        macros.replace_all(profile.macros().iter().cloned());
        let dispatcher = ActionDispatcher::new(keyboard.clone(), macros.clone(), profile.clone());
        let joystick = JoystickTranslator::new(keyboard, profile.joystick.clone());

        Self {
            profile,
            decoder: BitReportDecoder::new(),
            dispatcher,
            joystick,
            macros,
            axes: (0.0, 0.0),
            tx,
            rx,
        }
    }

    /// Returns a transmitter channel that can be used to send commands to
    /// this mapper
    pub fn transmitter(&self) -> mpsc::Sender<Command> {
        self.tx.clone()
    }

    pub fn profile(&self) -> Arc<Profile> {
        self.profile.clone()
    }

    pub fn macros(&self) -> Arc<MacroScheduler> {
        self.macros.clone()
    }

    /// Whether the given logical key is currently held
    pub fn is_key_pressed(&self, key: u8) -> bool {
        self.dispatcher.is_pressed(key)
    }

    /// Process commands until [Command::Stop] is received. Everything held
    /// is released before returning.
    pub async fn run(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::debug!("Started listening for input samples");
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                Command::ProcessSamples(samples) => self.process_samples(samples),
                Command::SetProfile(profile) => self.set_profile(profile),
                Command::GetProfileName(sender) => {
                    if sender.send(self.profile.name.clone()).is_err() {
                        log::debug!("Profile name requested but receiver was dropped");
                    }
                }
                Command::Stop => {
                    log::debug!("Stopping mapper");
                    break;
                }
            }
        }
        self.shutdown();

        Ok(())
    }

    /// Route the samples of one report. The stick is updated once after all
    /// samples so both axes move together.
    pub fn process_samples(&mut self, samples: Vec<InputSample>) {
        let mut stick_moved = false;
        for sample in samples {
            match (sample.usage_page, sample.usage) {
                (USAGE_PAGE_BUTTON, _) if !sample.raw.is_empty() => {
                    for transition in self.decoder.decode(sample.raw.as_slice()) {
                        self.process_transition(transition);
                    }
                }
                (USAGE_PAGE_BUTTON, usage) => {
                    let Some(key) = u8::try_from(usage)
                        .ok()
                        .filter(|key| (1..=KEY_COUNT).contains(&(*key as usize)))
                    else {
                        log::trace!("Ignoring button usage {usage}");
                        continue;
                    };
                    self.process_transition(KeyTransition {
                        key,
                        pressed: sample.value != 0,
                    });
                }
                (USAGE_PAGE_GENERIC_DESKTOP, USAGE_X) => {
                    self.axes.0 = normalize_axis_value(sample.value);
                    stick_moved = true;
                }
                (USAGE_PAGE_GENERIC_DESKTOP, USAGE_Y) => {
                    // Report Y grows downward
                    self.axes.1 = -normalize_axis_value(sample.value);
                    stick_moved = true;
                }
                (page, usage) => {
                    log::trace!("Ignoring sample for usage {page:#04x}:{usage:#04x}");
                }
            }
        }

        if stick_moved {
            let (x, y) = self.axes;
            if let Err(e) = self.joystick.update(x, y) {
                log::error!("Failed to update joystick keys: {e}");
            }
        }
    }

    fn process_transition(&mut self, transition: KeyTransition) {
        match self.dispatcher.handle_transition(transition) {
            Ok(Dispatch::MacroStarted(handle)) => {
                // Report the outcome once the macro finishes
                tokio::task::spawn(async move {
                    let name = handle.name().to_string();
                    match handle.wait().await {
                        Ok(()) => log::debug!("Macro '{name}' finished"),
                        Err(ActionError::Cancelled) => log::info!("Macro '{name}' was cancelled"),
                        Err(e) => log::error!("Macro '{name}' failed: {e}"),
                    }
                });
            }
            Ok(_) => (),
            Err(e) => log::error!("Failed to handle key {}: {e}", transition.key),
        }
    }

    /// Switch to a new profile. Running macros are cancelled and keys held
    /// by the stick are released; pressed buttons keep their old action
    /// until released.
    pub fn set_profile(&mut self, profile: Arc<Profile>) {
        log::info!("Switching to profile '{}'", profile.name);
        self.macros.cancel_all();
        self.macros.replace_all(profile.macros().iter().cloned());
        self.dispatcher.set_profile(profile.clone());
        self.joystick.set_settings(profile.joystick.clone());
        self.profile = profile;
    }

    /// Cancel macros and release every key
    pub fn shutdown(&mut self) {
        log::debug!("Releasing all keys");
        self.macros.cancel_all();
        self.joystick.release_all();
        self.dispatcher.release_all();
        self.decoder.reset();
    }
}

/// Returns a value between -1.0 and 1.0 based on the given value with its
/// minimum and maximum values.
fn normalize_signed_value(raw_value: f64, min: f64, max: f64) -> f64 {
    let mid = (max + min) / 2.0;
    let event_value = raw_value - mid;

    // Normalize the value
    if event_value >= 0.0 {
        let maximum = max - mid;
        event_value / maximum
    } else {
        let minimum = min - mid;
        let value = event_value / minimum;
        -value
    }
}

/// Normalize a raw stick axis value to [-1.0, 1.0]
fn normalize_axis_value(raw_value: i32) -> f64 {
    normalize_signed_value(raw_value as f64, JOY_AXIS_MIN, JOY_AXIS_MAX).clamp(-1.0, 1.0)
}
