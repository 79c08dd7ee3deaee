use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use evdev::KeyCode;
use tokio::task::JoinHandle;

use crate::{
    config::DutyCycleConfig,
    input::target::{KeyboardOutput, Modifiers},
};

use super::{Direction, JoystickSettings};

/// Shortest ON or OFF phase of a pulse
pub const MIN_PHASE: Duration = Duration::from_millis(5);

/// Period used when the configured frequency cannot produce one
pub const MAX_PERIOD: Duration = Duration::from_secs(10);

/// Ratios at or above this hold the secondary key continuously
pub const FULL_RATIO: f64 = 0.95;

/// Length of one ON+OFF cycle. The configured frequency is lowered if it
/// would exceed the transition cap; it is never raised.
pub fn period(config: &DutyCycleConfig) -> Duration {
    let mut seconds = 1.0 / config.frequency;
    if let Some(cap) = config.max_events_per_second {
        // Each cycle is two transitions
        seconds = seconds.max(2.0 / cap);
    }
    Duration::try_from_secs_f64(seconds).unwrap_or_else(|_| {
        log::warn!("Invalid pulse period {seconds}s, using {MAX_PERIOD:?}");
        MAX_PERIOD
    })
}

/// Fraction of each period the secondary key should be held for a stick
/// that is `offset` degrees away from its nearest cardinal. Returns 0 for no
/// secondary and 1 for a continuously held secondary.
pub fn secondary_ratio(offset: f64, x: f64, y: f64, settings: &JoystickSettings) -> f64 {
    let config = &settings.duty_cycle;
    let offset = offset.abs();
    let mut ratio = (offset / 45.0).powf(config.ratio_exponent).clamp(0.0, 1.0);

    if let Some(assist) = settings.diagonal_assist.as_ref() {
        let assisted = (offset / assist.max_angle).min(1.0);
        if offset > assist.min_angle {
            ratio = ratio.max(assisted);
        }
        if settings.both_axes_engaged(x, y) {
            ratio = ratio.max(assisted.max(config.min_ratio));
        }
    }

    if ratio < config.min_ratio || ratio <= 0.0 {
        0.0
    } else if ratio >= FULL_RATIO {
        1.0
    } else {
        ratio
    }
}

/// ON and OFF durations of a pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    pub on: Duration,
    pub off: Duration,
}

impl PulseTiming {
    pub fn from_ratio(ratio: f64, period: Duration) -> Self {
        let ratio = ratio.clamp(0.0, 1.0);
        Self {
            on: period.mul_f64(ratio).max(MIN_PHASE),
            off: period.mul_f64(1.0 - ratio).max(MIN_PHASE),
        }
    }
}

#[derive(Debug)]
struct PulseState {
    stopped: bool,
    key_down: bool,
    timing: PulseTiming,
}

/// Background task that alternately presses and releases a key
#[derive(Debug)]
pub struct Pulse {
    direction: Direction,
    key: KeyCode,
    keyboard: Arc<dyn KeyboardOutput>,
    state: Arc<Mutex<PulseState>>,
    task: JoinHandle<()>,
}

impl Pulse {
    /// Start pulsing, beginning with the ON phase
    pub fn start(
        keyboard: Arc<dyn KeyboardOutput>,
        direction: Direction,
        key: KeyCode,
        timing: PulseTiming,
    ) -> Self {
        let state = Arc::new(Mutex::new(PulseState {
            stopped: false,
            key_down: false,
            timing,
        }));
        let task = tokio::task::spawn(run_pulse(keyboard.clone(), key, state.clone()));

        Self {
            direction,
            key,
            keyboard,
            state,
            task,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Change the phase lengths. Takes effect from the next phase.
    pub fn retune(&self, timing: PulseTiming) {
        lock(&self.state).timing = timing;
    }

    /// Stop the pulse. If `release` is set and the key is down it is
    /// released, otherwise it is left as it is. Returns whether the key was
    /// down.
    pub fn stop(self, release: bool) -> bool {
        let was_down = {
            let mut state = lock(&self.state);
            state.stopped = true;
            let was_down = state.key_down;
            if was_down && release {
                if let Err(e) = self.keyboard.release_key(self.key, Modifiers::NONE) {
                    log::warn!("Unable to release pulsed {:?}: {e}", self.direction);
                }
            }
            state.key_down = false;
            was_down
        };
        self.task.abort();
        was_down
    }
}

fn lock(state: &Mutex<PulseState>) -> MutexGuard<'_, PulseState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_pulse(keyboard: Arc<dyn KeyboardOutput>, key: KeyCode, state: Arc<Mutex<PulseState>>) {
    loop {
        let on = {
            let mut state = lock(&state);
            if state.stopped {
                break;
            }
            if let Err(e) = keyboard.press_key(key, Modifiers::NONE) {
                log::error!("Unable to press pulsed key {key:?}: {e}");
                break;
            }
            state.key_down = true;
            state.timing.on
        };
        tokio::time::sleep(on).await;

        let off = {
            let mut state = lock(&state);
            if state.stopped {
                break;
            }
            if let Err(e) = keyboard.release_key(key, Modifiers::NONE) {
                log::error!("Unable to release pulsed key {key:?}: {e}");
                break;
            }
            state.key_down = false;
            state.timing.off
        };
        tokio::time::sleep(off).await;
    }
}
