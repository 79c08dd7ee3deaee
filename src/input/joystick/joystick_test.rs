use std::{collections::HashSet, error::Error, sync::Arc, time::Duration};

use evdev::KeyCode;

use crate::{
    config::{DiagonalAssistConfig, DutyCycleConfig, JoystickMode},
    input::{
        joystick::{
            angle_of,
            duty_cycle::{period, secondary_ratio, PulseTiming, MAX_PERIOD, MIN_PHASE},
            Direction, JoystickSettings, JoystickTranslator, Output,
        },
        target::debug::{DebugKeyboard, OutputEvent},
    },
};

fn settings(mode: JoystickMode) -> JoystickSettings {
    JoystickSettings {
        mode,
        ..Default::default()
    }
}

fn at(angle: f64) -> (f64, f64) {
    let radians = angle.to_radians();
    (radians.cos(), radians.sin())
}

fn translator(settings: JoystickSettings) -> (Arc<DebugKeyboard>, JoystickTranslator) {
    let keyboard = Arc::new(DebugKeyboard::new());
    let translator = JoystickTranslator::new(keyboard.clone(), settings);
    (keyboard, translator)
}

fn keys(codes: &[KeyCode]) -> HashSet<KeyCode> {
    codes.iter().copied().collect()
}

#[tokio::test]
async fn test_direction_angles() -> Result<(), Box<dyn Error>> {
    assert!((angle_of(1.0, 0.0) - 0.0).abs() < 1e-9);
    assert!((angle_of(0.0, 1.0) - 90.0).abs() < 1e-9);
    assert!((angle_of(-1.0, 0.0) - 180.0).abs() < 1e-9);
    assert!((angle_of(0.0, -1.0) - 270.0).abs() < 1e-9);

    assert_eq!(Direction::nearest(0.0), Direction::Right);
    assert_eq!(Direction::nearest(45.0), Direction::Right);
    assert_eq!(Direction::nearest(46.0), Direction::Up);
    assert_eq!(Direction::nearest(200.0), Direction::Left);
    assert_eq!(Direction::nearest(300.0), Direction::Down);
    assert_eq!(Direction::nearest(350.0), Direction::Right);

    Ok(())
}

#[tokio::test]
async fn test_duty_cycle_ratio() -> Result<(), Box<dyn Error>> {
    let settings = settings(JoystickMode::DutyCycle);
    assert_eq!(secondary_ratio(0.0, 1.0, 0.0, &settings), 0.0);
    assert!((secondary_ratio(22.5, 0.9, 0.4, &settings) - 0.5).abs() < 1e-9);
    assert!((secondary_ratio(-22.5, 0.9, -0.4, &settings) - 0.5).abs() < 1e-9);
    assert_eq!(secondary_ratio(45.0, 0.7, 0.7, &settings), 1.0);
    // Below the minimum ratio
    assert_eq!(secondary_ratio(1.0, 1.0, 0.02, &settings), 0.0);

    Ok(())
}

#[tokio::test]
async fn test_duty_cycle_diagonal_assist() -> Result<(), Box<dyn Error>> {
    let mut settings = settings(JoystickMode::DutyCycle);
    settings.diagonal_assist = Some(DiagonalAssistConfig {
        min_angle: 8.0,
        max_angle: 30.0,
        axis_threshold_multiplier: 1.5,
    });

    // Past the minimum angle the ratio is raised to offset / max_angle
    let (x, y) = at(15.0);
    assert!((secondary_ratio(15.0, x, y, &settings) - 0.5).abs() < 1e-9);

    // Below the minimum angle with one axis near center nothing changes
    let (x, y) = at(5.0);
    assert!((secondary_ratio(5.0, x, y, &settings) - 5.0 / 45.0).abs() < 1e-9);

    // Both axes past the threshold raise the ratio to at least min_ratio
    let mut settings = settings.clone();
    settings.duty_cycle.min_ratio = 0.3;
    assert!((secondary_ratio(5.0, 0.5, 0.35, &settings) - 0.3).abs() < 1e-9);

    Ok(())
}

#[tokio::test]
async fn test_duty_cycle_period_and_timing() -> Result<(), Box<dyn Error>> {
    let config = DutyCycleConfig {
        frequency: 100.0,
        max_events_per_second: Some(20.0),
        ..Default::default()
    };
    assert_eq!(period(&config), Duration::from_millis(100));

    // The cap never shortens the period
    let config = DutyCycleConfig {
        frequency: 10.0,
        max_events_per_second: Some(100.0),
        ..Default::default()
    };
    assert_eq!(period(&config), Duration::from_millis(100));

    // Frequencies that cannot produce a period fall back instead of panicking
    for frequency in [f64::NAN, 1.0e-300, 0.0] {
        let config = DutyCycleConfig {
            frequency,
            ..Default::default()
        };
        assert_eq!(period(&config), MAX_PERIOD);
    }

    let timing = PulseTiming::from_ratio(0.01, Duration::from_millis(100));
    assert_eq!(timing.on, MIN_PHASE);
    assert_eq!(timing.off, Duration::from_millis(99));

    Ok(())
}

#[tokio::test]
async fn test_duty_cycle_compute() -> Result<(), Box<dyn Error>> {
    let (_keyboard, mut translator) = translator(settings(JoystickMode::DutyCycle));

    let (x, y) = at(0.0);
    assert_eq!(translator.compute(x, y), Output::single(Direction::Right));

    let (x, y) = at(112.5);
    let output = translator.compute(x, y);
    assert_eq!(output.primary, Some(Direction::Up));
    assert_eq!(output.secondary, Some(Direction::Left));
    assert!((output.ratio - 0.5).abs() < 1e-6);

    let (x, y) = at(-30.0);
    let output = translator.compute(x, y);
    assert_eq!(output.primary, Some(Direction::Right));
    assert_eq!(output.secondary, Some(Direction::Down));

    assert_eq!(translator.compute(0.1, 0.05), Output::default());

    Ok(())
}

#[tokio::test]
async fn test_hold_mode_sweep() -> Result<(), Box<dyn Error>> {
    let (keyboard, mut translator) = translator(settings(JoystickMode::Hold));

    for step in 0..=1440 {
        let angle = step as f64 * 0.5;
        let (x, y) = at(angle);
        translator.update(x, y)?;
        let held = keyboard.held_keys();
        assert!(
            (1..=2).contains(&held.len()),
            "held {held:?} at {angle} degrees"
        );
        assert!((1..=2).contains(&translator.output().key_count()));
    }

    // And back the other way
    for step in (0..=1440).rev() {
        let angle = step as f64 * 0.5;
        let (x, y) = at(angle);
        translator.update(x, y)?;
        let held = keyboard.held_keys();
        assert!(
            (1..=2).contains(&held.len()),
            "held {held:?} at {angle} degrees"
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_hold_mode_add_drop_reanchor() -> Result<(), Box<dyn Error>> {
    let (keyboard, mut translator) = translator(settings(JoystickMode::Hold));

    for angle in [0.0, 10.0, 20.0] {
        let (x, y) = at(angle);
        translator.update(x, y)?;
        assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D]));
    }

    for angle in [30.0, 45.0, 60.0] {
        let (x, y) = at(angle);
        translator.update(x, y)?;
        assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D, KeyCode::KEY_W]));
    }

    for angle in [70.0, 90.0, 110.0] {
        let (x, y) = at(angle);
        translator.update(x, y)?;
        assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_W]));
    }

    let (x, y) = at(115.0);
    translator.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_W, KeyCode::KEY_A]));

    Ok(())
}

#[tokio::test]
async fn test_hold_mode_hysteresis() -> Result<(), Box<dyn Error>> {
    let (keyboard, mut translator) = translator(settings(JoystickMode::Hold));

    for angle in [0.0, 30.0, 15.0] {
        let (x, y) = at(angle);
        translator.update(x, y)?;
    }
    // Still above half the add threshold
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D, KeyCode::KEY_W]));

    let (x, y) = at(10.0);
    translator.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D]));

    Ok(())
}

#[tokio::test]
async fn test_hold_mode_diagonal_assist() -> Result<(), Box<dyn Error>> {
    let assist = DiagonalAssistConfig {
        min_angle: 8.0,
        max_angle: 30.0,
        axis_threshold_multiplier: 1.5,
    };

    // Without assist 10 degrees is under the add threshold
    let (keyboard, mut plain) = translator(settings(JoystickMode::Hold));
    let (x, y) = at(10.0);
    plain.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D]));

    // Past the minimum angle the segment starts early
    let mut assisted = settings(JoystickMode::Hold);
    assisted.diagonal_assist = Some(assist);
    let (keyboard, mut windowed) = translator(assisted);
    windowed.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D, KeyCode::KEY_W]));

    // 9 degrees is under the abandon threshold but still inside the assist
    // window, so the pair is kept without any output
    let emitted = keyboard.events().len();
    let (x, y) = at(9.0);
    windowed.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D, KeyCode::KEY_W]));
    assert_eq!(keyboard.events().len(), emitted);

    // Outside the window with only one axis engaged
    let (x, y) = at(5.0);
    windowed.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D]));

    // Both axes past 1.5 x deadzone starts a segment below the minimum angle
    let mut engaged = settings(JoystickMode::Hold);
    engaged.deadzone = 0.1;
    engaged.diagonal_assist = Some(DiagonalAssistConfig {
        min_angle: 20.0,
        ..assist
    });
    let (keyboard, mut axes) = translator(engaged.clone());
    let (x, y) = at(15.0);
    axes.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D, KeyCode::KEY_W]));

    // Same angle with the axis threshold out of reach
    engaged.diagonal_assist = Some(DiagonalAssistConfig {
        min_angle: 20.0,
        max_angle: 30.0,
        axis_threshold_multiplier: 5.0,
    });
    let (keyboard, mut unreachable) = translator(engaged);
    unreachable.update(x, y)?;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D]));

    Ok(())
}

#[tokio::test]
async fn test_deadzone_releases_everything()-> Result<(), Box<dyn Error>> {
    let (keyboard, mut translator) = translator(settings(JoystickMode::Hold));

    translator.update(0.1, 0.0)?;
    assert!(keyboard.held_keys().is_empty());
    assert!(keyboard.events().is_empty());

    let (x, y) = at(45.0);
    translator.update(x, y)?;
    assert_eq!(keyboard.held_keys().len(), 2);

    translator.update(0.05, 0.05)?;
    assert!(keyboard.held_keys().is_empty());
    assert!(translator.held().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duty_cycle_pulse_respects_cap() -> Result<(), Box<dyn Error>> {
    let mut settings = settings(JoystickMode::DutyCycle);
    settings.duty_cycle.frequency = 100.0;
    settings.duty_cycle.max_events_per_second = Some(20.0);
    let (keyboard, mut translator) = translator(settings);

    let (x, y) = at(22.5);
    translator.update(x, y)?;
    assert_eq!(translator.pulsing(), Some(Direction::Up));
    assert_eq!(translator.held(), &[Direction::Right]);

    tokio::time::sleep(Duration::from_secs(1)).await;

    let transitions = keyboard
        .events()
        .iter()
        .filter(|e| {
            matches!(
                e.event,
                OutputEvent::KeyDown(KeyCode::KEY_W, _) | OutputEvent::KeyUp(KeyCode::KEY_W, _)
            )
        })
        .count();
    assert!(transitions > 0);
    assert!(transitions <= 22, "{transitions} transitions in one second");

    translator.update(0.0, 0.0)?;
    assert!(keyboard.held_keys().is_empty());
    assert_eq!(translator.pulsing(), None);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duty_cycle_pulse_becomes_continuous() -> Result<(), Box<dyn Error>> {
    let (keyboard, mut translator) = translator(settings(JoystickMode::DutyCycle));

    let (x, y) = at(22.5);
    translator.update(x, y)?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(translator.pulsing(), Some(Direction::Up));

    let (x, y) = at(44.0);
    translator.update(x, y)?;
    assert_eq!(translator.pulsing(), None);
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D, KeyCode::KEY_W]));

    // The handed over key stays down
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(keyboard.held_keys(), keys(&[KeyCode::KEY_D, KeyCode::KEY_W]));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duty_cycle_secondary_switches_side() -> Result<(), Box<dyn Error>> {
    let (keyboard, mut translator) = translator(settings(JoystickMode::DutyCycle));

    let (x, y) = at(20.0);
    translator.update(x, y)?;
    assert_eq!(translator.pulsing(), Some(Direction::Up));

    let (x, y) = at(-20.0);
    translator.update(x, y)?;
    assert_eq!(translator.pulsing(), Some(Direction::Down));
    assert!(!keyboard.held_keys().contains(&KeyCode::KEY_W));
    assert!(keyboard.held_keys().len() <= 2);

    translator.release_all();
    assert!(keyboard.held_keys().is_empty());

    Ok(())
}
