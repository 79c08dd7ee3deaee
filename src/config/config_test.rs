use std::{error::Error, time::Duration};

use evdev::KeyCode;
use tokio::fs;

use crate::{
    config::{JoystickMode, LoadError, Profile, ProfileConfig},
    input::{
        dispatcher::LogicalAction,
        joystick::DirectionKeys,
        macros::MacroStep,
        target::ModifierKind,
    },
};

const PROFILE_DIR: &str = "./profiles";

/// Every profile shipped with the project must load
#[tokio::test]
async fn check_shipped_profiles() -> Result<(), Box<dyn Error>> {
    let mut checked = 0;
    let mut profile_dir = fs::read_dir(PROFILE_DIR).await?;
    while let Some(entry) = profile_dir.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        println!("Checking profile {path:?}");
        let profile = Profile::from_yaml_file(&path)?;
        assert!(!profile.name.is_empty());
        checked += 1;
    }
    assert!(checked > 0, "no profiles found in {PROFILE_DIR}");

    Ok(())
}

#[tokio::test]
async fn test_load_profile() -> Result<(), Box<dyn Error>> {
    let yaml = r#"
version: 1
kind: KeypadProfile
name: Test
keys:
  1: { tap: a }
  2: { hold: KEY_SPACE }
  3: { key_down: q }
  4: { key_up: q }
  5: { run_macro: hello }
  6: { modifier: ctrl }
  7: { disabled: true }
macros:
  - name: hello
    steps:
      - press: leftshift
      - tap: h
      - release: leftshift
      - delay: 25
      - text: "ello"
joystick:
  deadzone: 0.3
  mode: hold
  keys: { right: l, up: i, left: j, down: k }
  hold: { angle_fraction: 0.3 }
"#;
    let profile = Profile::from_yaml(yaml.to_string())?;

    assert_eq!(profile.name, "Test");
    assert_eq!(profile.action(1), Some(&LogicalAction::Tap(KeyCode::KEY_A)));
    assert_eq!(
        profile.action(2),
        Some(&LogicalAction::Hold(KeyCode::KEY_SPACE))
    );
    assert_eq!(
        profile.action(3),
        Some(&LogicalAction::HoldDown(KeyCode::KEY_Q))
    );
    assert_eq!(profile.action(4), Some(&LogicalAction::HoldUp(KeyCode::KEY_Q)));
    assert_eq!(
        profile.action(5),
        Some(&LogicalAction::RunMacro("hello".to_string()))
    );
    assert_eq!(
        profile.action(6),
        Some(&LogicalAction::HoldModifier(ModifierKind::Control))
    );
    assert_eq!(profile.action(7), Some(&LogicalAction::Disabled));
    assert_eq!(profile.action(8), Some(&LogicalAction::Disabled));
    assert_eq!(profile.action(0), None);
    assert_eq!(profile.action(23), None);

    let macros = profile.macros();
    assert_eq!(macros.len(), 1);
    assert_eq!(
        macros[0].steps,
        vec![
            MacroStep::Press(KeyCode::KEY_LEFTSHIFT),
            MacroStep::Tap(KeyCode::KEY_H),
            MacroStep::Release(KeyCode::KEY_LEFTSHIFT),
            MacroStep::Delay(Duration::from_millis(25)),
            MacroStep::TypeText("ello".to_string()),
        ]
    );

    let joystick = &profile.joystick;
    assert_eq!(joystick.mode, JoystickMode::Hold);
    assert_eq!(joystick.deadzone, 0.3);
    assert_eq!(joystick.hold.angle_fraction, 0.3);
    // Unset fields keep their defaults
    assert_eq!(joystick.hold.hysteresis, 0.5);
    assert_eq!(joystick.duty_cycle.frequency, 20.0);
    assert_eq!(
        joystick.keys,
        DirectionKeys {
            right: KeyCode::KEY_L,
            up: KeyCode::KEY_I,
            left: KeyCode::KEY_J,
            down: KeyCode::KEY_K,
        }
    );

    Ok(())
}

#[tokio::test]
async fn test_minimal_profile_defaults() -> Result<(), Box<dyn Error>> {
    let yaml = "version: 1\nkind: KeypadProfile\nname: Minimal\n";
    let config = ProfileConfig::from_yaml(yaml.to_string())?;
    assert!(config.keys.is_empty());

    let profile = Profile::from_config(&config)?;
    assert_eq!(profile.joystick, Profile::default().joystick);
    assert_eq!(profile.joystick.mode, JoystickMode::DutyCycle);

    let default = Profile::from_config(&ProfileConfig::default_profile())?;
    assert_eq!(default, Profile::default());

    Ok(())
}

#[tokio::test]
async fn test_invalid_profiles() -> Result<(), Box<dyn Error>> {
    let header = "version: 1\nkind: KeypadProfile\nname: Bad\n";

    let result = Profile::from_yaml(format!("{header}keys:\n  1: {{ tap: nope }}\n"));
    assert!(matches!(result, Err(LoadError::InvalidKey { .. })));

    let result = Profile::from_yaml(format!("{header}keys:\n  1: {{ tap: a, hold: b }}\n"));
    assert!(matches!(result, Err(LoadError::InvalidAction { .. })));

    let result = Profile::from_yaml(format!("{header}keys:\n  1: {{ modifier: hyper }}\n"));
    assert!(matches!(result, Err(LoadError::InvalidAction { .. })));

    let result = Profile::from_yaml(format!("{header}keys:\n  23: {{ tap: a }}\n"));
    assert!(matches!(result, Err(LoadError::InvalidValue(_))));

    let result = Profile::from_yaml(format!("{header}joystick:\n  deadzone: 1.5\n"));
    assert!(matches!(result, Err(LoadError::InvalidValue(_))));

    let result = Profile::from_yaml(format!(
        "{header}joystick:\n  hold: {{ angle_fraction: 0.75 }}\n"
    ));
    assert!(matches!(result, Err(LoadError::InvalidValue(_))));

    for frequency in [".nan", "1.0e-300", "-5", ".inf"] {
        let result = Profile::from_yaml(format!(
            "{header}joystick:\n  duty_cycle: {{ frequency: {frequency} }}\n"
        ));
        assert!(
            matches!(result, Err(LoadError::InvalidValue(_))),
            "frequency {frequency} was accepted"
        );
    }

    for field in [
        "duty_cycle: { ratio_exponent: .nan }",
        "duty_cycle: { max_events_per_second: .nan }",
        "hold: { angle_fraction: .nan }",
        "hold: { hysteresis: .nan }",
        "diagonal_assist: { min_angle: .nan }",
    ] {
        let result = Profile::from_yaml(format!("{header}joystick:\n  {field}\n"));
        assert!(
            matches!(result, Err(LoadError::InvalidValue(_))),
            "{field} was accepted"
        );
    }

    let result = Profile::from_yaml(format!(
        "{header}macros:\n  - name: m\n    steps:\n      - {{ tap: a, delay: 5 }}\n"
    ));
    assert!(matches!(result, Err(LoadError::InvalidAction { .. })));

    let result = Profile::from_yaml(format!("{header}keys: [1, 2]\n"));
    assert!(matches!(result, Err(LoadError::DeserializeError(_))));

    let result = Profile::from_yaml_file("./profiles/does-not-exist.yaml");
    assert!(matches!(result, Err(LoadError::IoError(_))));

    Ok(())
}
