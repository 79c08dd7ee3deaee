use std::{error::Error, path::PathBuf};

use crate::{
    config::Profile,
    drivers::keypad::decoder::KEY_COUNT,
    input::{dispatcher::LogicalAction, target::keymap::KEY_NAMES},
};

/// Load the given profile and print a summary of it
pub fn handle_check(path: PathBuf) -> Result<(), Box<dyn Error + Send + Sync>> {
    let profile = Profile::from_yaml_file(&path)?;
    println!("Profile '{}' from {} is valid", profile.name, path.display());

    for key in 1..=KEY_COUNT as u8 {
        let Some(action) = profile.action(key) else {
            continue;
        };
        if *action == LogicalAction::Disabled {
            continue;
        }
        println!("  Key {key:>2}: {action:?}");
    }
    for definition in profile.macros() {
        println!(
            "  Macro '{}': {} steps",
            definition.name,
            definition.steps.len()
        );
    }

    let joystick = &profile.joystick;
    println!(
        "  Joystick: {:?} mode, deadzone {}, keys {:?}",
        joystick.mode, joystick.deadzone, joystick.keys
    );

    Ok(())
}

pub fn handle_keys() {
    for (name, code) in KEY_NAMES {
        println!("{name:<12} {code:?}");
    }
}
