use std::{error::Error, path::PathBuf, sync::Arc};

use tokio::{
    signal::unix::{signal, SignalKind},
    sync::mpsc,
};

use crate::{
    config::{LoadError, Profile},
    input::{
        mapper::{Command, Mapper},
        source::keypad::KeypadSource,
        target::{debug::DebugKeyboard, keyboard::KeyboardDevice, KeyboardOutput},
    },
};

/// Load the profile at the given path, or the default profile
pub fn load_profile(path: Option<&PathBuf>) -> Result<Profile, LoadError> {
    match path {
        Some(path) => Profile::from_yaml_file(path),
        None => Ok(Profile::default()),
    }
}

/// Run the translator until CTRL+C or the device goes away
pub async fn handle_run(
    device: String,
    profile_path: Option<PathBuf>,
    dry_run: bool,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting padmapper v{}", VERSION);

    let profile = Arc::new(load_profile(profile_path.as_ref())?);
    log::info!("Using profile '{}'", profile.name);

    let keyboard: Arc<dyn KeyboardOutput> = if dry_run {
        log::info!("Dry run: keyboard output will only be logged");
        Arc::new(DebugKeyboard::with_logging())
    } else {
        Arc::new(KeyboardDevice::new()?)
    };

    let mut mapper = Mapper::new(keyboard, profile);
    let tx = mapper.transmitter();

    // Setup CTRL+C handler
    let stop_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for CTRL+C: {e}");
            return;
        }
        log::info!("Shutting down");
        if let Err(e) = stop_tx.send(Command::Stop).await {
            log::error!("Unable to stop mapper: {e}");
        }
    });

    // Reload the profile on SIGHUP
    if let Some(path) = profile_path {
        tokio::spawn(reload_on_hangup(path, tx.clone()));
    }

    // Start reading from the keypad
    let source = KeypadSource::new(device, tx.clone());
    tokio::spawn(async move {
        if let Err(e) = source.run().await {
            log::error!("Keypad source stopped: {e}");
        }
        if let Err(e) = tx.send(Command::Stop).await {
            log::debug!("Mapper already stopped: {e}");
        }
    });

    mapper.run().await?;
    log::info!("padmapper stopped");

    Ok(())
}

async fn reload_on_hangup(path: PathBuf, tx: mpsc::Sender<Command>) {
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            log::warn!("Unable to listen for SIGHUP, profile reload disabled: {e}");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        log::info!("Reloading profile from {}", path.display());
        let profile = match Profile::from_yaml_file(&path) {
            Ok(profile) => profile,
            Err(e) => {
                log::error!("Unable to reload profile, keeping the current one: {e}");
                continue;
            }
        };
        if tx.send(Command::SetProfile(Arc::new(profile))).await.is_err() {
            break;
        }
    }
}
