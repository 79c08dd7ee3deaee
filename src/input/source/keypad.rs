use std::{error::Error, thread, time};

use tokio::sync::mpsc;

use crate::{drivers::keypad::driver::Driver, input::mapper::Command};

/// Reads reports from a keypad hidraw device and forwards them to the
/// [crate::input::mapper::Mapper]
#[derive(Debug)]
pub struct KeypadSource {
    path: String,
    mapper_tx: mpsc::Sender<Command>,
}

impl KeypadSource {
    pub fn new(path: String, mapper_tx: mpsc::Sender<Command>) -> Self {
        Self { path, mapper_tx }
    }

    /// Poll the device until it fails or the mapper stops listening
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::debug!("Starting keypad source for {}", self.path);
        let device_path = self.path.clone();
        let tx = self.mapper_tx.clone();

        // Spawn a blocking task to read the reports
        let task =
            tokio::task::spawn_blocking(move || -> Result<(), Box<dyn Error + Send + Sync>> {
                let mut driver = Driver::new(device_path.as_str())?;
                loop {
                    let samples = driver.poll()?;
                    if !samples.is_empty() {
                        tx.blocking_send(Command::ProcessSamples(samples))?;
                    } else if tx.is_closed() {
                        return Ok(());
                    }

                    // Reads already block for the HID timeout, so only yield briefly
                    let duration = time::Duration::from_micros(250);
                    thread::sleep(duration);
                }
            });

        // Wait for the task to finish
        task.await??;
        log::debug!("Keypad source for {} stopped", self.path);

        Ok(())
    }
}
