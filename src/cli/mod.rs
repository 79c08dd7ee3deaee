pub mod profile;
pub mod run;

use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand};
use profile::{handle_check, handle_keys};
use run::handle_run;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Translate keypad input into keyboard output
    Run {
        /// Path to the keypad hidraw device (e.g. /dev/hidraw3)
        #[arg(short, long)]
        device: String,
        /// Profile to load. The default profile maps the stick to WASD.
        #[arg(short, long)]
        profile: Option<PathBuf>,
        /// Log keyboard output instead of creating a virtual keyboard
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a profile and print what it binds
    Check {
        /// Profile to check
        profile: PathBuf,
    },
    /// List the key names that can be used in profiles
    Keys,
}

pub async fn main_cli(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.cmd {
        Commands::Run {
            device,
            profile,
            dry_run,
        } => handle_run(device, profile, dry_run).await?,
        Commands::Check { profile } => handle_check(profile)?,
        Commands::Keys => handle_keys(),
    }

    Ok(())
}
