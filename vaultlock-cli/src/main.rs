//! vaultlock command-line front end
//!
//! Drives the security settings stored in a data directory: inspect them,
//! change the lock options, manage the PIN and check a PIN the way the lock
//! screen would. Every command loads the record, applies one change through
//! the settings facade and exits.

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use vaultlock_core::{
    FileStore, KdfParams, PinFlowStep, PinPolicy, SecurityError, SecurityOptions,
    SecuritySettings,
};

/// vaultlock security settings
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the security record
    #[arg(long, env = "VAULTLOCK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Vault database files erased together with the record on lockout
    #[arg(long = "database")]
    databases: Vec<PathBuf>,

    /// Use low-memory Argon2 parameters for new PINs
    #[arg(long)]
    low_memory: bool,

    /// Read PINs as lines from stdin instead of prompting on the terminal
    #[arg(long)]
    pin_stdin: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current settings as JSON
    Status,
    /// Set the idle-lock timeout in seconds (0, 30, 60, 120, 300, or -1 for never)
    SetTimeout {
        #[arg(allow_hyphen_values = true)]
        seconds: i64,
    },
    /// Set the number of failed attempts before the vault is erased (1, 3, 5, 10, 15)
    SetThreshold { attempts: u32 },
    /// Turn delete-on-failure on or off
    DeleteOnFailure {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Keep decrypted credentials in memory
    RememberPasswords {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Mask passwords on screen
    HidePasswords {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Set a PIN and turn the PIN gate on
    EnablePin,
    /// Turn the PIN gate off, clearing the PIN and delete-on-failure
    DisablePin,
    /// Replace the current PIN
    ChangePin,
    /// Remove the PIN after verifying it
    RemovePin,
    /// Check a PIN as the lock screen would
    Unlock,
}

/// Where PINs come from. They are never taken from argv, which would leave
/// them in shell history and the process list.
enum PinSource {
    Terminal,
    Stdin(io::StdinLock<'static>),
}

impl PinSource {
    fn new(from_stdin: bool) -> Self {
        if from_stdin {
            Self::Stdin(io::stdin().lock())
        } else {
            Self::Terminal
        }
    }

    fn read(&mut self, prompt: &str) -> Result<String> {
        match self {
            Self::Terminal => rpassword::prompt_password(prompt).context("Failed to read PIN"),
            Self::Stdin(input) => {
                let mut line = String::new();
                if input.read_line(&mut line).context("Failed to read PIN")? == 0 {
                    bail!("stdin closed before a PIN was read");
                }
                Ok(line.trim_end_matches(['\r', '\n']).to_string())
            }
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("Could not determine data directory")?;
    Ok(base.join("vaultlock"))
}

fn report_step(step: PinFlowStep) {
    match step {
        PinFlowStep::Next(stage) => info!("PIN flow at {:?}", stage),
        PinFlowStep::Committed(intent) => info!("PIN flow committed: {:?}", intent),
    }
}

fn unlock(settings: &mut SecuritySettings<FileStore>, pin: &str) -> Result<()> {
    match settings.verify_unlock_pin(pin) {
        Ok(()) => {
            println!("unlocked");
            Ok(())
        }
        Err(SecurityError::VerificationFailed { remaining }) => {
            bail!("wrong PIN ({} attempts remaining)", remaining)
        }
        Err(SecurityError::Triggered) => {
            warn!("Failed-attempt limit reached");
            bail!("too many failed attempts - vault data has been erased")
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vaultlock=info".parse()?)
                .add_directive("vaultlock_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("Failed to open data directory {:?}", data_dir))?
        .with_wipe_targets(args.databases);

    let options = SecurityOptions {
        pin_policy: PinPolicy::default(),
        kdf: if args.low_memory {
            KdfParams::low_memory()
        } else {
            KdfParams::default()
        },
    };
    let mut settings = SecuritySettings::load_with_options(store, options)
        .context("Failed to load security settings")?;
    let mut pins = PinSource::new(args.pin_stdin);

    match args.command {
        Command::Status => {
            let json = serde_json::to_string_pretty(&settings.snapshot())?;
            println!("{}", json);
        }
        Command::SetTimeout { seconds } => settings.set_lock_timeout_seconds(seconds)?,
        Command::SetThreshold { attempts } => {
            settings.set_delete_on_failure_threshold_count(attempts)?
        }
        Command::DeleteOnFailure { enabled } => settings.set_delete_on_failure_enabled(enabled)?,
        Command::RememberPasswords { enabled } => {
            settings.set_remember_passwords_enabled(enabled)?
        }
        Command::HidePasswords { enabled } => settings.set_hide_passwords_enabled(enabled)?,
        Command::EnablePin => {
            if settings.has_pin() {
                bail!("a PIN is already set; use change-pin");
            }
            match settings.set_pin_enabled(true) {
                Err(SecurityError::PinRequired) => {}
                Err(e) => return Err(e.into()),
                Ok(()) => {}
            }
            report_step(settings.submit_pin(&pins.read("New PIN: ")?)?);
            report_step(settings.submit_pin(&pins.read("Confirm PIN: ")?)?);
            settings.set_pin_enabled(true)?;
        }
        Command::DisablePin => settings.set_pin_enabled(false)?,
        Command::ChangePin => {
            settings.begin_change_pin()?;
            report_step(settings.submit_pin(&pins.read("Current PIN: ")?)?);
            report_step(settings.submit_pin(&pins.read("New PIN: ")?)?);
            report_step(settings.submit_pin(&pins.read("Confirm PIN: ")?)?);
        }
        Command::RemovePin => {
            settings.begin_remove_pin()?;
            report_step(settings.submit_pin(&pins.read("Current PIN: ")?)?);
        }
        Command::Unlock => {
            let pin = pins.read("PIN: ")?;
            unlock(&mut settings, &pin)?
        }
    }

    Ok(())
}
