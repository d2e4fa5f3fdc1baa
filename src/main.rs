use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use freeze_drip_lib::commands;
use freeze_drip_lib::config::Settings;

#[derive(Parser)]
#[command(name = "freeze-drip", version, about = "Talk to a FreezeDrip device over serial")]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true, default_value = "freeze-drip.json")]
    config: PathBuf,

    /// Log protocol traffic
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports
    Ports,
    /// List built-in raw commands
    Presets,
    /// Print the command string for a profile
    Encode {
        profile: PathBuf,
        /// Skip range checks
        #[arg(long)]
        no_validate: bool,
    },
    /// Print decoded lines until interrupted
    Monitor {
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Send raw text and print replies
    Send {
        #[arg(short, long)]
        port: Option<String>,
        text: String,
        /// Seconds to wait for replies
        #[arg(short, long, default_value_t = 3)]
        wait: u64,
    },
    /// Ask the device for its configuration and print what it reports
    Refresh {
        #[arg(short, long)]
        port: Option<String>,
        #[arg(short, long, default_value_t = 3)]
        wait: u64,
    },
    /// Send a profile to the device and print replies
    Apply {
        #[arg(short, long)]
        port: Option<String>,
        profile: PathBuf,
        #[arg(short, long, default_value_t = 3)]
        wait: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_level));

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::Ports => commands::list_ports()?,
        Command::Presets => commands::list_presets(),
        Command::Encode { profile, no_validate } => {
            let profile = commands::load_profile(&profile)?;
            println!("{}", commands::encode_profile(&profile, !no_validate)?);
        }
        Command::Monitor { port } => {
            settings.port = port.or(settings.port);
            commands::run_session(&settings, &[], None)?;
        }
        Command::Send { port, text, wait } => {
            settings.port = port.or(settings.port);
            commands::run_session(&settings, &[text], Some(Duration::from_secs(wait)))?;
        }
        Command::Refresh { port, wait } => {
            settings.port = port.or(settings.port);
            let outgoing = commands::refresh_sequence();
            commands::run_session(&settings, &outgoing, Some(Duration::from_secs(wait)))?;
        }
        Command::Apply { port, profile, wait } => {
            settings.port = port.or(settings.port);
            let profile = commands::load_profile(&profile)?;
            let outgoing = commands::apply_sequence(&profile)?;
            let snapshot =
                commands::run_session(&settings, &outgoing, Some(Duration::from_secs(wait)))?;
            match snapshot.last_ack {
                Some(ack) => log::info!("Device replied {:?}", ack),
                None => log::warn!("No acknowledgement received"),
            }
        }
    }

    Ok(())
}
