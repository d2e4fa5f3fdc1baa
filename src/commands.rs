use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::config::{encode, Profile, Settings};
use crate::device::{Connection, DeviceSnapshot};
use crate::serial::{self, CancelToken, ParseResult};

/// A named raw command sent to the device verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetCommand {
    pub name: String,
    pub command: String,
}

impl PresetCommand {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
        }
    }
}

/// Asks the device to print its stored configuration.
pub const READ_CONFIG_COMMAND: &str = "RD";

/// Makes the device report immediately (zero-second countdown).
pub const TRIGGER_COMMAND: &str = "CD0";

/// Pause between consecutive lines of a command sequence.
pub const SEQUENCE_GAP: Duration = Duration::from_millis(100);

/// Commands seeded into a fresh command store.
pub fn preset_commands() -> Vec<PresetCommand> {
    vec![
        PresetCommand::new("Trigger immediately (countdown 0 second)", "CD0"),
        PresetCommand::new("Countdown 2 seconds", "CD2"),
        PresetCommand::new("SD2", "SD2"),
        PresetCommand::new("TD4", "TD4"),
    ]
}

/// Load a profile from a JSON file.
pub fn load_profile(path: &Path) -> anyhow::Result<Profile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid profile {}", path.display()))
}

/// Validate (unless told not to) and encode a profile.
pub fn encode_profile(profile: &Profile, validate: bool) -> anyhow::Result<String> {
    if validate {
        let invalid = profile.invalid_fields();
        if !invalid.is_empty() {
            for field in &invalid {
                if let Err(e) = profile.check_field(*field) {
                    log::error!("{}", e);
                }
            }
            bail!("Profile has {} invalid field(s)", invalid.len());
        }
    }
    Ok(encode(profile)?)
}

/// Read back the configuration and trigger a report.
pub fn refresh_sequence() -> Vec<String> {
    vec![READ_CONFIG_COMMAND.to_string(), TRIGGER_COMMAND.to_string()]
}

/// Send a validated profile, then trigger a report so the device shows it.
pub fn apply_sequence(profile: &Profile) -> anyhow::Result<Vec<String>> {
    let command = encode_profile(profile, true)?;
    Ok(vec![command, TRIGGER_COMMAND.to_string()])
}

/// Queue `lines` in order, pausing [`SEQUENCE_GAP`] between them.
pub fn send_sequence(connection: &Connection, lines: &[String]) {
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            std::thread::sleep(SEQUENCE_GAP);
        }
        log::info!("Sending {}", line);
        connection.send(line);
    }
}

pub fn list_ports() -> anyhow::Result<()> {
    let ports = serial::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  {:04X}:{:04X}  {}",
                port.port_name,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

pub fn list_presets() {
    for preset in preset_commands() {
        println!("{:<6} {}", preset.command, preset.name);
    }
}

/// Open the device, send `outgoing` as a sequence, then print decoded traffic
/// until `wait` elapses (or forever when `None`) or the process is signalled.
pub fn run_session(
    settings: &Settings,
    outgoing: &[String],
    wait: Option<Duration>,
) -> anyhow::Result<DeviceSnapshot> {
    let port_name = settings
        .port
        .clone()
        .context("No serial port given (use --port or the settings file)")?;

    let (tx, rx) = mpsc::channel();
    let mut connection = Connection::builder(port_name.as_str())
        .settings(settings.clone())
        .on_parsed(move |line, result| {
            let _ = tx.send((line.to_string(), result));
        })
        .open()
        .with_context(|| format!("Failed to open {}", port_name))?;

    let stop = CancelToken::new();
    stop.cancel_on_interrupt();
    stop.cancel_on_termination();

    send_sequence(&connection, outgoing);

    let mut snapshot = DeviceSnapshot::new();
    let started = Instant::now();
    let poll = settings.poll_interval().min(Duration::from_millis(200));
    while !stop.is_cancelled() && connection.is_open() {
        if wait.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        match rx.recv_timeout(poll) {
            Ok((line, result)) => {
                print_result(&line, &result);
                snapshot.apply(&result);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    connection.close();
    print_summary(&snapshot);
    Ok(snapshot)
}

fn print_summary(snapshot: &DeviceSnapshot) {
    match snapshot.updated_at {
        Some(at) => println!("Last update: {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => println!("Last update: never"),
    }
    if !snapshot.config.is_empty() {
        if let Ok(json) = serde_json::to_string_pretty(&snapshot.reported_profile()) {
            println!("Reported configuration:\n{}", json);
        }
    }
}

fn print_result(line: &str, result: &ParseResult) {
    match result {
        ParseResult::Telemetry(record) => match serde_json::to_string(record) {
            Ok(json) => println!("{:<40} {}", line, json),
            Err(_) => println!("{}", line),
        },
        ParseResult::Ack(ack) => println!("{:<40} {:?}", line, ack),
        ParseResult::Unrecognized => println!("{}", line),
    }
}
