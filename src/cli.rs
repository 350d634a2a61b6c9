// src/cli.rs
//
// `vitalwatch` command line: a console sink for the monitor.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::io::{list_serial_ports, IoError, SerialConnector};
use crate::logging::init_file_logging;
use crate::monitor::{Monitor, MonitorEvent, StreamEndReason};
use crate::settings::MonitorConfig;
use crate::telemetry::TelemetryUpdate;

#[derive(Parser, Debug)]
#[command(name = "vitalwatch", version, about = "Wristband vitals monitor over a serial link")]
pub struct Args {
    /// Serial port, e.g. COM4 or /dev/ttyUSB0 (overrides the config file)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// TOML config file. Defaults to <config dir>/vitalwatch/monitor.toml when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Run logs to keep in --log-dir, oldest are deleted
    #[arg(long, default_value_t = 10)]
    pub log_keep: usize,

    /// List available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Print each update as one JSON line
    #[arg(long)]
    pub json: bool,
}

pub fn run() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match &args.log_dir {
        Some(dir) => match init_file_logging(dir, args.log_keep) {
            Ok(guard) => Some(guard),
            Err(e) => {
                tlog!("[cli] File logging disabled, {}: {}", dir.display(), e);
                None
            }
        },
        None => None,
    };

    let code = if args.list_ports {
        print_ports()
    } else {
        match resolve_config(&args) {
            Ok(config) => match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime.block_on(monitor_until_done(config, args.json)),
                Err(e) => {
                    tlog!("[cli] Failed to start runtime: {}", e);
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        }
    };

    code
}

/// File settings first, then command line overrides.
pub fn resolve_config(args: &Args) -> Result<MonitorConfig, IoError> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => {
            let path = MonitorConfig::default_path();
            if path.exists() {
                MonitorConfig::load(&path)?
            } else {
                MonitorConfig::default()
            }
        }
    };

    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }

    config.validate()?;
    Ok(config)
}

fn print_ports() -> ExitCode {
    match list_serial_ports() {
        Ok(ports) if ports.is_empty() => {
            println!("No serial ports found");
            ExitCode::SUCCESS
        }
        Ok(ports) => {
            for port in ports {
                let description = [port.manufacturer, port.product]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{:<24} {:<10} {}", port.port_name, port.port_type, description);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn monitor_until_done(config: MonitorConfig, json: bool) -> ExitCode {
    let (mut monitor, mut events) = Monitor::new(SerialConnector, config);
    if let Err(e) = monitor.start() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let mut code = ExitCode::SUCCESS;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(MonitorEvent::Connected { port, baud_rate }) => {
                    println!("Connected to {} at {} baud", port, baud_rate);
                }
                Some(MonitorEvent::Update(update)) => render(&update, json),
                Some(MonitorEvent::ConnectionFailed(e)) => {
                    eprintln!("Serial error: {}", e);
                    code = ExitCode::FAILURE;
                    break;
                }
                Some(MonitorEvent::Ended { reason, stats }) => {
                    println!(
                        "Stream {} ({} readings, {} frames discarded)",
                        reason.as_str(),
                        stats.readings_decoded,
                        stats.discarded_frames()
                    );
                    if reason != StreamEndReason::Stopped {
                        code = ExitCode::FAILURE;
                    }
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tlog!("[cli] Interrupted, stopping monitor");
                monitor.stop();
            }
        }
    }

    monitor.join().await;
    code
}

fn render(update: &TelemetryUpdate, json: bool) {
    if json {
        match serde_json::to_string(update) {
            Ok(line) => println!("{}", line),
            Err(e) => tlog!("[cli] Failed to serialise update: {}", e),
        }
        return;
    }

    println!("----------------------------------------");
    for line in update.display_lines() {
        println!("{}", line);
    }
}
