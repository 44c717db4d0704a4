//! Meterlink - multimeter serial acquisition CLI
//!
//! Headless frontend for the decoding library: list serial ports and
//! supported device types, stream decoded measurements from a
//! connected meter or from a built-in simulated one.

use anyhow::Context;
use clap::{Parser, Subcommand};
use meterlink_core::{
    measurement_channel, AppConfig, DataDevice, DeviceConnection, Measurement, Prefix,
    SimulatedMe32, SimulatedVc840, SourceRegistry,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Meterlink CLI
#[derive(Parser, Debug)]
#[command(
    name = "meterlink",
    version,
    about = "Serial acquisition for handheld digital multimeters",
    long_about = None
)]
struct Cli {
    /// Configuration file with saved connection profiles
    #[arg(short, long, default_value = "meterlink.toml")]
    config: PathBuf,

    /// Quiet mode: print measurements only
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,
    /// List supported device types
    ListDevices,
    /// Stream measurements from a connected meter
    Read {
        /// Serial port name (e.g. /dev/ttyUSB0, COM3)
        #[arg(short, long)]
        port: Option<String>,
        /// Device type (see list-devices)
        #[arg(short, long)]
        device: Option<String>,
        /// Saved profile supplying port and device type
        #[arg(long)]
        profile: Option<String>,
        /// Prefix each measurement with a timestamp
        #[arg(short, long)]
        timestamps: bool,
        /// Rescale values to this SI prefix before printing
        #[arg(long)]
        to_prefix: Option<Prefix>,
        /// Stop after this many measurements
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
    /// Stream measurements from a built-in simulated meter
    Simulate {
        /// Device type to simulate
        #[arg(short, long, default_value = "Voltcraft VC-840")]
        device: String,
        /// Stop after this many measurements
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// Prefix each measurement with a timestamp
        #[arg(short, long)]
        timestamps: bool,
        /// Rescale values to this SI prefix before printing
        #[arg(long)]
        to_prefix: Option<Prefix>,
    },
}

struct PrintOptions {
    timestamps: bool,
    to_prefix: Option<Prefix>,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging; logs go to stderr so measurement output
    // stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::ListPorts => cmd_list_ports(&cli),
        Commands::ListDevices => {
            cmd_list_devices();
            Ok(())
        }
        Commands::Read {
            port,
            device,
            profile,
            timestamps,
            to_prefix,
            count,
        } => cmd_read(
            &cli,
            port.as_deref(),
            device.as_deref(),
            profile.as_deref(),
            &PrintOptions {
                timestamps: *timestamps,
                to_prefix: *to_prefix,
            },
            *count,
        ),
        Commands::Simulate {
            device,
            count,
            timestamps,
            to_prefix,
        } => cmd_simulate(
            &cli,
            device,
            *count,
            &PrintOptions {
                timestamps: *timestamps,
                to_prefix: *to_prefix,
            },
        ),
    }
}

fn cmd_list_ports(cli: &Cli) -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("cannot enumerate serial ports")?;
    if ports.is_empty() {
        if !cli.quiet {
            eprintln!("No serial ports found.");
        }
        return Ok(());
    }
    for port in &ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

fn cmd_list_devices() {
    let registry = SourceRegistry::with_builtin();
    for name in registry.device_names() {
        println!("{name}");
    }
}

fn cmd_read(
    cli: &Cli,
    port: Option<&str>,
    device: Option<&str>,
    profile: Option<&str>,
    options: &PrintOptions,
    count: Option<usize>,
) -> anyhow::Result<()> {
    let registry = SourceRegistry::with_builtin();
    let (port, device_type) = resolve_target(cli, port, device, profile)?;
    let running = interrupt_flag()?;
    let mut connection = DeviceConnection::open(&registry, &port, &device_type)
        .with_context(|| format!("cannot open {device_type} on {port}"))?;
    if !cli.quiet {
        eprintln!("Connected: {connection}. Press Ctrl+C to stop.");
    }
    stream_measurements(&connection, options, count, &running);
    connection.close();
    if !cli.quiet {
        eprintln!("Disconnected.");
    }
    Ok(())
}

fn cmd_simulate(
    cli: &Cli,
    device_type: &str,
    count: usize,
    options: &PrintOptions,
) -> anyhow::Result<()> {
    let registry = SourceRegistry::with_builtin();
    let source = registry.create(device_type)?;
    let device: Arc<dyn DataDevice> = match device_type {
        "Voltcraft ME-32" => Arc::new(SimulatedMe32::new()),
        "Voltcraft VC-840" => Arc::new(SimulatedVc840::new()),
        other => anyhow::bail!("no simulator for device type: {other}"),
    };
    let running = interrupt_flag()?;
    let mut connection = DeviceConnection::attach(source, device)?;
    if !cli.quiet {
        eprintln!("Simulating: {connection}.");
    }
    stream_measurements(&connection, options, Some(count), &running);
    connection.close();
    Ok(())
}

/// Flag cleared by Ctrl+C; the streaming loop polls it so the
/// connection still gets a clean close.
fn interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("cannot install Ctrl+C handler")?;
    Ok(running)
}

/// Resolve port and device type from flags or a saved profile.
fn resolve_target(
    cli: &Cli,
    port: Option<&str>,
    device: Option<&str>,
    profile: Option<&str>,
) -> anyhow::Result<(String, String)> {
    if let (Some(port), Some(device)) = (port, device) {
        return Ok((port.to_string(), device.to_string()));
    }
    if let Some(name) = profile {
        let config = AppConfig::load(&cli.config)
            .with_context(|| format!("cannot load {}", cli.config.display()))?;
        let profile = config
            .find_profile(name)
            .with_context(|| format!("no profile named {name} in {}", cli.config.display()))?;
        return Ok((profile.port.clone(), profile.device_type.clone()));
    }
    anyhow::bail!("specify --port and --device together, or --profile")
}

/// Print measurements as they arrive until `count` is reached, the
/// decoder finishes (stream end, device error) or `running` clears.
fn stream_measurements(
    connection: &DeviceConnection,
    options: &PrintOptions,
    count: Option<usize>,
    running: &AtomicBool,
) {
    let (receiver, measurements) = measurement_channel();
    connection.add_receiver(receiver);

    let mut seen = 0usize;
    while running.load(Ordering::SeqCst) {
        match measurements.recv_timeout(Duration::from_millis(500)) {
            Ok(measurement) => {
                print_measurement(&measurement, options);
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if !connection.is_active() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn print_measurement(measurement: &Measurement, options: &PrintOptions) {
    let measurement = match options.to_prefix {
        Some(prefix) => measurement.to_prefix(prefix),
        None => measurement.clone(),
    };
    if options.timestamps {
        let now = chrono::Local::now();
        println!("{} {measurement}", now.format("%Y-%m-%d %H:%M:%S%.3f"));
    } else {
        println!("{measurement}");
    }
}
