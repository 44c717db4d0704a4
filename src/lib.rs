//! # Meterlink Core Library
//!
//! Decodes the readings handheld digital multimeters stream over a
//! serial link into typed measurements: numeric value, unit and SI
//! prefix, on exact decimals.
//!
//! Supported meters:
//! - Voltcraft ME-32 (polled, CR-delimited ASCII frames)
//! - Voltcraft VC-840 (continuous segment-display stream)
//!
//! ## Features
//!
//! - Self-synchronizing decoders that drop garbled frames and recover
//! - SI prefix rescaling without binary-float rounding artifacts
//! - Receiver fan-out with a channel adapter for easy consumption
//! - Serial connection management with per-device port parameters
//! - Simulated meters for development without hardware
//!
//! ## Example
//!
//! ```rust,no_run
//! use meterlink_core::{measurement_channel, DeviceConnection, SourceRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let registry = SourceRegistry::with_builtin();
//!     let mut connection =
//!         DeviceConnection::open(&registry, "/dev/ttyUSB0", "Voltcraft VC-840")?;
//!
//!     let (receiver, measurements) = measurement_channel();
//!     connection.add_receiver(receiver);
//!     for measurement in measurements.iter().take(10) {
//!         println!("{measurement}");
//!     }
//!
//!     connection.close();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::config::{AppConfig, ConfigError, ConnectionProfile};
pub use crate::core::connection::{ConnectError, DeviceConnection};
pub use crate::core::device::{DataDevice, DeviceError, StreamDevice};
pub use crate::core::measurement::Measurement;
pub use crate::core::port::{DataBits, Parity, PortParameters, StopBits};
pub use crate::core::protocol::{VoltcraftMe32, VoltcraftVc840};
pub use crate::core::receiver::{measurement_channel, ChannelReceiver, DataReceiver, ReceiverSet};
pub use crate::core::registry::{RegistryError, SourceRegistry};
pub use crate::core::si::{convert, Prefix};
pub use crate::core::simulator::{
    PipeDevice, PipeProducer, ReplayDevice, SimulatedMe32, SimulatedVc840,
};
pub use crate::core::source::{DataSource, SourceState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
