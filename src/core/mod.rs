//! Core module containing the main functionality of Meterlink
//!
//! This module provides:
//! - Byte-level device I/O over serial ports
//! - Protocol decoders for the supported meters
//! - Decoder lifecycle and measurement fan-out
//! - Device-type registry and connection management
//! - Simulated meters for development and tests
//! - SI prefix handling on exact decimals

pub mod connection;
pub mod device;
pub mod measurement;
pub mod port;
pub mod protocol;
pub mod receiver;
pub mod registry;
pub mod si;
pub mod simulator;
pub mod source;
