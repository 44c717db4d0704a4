//! Serial connection layer binding a decoder to an open port.

use crate::core::device::{DataDevice, StreamDevice};
use crate::core::port::{DataBits, Parity, StopBits};
use crate::core::receiver::DataReceiver;
use crate::core::registry::{RegistryError, SourceRegistry};
use crate::core::source::DataSource;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Connection establishment error types
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Device type not present in the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Failed to open or configure the serial port.
    #[error("failed to open port: {0}")]
    Port(#[from] serialport::Error),
    /// Failed to spawn the decode thread.
    #[error("failed to spawn decode thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Read timeout on the port. Bounds how long a close waits for the
/// decode loop to notice shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// One active meter connection: an open device, a running decoder and
/// the background thread driving it.
///
/// Dropping the connection closes it.
pub struct DeviceConnection {
    device: Arc<dyn DataDevice>,
    source: Arc<dyn DataSource>,
    handle: Option<thread::JoinHandle<()>>,
    description: String,
}

impl DeviceConnection {
    /// Open `port_name` with the parameters the decoder for
    /// `device_type` requires, and start decoding in a background
    /// thread.
    pub fn open(
        registry: &SourceRegistry,
        port_name: &str,
        device_type: &str,
    ) -> Result<Self, ConnectError> {
        let source = registry.create(device_type)?;
        let params = source.port_parameters();

        let mut port = serialport::new(port_name, params.baud_rate)
            .data_bits(to_serial_data_bits(params.data_bits))
            .stop_bits(to_serial_stop_bits(params.stop_bits))
            .parity(to_serial_parity(params.parity))
            .timeout(READ_TIMEOUT)
            .open()?;
        port.write_data_terminal_ready(params.dtr)?;
        port.write_request_to_send(params.rts)?;
        info!(port = port_name, device = device_type, %params, "serial port opened");

        let writer = port.try_clone()?;
        let device: Arc<dyn DataDevice> = Arc::new(StreamDevice::new(port, writer, port_name));
        Self::attach_named(source, device, device_type)
    }

    /// Start decoding from an already constructed device, e.g. a
    /// simulated meter.
    pub fn attach(
        source: Arc<dyn DataSource>,
        device: Arc<dyn DataDevice>,
    ) -> Result<Self, ConnectError> {
        let device_type = source
            .supported_devices()
            .first()
            .copied()
            .unwrap_or("unknown")
            .to_string();
        Self::attach_named(source, device, &device_type)
    }

    fn attach_named(
        source: Arc<dyn DataSource>,
        device: Arc<dyn DataDevice>,
        device_type: &str,
    ) -> Result<Self, ConnectError> {
        let description = format!("{} on {}", device_type, device.name());
        let thread_source = Arc::clone(&source);
        let thread_device = Arc::clone(&device);
        let handle = thread::Builder::new()
            .name(format!("decode {}", device.name()))
            .spawn(move || thread_source.start(thread_device))?;
        Ok(Self {
            device,
            source,
            handle: Some(handle),
            description,
        })
    }

    /// Register a receiver on the underlying decoder.
    pub fn add_receiver(&self, receiver: Arc<dyn DataReceiver>) {
        self.source.add_receiver(receiver);
    }

    /// Remove a receiver from the underlying decoder.
    pub fn remove_receiver(&self, receiver: &Arc<dyn DataReceiver>) {
        self.source.remove_receiver(receiver);
    }

    /// True while the decode thread is still running.
    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the decoder, unblock the device and wait for the decode
    /// thread to finish. Idempotent. The port closes once the last
    /// device handle is dropped.
    pub fn close(&mut self) {
        self.source.stop();
        self.device.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!(connection = %self.description, "connection closed");
        }
    }
}

impl Drop for DeviceConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

fn to_serial_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn to_serial_stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

fn to_serial_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::receiver::measurement_channel;
    use crate::core::simulator::ReplayDevice;

    #[test]
    fn test_attach_decodes_in_background() {
        let registry = SourceRegistry::with_builtin();
        let source = registry.create("Voltcraft ME-32").unwrap();
        let device = Arc::new(ReplayDevice::new("replay", b"DC   12.3mV  \r".to_vec()));

        let (receiver, rx) = measurement_channel();
        source.add_receiver(receiver);
        let mut connection = DeviceConnection::attach(source, device).unwrap();

        let measurement = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(measurement.unit(), "V");
        connection.close();
        assert!(!connection.is_active());
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = SourceRegistry::with_builtin();
        let source = registry.create("Voltcraft ME-32").unwrap();
        let device = Arc::new(ReplayDevice::new("replay", Vec::new()));
        let mut connection = DeviceConnection::attach(source, device).unwrap();
        connection.close();
        connection.close();
        assert!(!connection.is_active());
    }

    #[test]
    fn test_display_names_device_and_port() {
        let registry = SourceRegistry::with_builtin();
        let source = registry.create("Voltcraft VC-840").unwrap();
        let device = Arc::new(ReplayDevice::new("replay", Vec::new()));
        let mut connection = DeviceConnection::attach(source, device).unwrap();
        assert_eq!(connection.to_string(), "Voltcraft VC-840 on replay");
        connection.close();
    }

    #[test]
    fn test_open_unknown_device_type_fails_fast() {
        let registry = SourceRegistry::with_builtin();
        let err = DeviceConnection::open(&registry, "/dev/null", "Fluke 87")
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::Registry(_)));
    }
}
