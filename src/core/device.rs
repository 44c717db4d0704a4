//! Byte-level device I/O consumed by the protocol decoders.

use parking_lot::Mutex;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Device I/O error types
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The stream ended; no further bytes will arrive.
    #[error("end of stream")]
    EndOfStream,
    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Blocking byte source/sink a decoder reads its wire protocol from.
///
/// Reads block until data arrives. "No data yet" conditions are retried
/// internally and never surface to the caller.
pub trait DataDevice: Send + Sync {
    /// Human-readable device name, typically the port name.
    fn name(&self) -> &str;

    /// Read one byte, blocking until it is available.
    fn read_byte(&self) -> Result<u8, DeviceError>;

    /// Read exactly `count` bytes, blocking until all have arrived.
    fn read_exact(&self, count: usize) -> Result<Vec<u8>, DeviceError>;

    /// Write all of `bytes` to the device.
    fn write(&self, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Unblock pending reads and make all further reads return
    /// [`DeviceError::EndOfStream`]. Called by the connection layer
    /// when closing; decoders never call this.
    fn shutdown(&self) {}
}

fn is_retry(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// [`DataDevice`] over any reader/writer pair, e.g. the two halves of
/// an open serial port.
///
/// Reader and writer are locked independently, so a poll write never
/// waits behind a blocked read. `shutdown` takes effect once the
/// underlying read returns, which for a serial port is bounded by its
/// read timeout.
pub struct StreamDevice<R, W> {
    name: String,
    reader: Mutex<R>,
    writer: Mutex<W>,
    closed: AtomicBool,
}

impl<R: Read + Send, W: Write + Send> StreamDevice<R, W> {
    /// Wrap a reader/writer pair.
    pub fn new(reader: R, writer: W, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl<R: Read + Send, W: Write + Send> DataDevice for StreamDevice<R, W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_byte(&self) -> Result<u8, DeviceError> {
        let mut byte = [0u8; 1];
        let mut reader = self.reader.lock();
        loop {
            if self.is_closed() {
                return Err(DeviceError::EndOfStream);
            }
            match reader.read(&mut byte) {
                Ok(0) => return Err(DeviceError::EndOfStream),
                Ok(_) => return Ok(byte[0]),
                Err(e) if is_retry(e.kind()) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_exact(&self, count: usize) -> Result<Vec<u8>, DeviceError> {
        let mut buf = vec![0u8; count];
        let mut filled = 0;
        let mut reader = self.reader.lock();
        while filled < count {
            if self.is_closed() {
                return Err(DeviceError::EndOfStream);
            }
            match reader.read(&mut buf[filled..]) {
                Ok(0) => return Err(DeviceError::EndOfStream),
                Ok(n) => filled += n,
                Err(e) if is_retry(e.kind()) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        if self.is_closed() {
            return Err(DeviceError::EndOfStream);
        }
        let mut writer = self.writer.lock();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
